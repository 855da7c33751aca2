use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};

use crate::domain::{ParcelStatus, ScanOutcome, ShippingSlip, SlipAction, SlipStatus};
use crate::dtos::shipping_slip::{
    CreateShippingSlipRequest, ListShippingSlipsQuery, ScanParcelRequest, ScanResult,
    ShippingSlipSummary,
};
use crate::error::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::AuthContext;
use crate::models::shipping_slip::{
    ParcelCandidateRow, ShippingSlipItemRow, ShippingSlipRow, ShippingSlipSummaryRow,
};
use crate::state::AppState;

// ==================== Loading ====================

/// Loads a slip with its items in insertion order. With `lock` the slip row
/// is held `FOR UPDATE` until the surrounding transaction ends.
pub(crate) async fn fetch_slip(
    conn: &mut PgConnection,
    id: i64,
    lock: bool,
) -> Result<ShippingSlip, AppError> {
    let mut sql = String::from(
        "SELECT s.id, s.reference, s.status, s.zone_id, z.name AS zone_name,
                s.created_at, s.created_by, s.shipped_at, s.shipped_by,
                s.received_at, s.received_by, s.cancelled_at, s.cancelled_by
         FROM shipping_slips s
         JOIN zones z ON z.id = s.zone_id
         WHERE s.id = $1",
    );
    if lock {
        sql.push_str(" FOR UPDATE OF s");
    }

    let row = sqlx::query_as::<_, ShippingSlipRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Shipping slip {id} not found")))?;

    let items = sqlx::query_as::<_, ShippingSlipItemRow>(
        "SELECT i.parcel_id, p.code AS parcel_code, p.price::FLOAT8 AS price,
                i.scanned, i.scanned_at
         FROM shipping_slip_items i
         JOIN parcels p ON p.id = i.parcel_id
         WHERE i.slip_id = $1
         ORDER BY i.position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(row.into_slip(items))
}

// GET /shipping-slips/{id}
#[instrument(skip(state))]
pub async fn get_shipping_slip(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ShippingSlip>, AppError> {
    let mut conn = state.db_pool.acquire().await?;
    Ok(Json(fetch_slip(&mut conn, id, false).await?))
}

// GET /shipping-slips?status=PENDING
#[instrument(skip(state))]
pub async fn list_shipping_slips(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListShippingSlipsQuery>,
) -> Result<Json<Vec<ShippingSlipSummary>>, AppError> {
    let rows = sqlx::query_as::<_, ShippingSlipSummaryRow>(
        "SELECT s.id, s.reference, s.status, s.zone_id, z.name AS zone_name,
                COUNT(i.id) AS item_count,
                COUNT(i.id) FILTER (WHERE i.scanned) AS scanned_count,
                s.created_at
         FROM shipping_slips s
         JOIN zones z ON z.id = s.zone_id
         LEFT JOIN shipping_slip_items i ON i.slip_id = s.id
         WHERE ($1::shipping_slip_status IS NULL OR s.status = $1)
         GROUP BY s.id, z.name
         ORDER BY s.created_at DESC",
    )
    .bind(query.status)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|r| ShippingSlipSummary {
                id: r.id,
                reference: r.reference,
                status: r.status,
                zone_id: r.zone_id,
                zone_name: r.zone_name,
                item_count: r.item_count,
                scanned_count: r.scanned_count,
                created_at: r.created_at,
            })
            .collect(),
    ))
}

// ==================== Create ====================

/// Trims codes and rejects empty lists, blank codes and duplicates.
fn normalize_parcel_codes(codes: &[String]) -> Result<Vec<String>, AppError> {
    if codes.is_empty() {
        return Err(AppError::validation("A shipping slip needs at least one parcel"));
    }
    let mut out: Vec<String> = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::validation("Parcel codes cannot be blank"));
        }
        if out.iter().any(|c| c == code) {
            return Err(AppError::validation(format!("Parcel {code} is listed twice")));
        }
        out.push(code.to_string());
    }
    Ok(out)
}

/// Resolves requested codes to parcel ids, in request order. Every parcel
/// must exist, be `collected` and not sit on another PENDING slip.
fn eligible_parcel_ids(
    codes: &[String],
    candidates: &[ParcelCandidateRow],
) -> Result<Vec<i64>, AppError> {
    codes
        .iter()
        .map(|code| {
            let parcel = candidates
                .iter()
                .find(|c| c.code == *code)
                .ok_or_else(|| AppError::validation(format!("Parcel {code} does not exist")))?;
            if parcel.status != ParcelStatus::Collected {
                return Err(AppError::validation(format!(
                    "Parcel {code} is {}; only collected parcels can be put on a slip",
                    parcel.status
                )));
            }
            if parcel.on_open_slip {
                return Err(AppError::conflict(format!(
                    "Parcel {code} is already on an open shipping slip"
                )));
            }
            Ok(parcel.id)
        })
        .collect()
}

// POST /shipping-slips
#[instrument(skip(state, auth, req), fields(user = %auth.username))]
pub async fn create_shipping_slip(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<CreateShippingSlipRequest>,
) -> Result<(StatusCode, Json<ShippingSlip>), AppError> {
    auth.require_dispatcher("create shipping slips")?;
    let codes = normalize_parcel_codes(&req.parcel_codes)?;
    let reference = match req.reference.as_deref().map(str::trim) {
        Some("") => return Err(AppError::validation("Reference cannot be blank")),
        Some(r) => r.to_string(),
        None => format!("BE-{}", Utc::now().format("%Y%m%d%H%M%S%3f")),
    };

    let mut tx = state.db_pool.begin().await?;

    let zone_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM zones WHERE id = $1)")
        .bind(req.zone_id)
        .fetch_one(&mut *tx)
        .await?;
    if !zone_exists {
        return Err(AppError::not_found(format!("Zone {} not found", req.zone_id)));
    }

    let candidates = sqlx::query_as::<_, ParcelCandidateRow>(
        "SELECT p.id, p.code, p.status,
                EXISTS(
                    SELECT 1 FROM shipping_slip_items i
                    JOIN shipping_slips s ON s.id = i.slip_id
                    WHERE i.parcel_id = p.id AND s.status = 'PENDING'
                ) AS on_open_slip
         FROM parcels p
         WHERE p.code = ANY($1)
         FOR UPDATE OF p",
    )
    .bind(&codes)
    .fetch_all(&mut *tx)
    .await?;

    let parcel_ids = eligible_parcel_ids(&codes, &candidates)?;

    let slip_id: i64 = sqlx::query_scalar(
        "INSERT INTO shipping_slips (reference, zone_id, created_by)
         VALUES ($1, $2, $3)
         RETURNING id",
    )
    .bind(&reference)
    .bind(req.zone_id)
    .bind(&auth.username)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if let Some(db) = e.as_database_error() {
            if db.code().as_deref() == Some("23505") {
                return AppError::conflict(format!("Reference {reference} already exists"));
            }
        }
        AppError::db(e)
    })?;

    for (position, parcel_id) in parcel_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO shipping_slip_items (slip_id, parcel_id, position) VALUES ($1, $2, $3)",
        )
        .bind(slip_id)
        .bind(parcel_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    let slip = fetch_slip(&mut tx, slip_id, false).await?;
    tx.commit().await?;

    info!(slip_id, reference = %slip.reference, parcels = slip.total_items(), "Shipping slip created");
    Ok((StatusCode::CREATED, Json(slip)))
}

// ==================== Transitions ====================

/// Applies ship / receive / cancel under a row lock, stamps the actor and
/// cascades the parcels, all in one transaction.
async fn transition(
    state: &AppState,
    auth: &AuthContext,
    id: i64,
    action: SlipAction,
) -> Result<ShippingSlip, AppError> {
    auth.require_dispatcher(&format!("{action} shipping slips"))?;

    let mut tx = state.db_pool.begin().await?;
    let slip = fetch_slip(&mut tx, id, true).await?;

    if let Err(e) = slip.check(action, state.config.ship_policy) {
        warn!(slip_id = id, %action, status = %slip.status, "Rejected slip transition");
        return Err(e.into());
    }

    apply_transition(&mut tx, id, slip.status, action, &auth.username).await?;

    if let Some(parcel_status) = action.parcel_cascade() {
        cascade_parcels(&mut tx, id, parcel_status).await?;
    }

    let updated = fetch_slip(&mut tx, id, false).await?;
    tx.commit().await?;

    info!(slip_id = id, %action, status = %updated.status, user = %auth.username, "Shipping slip transitioned");
    Ok(updated)
}

/// Moves the slip out of `expected` and stamps the actor. The update only
/// matches while the row is still in `expected`, so of two racing
/// transitions at most one applies.
async fn apply_transition(
    conn: &mut PgConnection,
    id: i64,
    expected: SlipStatus,
    action: SlipAction,
    actor: &str,
) -> Result<(), AppError> {
    let update = match action {
        SlipAction::Ship => {
            "UPDATE shipping_slips SET status = 'SHIPPED', shipped_at = NOW(), shipped_by = $2 WHERE id = $1 AND status = $3"
        }
        SlipAction::Receive => {
            "UPDATE shipping_slips SET status = 'RECEIVED', received_at = NOW(), received_by = $2 WHERE id = $1 AND status = $3"
        }
        SlipAction::Cancel => {
            "UPDATE shipping_slips SET status = 'CANCELLED', cancelled_at = NOW(), cancelled_by = $2 WHERE id = $1 AND status = $3"
        }
        SlipAction::Delete | SlipAction::Scan => {
            return Err(AppError::internal(format!("{action} is not a status transition")));
        }
    };
    let applied = sqlx::query(update)
        .bind(id)
        .bind(actor)
        .bind(expected)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if applied != 1 {
        return Err(AppError::invalid_transition(format!(
            "Shipping slip {id} is no longer {expected}; cannot {action} it"
        )));
    }
    Ok(())
}

async fn cascade_parcels(
    conn: &mut PgConnection,
    slip_id: i64,
    status: ParcelStatus,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE parcels SET status = $2, updated_at = NOW()
         WHERE id IN (SELECT parcel_id FROM shipping_slip_items WHERE slip_id = $1)",
    )
    .bind(slip_id)
    .bind(status)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// POST /shipping-slips/{id}/ship
pub async fn ship_shipping_slip(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ShippingSlip>, AppError> {
    transition(&state, &auth, id, SlipAction::Ship).await.map(Json)
}

// POST /shipping-slips/{id}/receive
pub async fn receive_shipping_slip(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ShippingSlip>, AppError> {
    transition(&state, &auth, id, SlipAction::Receive).await.map(Json)
}

// POST /shipping-slips/{id}/cancel
pub async fn cancel_shipping_slip(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ShippingSlip>, AppError> {
    transition(&state, &auth, id, SlipAction::Cancel).await.map(Json)
}

// DELETE /shipping-slips/{id}
#[instrument(skip(state, auth), fields(user = %auth.username))]
pub async fn delete_shipping_slip(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    auth.require_dispatcher("delete shipping slips")?;

    let mut tx = state.db_pool.begin().await?;
    let slip = fetch_slip(&mut tx, id, true).await?;
    slip.check(SlipAction::Delete, state.config.ship_policy)?;

    let reverted = cascade_parcels(&mut tx, id, ParcelStatus::Collected).await?;
    sqlx::query("DELETE FROM shipping_slips WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(slip_id = id, parcels_reverted = reverted, "Shipping slip deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Scanning ====================

// POST /shipping-slips/{id}/scan-parcel
#[instrument(skip(state, auth, req), fields(user = %auth.username))]
pub async fn scan_parcel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<ScanParcelRequest>,
) -> Result<Json<ScanResult>, AppError> {
    let code = req.parcel_code.trim();
    if code.is_empty() {
        return Err(AppError::validation("Parcel code is required"));
    }

    let mut tx = state.db_pool.begin().await?;
    let mut slip = fetch_slip(&mut tx, id, true).await?;

    let outcome = slip.mark_scanned(code, Utc::now())?;
    let (scanned_at, already_scanned) = match outcome {
        ScanOutcome::Scanned(at) => {
            sqlx::query(
                "UPDATE shipping_slip_items i SET scanned = TRUE, scanned_at = $3
                 FROM parcels p
                 WHERE i.parcel_id = p.id AND i.slip_id = $1 AND p.code = $2",
            )
            .bind(id)
            .bind(code)
            .bind(at)
            .execute(&mut *tx)
            .await?;
            (Some(at), false)
        }
        ScanOutcome::AlreadyScanned(at) => (at, true),
    };
    tx.commit().await?;

    info!(slip_id = id, parcel = code, already_scanned, "Parcel scanned");
    Ok(Json(ScanResult {
        parcel_code: code.to_string(),
        scanned_at,
        already_scanned,
        scanned_items: slip.scanned_count(),
        total_items: slip.total_items(),
        completion_rate: slip.completion_rate(),
    }))
}
