use std::collections::HashMap;

use axum::extract::{Extension, State};
use axum::Json;
use chrono::Utc;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};

use crate::domain::{Expedition, ExpeditionStatus, Reconciliation, ReconciliationLine, SubmissionGate};
use crate::dtos::expedition::{
    ExpeditionSummary, ListExpeditionsQuery, ReceptionIssue, ReceptionItem, ReceptionRequest,
    ReceptionResult, ReceptionValidation,
};
use crate::error::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::AuthContext;
use crate::models::expedition::{ExpeditionItemRow, ExpeditionRow, ExpeditionSummaryRow};
use crate::state::AppState;

pub(crate) async fn fetch_expedition(
    conn: &mut PgConnection,
    id: i64,
    lock: bool,
) -> Result<Expedition, AppError> {
    let mut sql = String::from(
        "SELECT id, tracking_number, status, created_at, received_at, received_by, general_notes
         FROM expeditions WHERE id = $1",
    );
    if lock {
        sql.push_str(" FOR UPDATE");
    }

    let row = sqlx::query_as::<_, ExpeditionRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Expedition {id} not found")))?;

    let items = sqlx::query_as::<_, ExpeditionItemRow>(
        "SELECT id, product_name, sku, quantity_sent, quantity_received, quantity_defective,
                notes, photos
         FROM expedition_items
         WHERE expedition_id = $1
         ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(row.into_expedition(items))
}

// ==================== Reconciliation check ====================

struct Evaluation {
    validation: ReceptionValidation,
    closed: bool,
}

/// Runs the reconciler over a submitted payload. Every expedition item must
/// appear at most once and no unknown item may be referenced; items missing
/// from the payload count as undispositioned.
fn evaluate(expedition: &Expedition, req: &ReceptionRequest) -> Evaluation {
    let mut errors = Vec::new();
    let closed = !expedition.status.accepts_reception();

    if closed {
        errors.push(ReceptionIssue {
            item_id: None,
            message: format!("Expedition is {} and cannot be received", expedition.status),
        });
    }

    let mut submitted: HashMap<i64, &ReceptionItem> = HashMap::with_capacity(req.items.len());
    for item in &req.items {
        let oversized = [item.quantity_received, item.quantity_defective]
            .into_iter()
            .flatten()
            .any(|q| i32::try_from(q).is_err());
        if oversized {
            errors.push(ReceptionIssue {
                item_id: Some(item.item_id),
                message: format!("Item {} has a quantity that is too large", item.item_id),
            });
        }
        if !expedition.items.iter().any(|i| i.id == item.item_id) {
            errors.push(ReceptionIssue {
                item_id: Some(item.item_id),
                message: format!("Item {} does not belong to this expedition", item.item_id),
            });
        } else if submitted.insert(item.item_id, item).is_some() {
            errors.push(ReceptionIssue {
                item_id: Some(item.item_id),
                message: format!("Item {} is listed more than once", item.item_id),
            });
        }
    }

    let lines: Vec<ReconciliationLine> = expedition
        .items
        .iter()
        .map(|item| {
            let entry = submitted.get(&item.id);
            ReconciliationLine {
                item_id: item.id,
                quantity_sent: item.quantity_sent,
                received: entry.and_then(|e| e.quantity_received).into(),
                defective: entry.and_then(|e| e.quantity_defective).into(),
            }
        })
        .collect();
    let reconciliation = Reconciliation::compute(&lines);

    match reconciliation.gate() {
        SubmissionGate::Open => {}
        SubmissionGate::MissingDisposition(ids) => {
            for id in ids {
                let name = expedition
                    .items
                    .iter()
                    .find(|i| i.id == id)
                    .map(|i| i.product_name.as_str())
                    .unwrap_or_default();
                errors.push(ReceptionIssue {
                    item_id: Some(id),
                    message: format!("Item {id} ({name}) needs a received or defective quantity"),
                });
            }
        }
        gate @ SubmissionGate::Disabled => errors.push(ReceptionIssue {
            item_id: None,
            message: gate.message().unwrap_or_default(),
        }),
    }

    Evaluation {
        validation: ReceptionValidation {
            valid: errors.is_empty(),
            errors,
            warnings: reconciliation.warnings(),
            summary: reconciliation.summary,
        },
        closed,
    }
}

fn rejection(evaluation: &Evaluation) -> AppError {
    let message = evaluation
        .validation
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    if evaluation.closed {
        AppError::invalid_transition(message)
    } else {
        AppError::validation(message)
    }
}

// Unset quantities are committed as zero; the range was checked in `evaluate`.
fn stored_quantity(q: Option<u32>) -> i32 {
    i32::try_from(q.unwrap_or(0)).unwrap_or(i32::MAX)
}

// ==================== Handlers ====================

// GET /expeditions/{id}
#[instrument(skip(state))]
pub async fn get_expedition(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Expedition>, AppError> {
    let mut conn = state.db_pool.acquire().await?;
    Ok(Json(fetch_expedition(&mut conn, id, false).await?))
}

// GET /expeditions?status=shipped
#[instrument(skip(state))]
pub async fn list_expeditions(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListExpeditionsQuery>,
) -> Result<Json<Vec<ExpeditionSummary>>, AppError> {
    let rows = sqlx::query_as::<_, ExpeditionSummaryRow>(
        "SELECT e.id, e.tracking_number, e.status,
                COUNT(i.id) AS item_count,
                COALESCE(SUM(i.quantity_sent), 0)::BIGINT AS total_sent,
                e.created_at, e.received_at
         FROM expeditions e
         LEFT JOIN expedition_items i ON i.expedition_id = e.id
         WHERE ($1::expedition_status IS NULL OR e.status = $1)
         GROUP BY e.id
         ORDER BY e.created_at DESC",
    )
    .bind(query.status)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|r| ExpeditionSummary {
                id: r.id,
                tracking_number: r.tracking_number,
                status: r.status,
                item_count: r.item_count,
                total_sent: r.total_sent,
                created_at: r.created_at,
                received_at: r.received_at,
            })
            .collect(),
    ))
}

// POST /expeditions/{id}/receive/validate
#[instrument(skip(state, req))]
pub async fn validate_reception(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<ReceptionRequest>,
) -> Result<Json<ReceptionValidation>, AppError> {
    let mut conn = state.db_pool.acquire().await?;
    let expedition = fetch_expedition(&mut conn, id, false).await?;
    Ok(Json(evaluate(&expedition, &req).validation))
}

// POST /expeditions/{id}/receive
#[instrument(skip(state, auth, req), fields(user = %auth.username))]
pub async fn receive_expedition(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<ReceptionRequest>,
) -> Result<Json<ReceptionResult>, AppError> {
    auth.require_dispatcher("receive expeditions")?;

    let mut tx = state.db_pool.begin().await?;
    let expedition = fetch_expedition(&mut tx, id, true).await?;

    let evaluation = evaluate(&expedition, &req);
    if !evaluation.validation.valid {
        warn!(expedition_id = id, errors = evaluation.validation.errors.len(), "Rejected reception");
        return Err(rejection(&evaluation));
    }
    let validation = evaluation.validation;

    for item in &req.items {
        sqlx::query(
            "UPDATE expedition_items
             SET quantity_received = $3, quantity_defective = $4, notes = $5
             WHERE id = $1 AND expedition_id = $2",
        )
        .bind(item.item_id)
        .bind(id)
        .bind(stored_quantity(item.quantity_received))
        .bind(stored_quantity(item.quantity_defective))
        .bind(item.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .execute(&mut *tx)
        .await?;
    }

    let received_by = req
        .received_by
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(auth.username.as_str())
        .to_string();
    let received_at = Utc::now();

    let applied = sqlx::query(
        "UPDATE expeditions
         SET status = $2, received_at = $3, received_by = $4, general_notes = $5
         WHERE id = $1 AND status = $6",
    )
    .bind(id)
    .bind(ExpeditionStatus::Received)
    .bind(received_at)
    .bind(&received_by)
    .bind(req.general_notes.as_deref())
    .bind(expedition.status)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if applied != 1 {
        return Err(AppError::invalid_transition(format!(
            "Expedition {id} changed status while it was being received"
        )));
    }

    tx.commit().await?;

    info!(
        expedition_id = id,
        processed = validation.summary.total_processed,
        defective = validation.summary.total_defective,
        warnings = validation.warnings.len(),
        "Expedition received"
    );

    Ok(Json(ReceptionResult {
        expedition_id: id,
        status: ExpeditionStatus::Received,
        received_at,
        received_by,
        summary: validation.summary,
        warnings: validation.warnings,
    }))
}
