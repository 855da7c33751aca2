//! Typed client for the back-office API and the page-scoped sessions that
//! decide which slip actions to offer and gate expedition receptions.

pub mod api;
pub mod error;
pub mod guard;
pub mod http;
pub mod reception_session;
pub mod slip_session;

pub use api::BackofficeApi;
pub use error::{ClientError, ErrorKind};
pub use guard::{ActionGuard, InFlight};
pub use http::HttpApi;
pub use reception_session::{FormField, ReceptionEntry, ReceptionForm, ReceptionSession};
pub use slip_session::SlipSession;
