//! `GET /healthz`: unauthenticated liveness probe. No dependency checks -
//! a reachable process is all this promises.

use axum::http::StatusCode;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
