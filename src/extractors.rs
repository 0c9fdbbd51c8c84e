//! A `Json<T>` wrapper whose rejection is `AppError` rather than axum's own
//! default plain-text rejection body, so a malformed request body surfaces
//! through the same `{error: {code, message}}` envelope as every other
//! failure in the gateway's taxonomy.

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::middleware::error_handling::AppError;

pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}
