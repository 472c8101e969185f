use axum::extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// `Json` whose rejections surface as validation errors
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Option<AppJson<T>>` is `None` without a Content-Type; a body that is
/// present but malformed is still a 400
impl<T, S> OptionalFromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let payload = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(payload.map(|Json(value)| AppJson(value)))
    }
}

/// `Query` whose rejections surface as validation errors
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
