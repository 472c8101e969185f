use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use sea_orm::EntityTrait;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::verify_token;
use crate::AppState;

/// The verified caller, attached to the request by [`auth_middleware`]
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub phone_number: String,
    pub is_verified: bool,
}

/// Validate the bearer token and load the caller's account
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let TypedHeader(auth) =
        auth.ok_or_else(|| AppError::Unauthorized("No token provided".to_string()))?;
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;

    let user = user::Entity::find_by_id(claims.sub)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !user.is_verified {
        return Err(AppError::Forbidden("User not verified".to_string()));
    }

    request.extensions_mut().insert(AuthUser {
        user_id: user.id,
        phone_number: user.phone_number,
        is_verified: user.is_verified,
    });
    Ok(next.run(request).await)
}
