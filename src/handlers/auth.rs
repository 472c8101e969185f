use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::services::auth::{self, RegisterRequest, Registered, VerifiedSession};
use crate::utils::extract::AppJson;
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPhoneRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct OtpIssued {
    /// Present only when the server echoes codes (development)
    #[serde(rename = "mockOTP", skip_serializing_if = "Option::is_none")]
    pub mock_otp: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Registered>>)> {
    let registered = auth::register(&state.db, payload).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("User registered successfully", registered),
    ))
}

/// Password check, then an OTP to the registered phone
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<OtpIssued>>> {
    let mock_otp = auth::login(
        &state.db,
        &state.config,
        &state.otp,
        &payload.phone_number,
        &payload.password,
    )
    .await?;

    Ok(ApiResponse::with_message(
        "OTP sent to your phone",
        OtpIssued { mock_otp },
    ))
}

pub async fn verify_phone(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyPhoneRequest>,
) -> AppResult<Json<ApiResponse<VerifiedSession>>> {
    let session =
        auth::verify_phone(&state.db, &state.config, &payload.phone_number, &payload.otp).await?;
    Ok(ApiResponse::with_message(
        "Phone number verified successfully",
        session,
    ))
}

/// Tokens are stateless; clients drop theirs
pub async fn logout(Extension(user): Extension<AuthUser>) -> Json<ApiResponse<()>> {
    tracing::debug!(user_id = %user.user_id, "Logout");
    ApiResponse::with_message("Logout successful", ())
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Json<ApiResponse<AuthUser>> {
    ApiResponse::ok(user)
}
