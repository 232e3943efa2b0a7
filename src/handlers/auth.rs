use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::sqlite::AuthStore;
use crate::handlers::Success;
use crate::middleware::RequireAdminKey;
use crate::{AdminError, router::AdminState};

async fn store(state: &AdminState) -> Result<AuthStore, AdminError> {
    Ok(AuthStore::new(state.db.connection().await?))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCode {
    pub security_code: String,
}

pub async fn login(
    State(state): State<AdminState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AdminError> {
    if store(&state).await?.login(&body.password).await? {
        return Ok(Json(Success::OK).into_response());
    }
    Ok((
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": "incorrect password"})),
    )
        .into_response())
}

pub async fn logout(State(state): State<AdminState>) -> Result<Json<Success>, AdminError> {
    store(&state).await?.set_logged_in(false).await?;
    Ok(Json(Success::OK))
}

pub async fn change_password(
    State(state): State<AdminState>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Success>, AdminError> {
    store(&state)
        .await?
        .change_password(&body.current_password, &body.new_password)
        .await?;
    Ok(Json(Success::OK))
}

pub async fn get_security_code(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
) -> Result<Json<SecurityCode>, AdminError> {
    let security_code = store(&state).await?.security_code().await?;
    Ok(Json(SecurityCode { security_code }))
}

pub async fn set_security_code(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
    Json(body): Json<SecurityCode>,
) -> Result<Json<Success>, AdminError> {
    store(&state)
        .await?
        .set_security_code(body.security_code.trim())
        .await?;
    Ok(Json(Success::OK))
}

pub async fn reset_by_code(
    State(state): State<AdminState>,
    Json(body): Json<SecurityCode>,
) -> Result<Json<Success>, AdminError> {
    store(&state)
        .await?
        .reset_by_code(body.security_code.trim())
        .await?;
    Ok(Json(Success::OK))
}
