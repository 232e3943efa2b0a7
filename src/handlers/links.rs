use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::db::models::{FriendlyLink, NewFriendlyLink};
use crate::db::sqlite::LinkStore;
use crate::handlers::{IdQuery, Success};
use crate::{AdminError, router::AdminState};

async fn store(state: &AdminState) -> Result<LinkStore, AdminError> {
    Ok(LinkStore::new(state.db.connection().await?))
}

pub async fn list_links(
    State(state): State<AdminState>,
) -> Result<Json<Vec<FriendlyLink>>, AdminError> {
    Ok(Json(store(&state).await?.list().await?))
}

pub async fn create_link(
    State(state): State<AdminState>,
    Json(body): Json<NewFriendlyLink>,
) -> Result<(StatusCode, Json<FriendlyLink>), AdminError> {
    let created = store(&state).await?.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_link(
    State(state): State<AdminState>,
    Json(body): Json<NewFriendlyLink>,
) -> Result<Json<FriendlyLink>, AdminError> {
    let id = body
        .id
        .clone()
        .ok_or_else(|| AdminError::Validation("`id` is required".to_string()))?;
    Ok(Json(store(&state).await?.update(&id, body).await?))
}

pub async fn delete_link(
    State(state): State<AdminState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<Success>, AdminError> {
    store(&state).await?.delete(&q.id).await?;
    Ok(Json(Success::OK))
}
