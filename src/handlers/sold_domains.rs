use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::db::models::{NewSoldDomain, SoldDomain};
use crate::db::sqlite::SoldDomainStore;
use crate::handlers::{IdQuery, Success};
use crate::{AdminError, router::AdminState};

async fn store(state: &AdminState) -> Result<SoldDomainStore, AdminError> {
    Ok(SoldDomainStore::new(state.db.connection().await?))
}

pub async fn list_sold(
    State(state): State<AdminState>,
) -> Result<Json<Vec<SoldDomain>>, AdminError> {
    Ok(Json(store(&state).await?.list().await?))
}

pub async fn create_sold(
    State(state): State<AdminState>,
    Json(body): Json<NewSoldDomain>,
) -> Result<(StatusCode, Json<SoldDomain>), AdminError> {
    let created = store(&state).await?.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_sold(
    State(state): State<AdminState>,
    Json(body): Json<NewSoldDomain>,
) -> Result<Json<SoldDomain>, AdminError> {
    let id = body
        .id
        .clone()
        .ok_or_else(|| AdminError::Validation("`id` is required".to_string()))?;
    Ok(Json(store(&state).await?.update(&id, body).await?))
}

pub async fn delete_sold(
    State(state): State<AdminState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<Success>, AdminError> {
    store(&state).await?.delete(&q.id).await?;
    Ok(Json(Success::OK))
}
