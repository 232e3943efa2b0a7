use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::db::models::{Domain, NewDomain, SaleDetails, SoldDomain};
use crate::db::sqlite::DomainStore;
use crate::handlers::{IdQuery, Success};
use crate::{AdminError, router::AdminState};

async fn store(state: &AdminState) -> Result<DomainStore, AdminError> {
    Ok(DomainStore::new(state.db.connection().await?))
}

pub async fn list_domains(State(state): State<AdminState>) -> Result<Json<Vec<Domain>>, AdminError> {
    Ok(Json(store(&state).await?.list().await?))
}

pub async fn get_domain(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Domain>, AdminError> {
    store(&state)
        .await?
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AdminError::NotFound(format!("domain {id}")))
}

pub async fn create_domain(
    State(state): State<AdminState>,
    Json(body): Json<NewDomain>,
) -> Result<(StatusCode, Json<Domain>), AdminError> {
    let created = store(&state).await?.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/domains with the id in the body.
pub async fn update_domain(
    State(state): State<AdminState>,
    Json(body): Json<NewDomain>,
) -> Result<Json<Domain>, AdminError> {
    let id = body
        .id
        .clone()
        .ok_or_else(|| AdminError::Validation("`id` is required".to_string()))?;
    Ok(Json(store(&state).await?.update(&id, body).await?))
}

pub async fn delete_domain(
    State(state): State<AdminState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<Success>, AdminError> {
    store(&state).await?.delete(&q.id).await?;
    Ok(Json(Success::OK))
}

/// POST /api/domains/{id}/sold
pub async fn mark_domain_sold(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(sale): Json<SaleDetails>,
) -> Result<Json<SoldDomain>, AdminError> {
    Ok(Json(store(&state).await?.mark_sold(&id, sale).await?))
}
