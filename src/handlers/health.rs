use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::db::Table;
use crate::router::AdminState;

/// GET /api/health: data file facts, lifecycle state and per-table counts.
pub async fn health(State(state): State<AdminState>) -> Response {
    let connection = state.db.connection().await;
    // Reported after opening, which may have just created or repaired the file.
    let file = state.db.file_report().await;
    let (status, database) = match connection {
        Ok(db) => {
            let mut tables = Map::new();
            for table in Table::ALL {
                let count = match db.count(table.name()).await {
                    Ok(n) => json!(n),
                    Err(e) => json!({ "error": e.to_string() }),
                };
                tables.insert(table.name().to_string(), count);
            }
            (
                StatusCode::OK,
                json!({ "connected": true, "tables": Value::Object(tables) }),
            )
        }
        Err(e) => {
            warn!(error = %e, "health check could not open the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "connected": false, "error": e.to_string() }),
            )
        }
    };
    let body = json!({
        "status": if status.is_success() { "ok" } else { "error" },
        "lifecycle": state.db.state(),
        "file": file,
        "database": database,
        "timestamp": Utc::now().to_rfc3339(),
    });
    (status, Json(body)).into_response()
}
