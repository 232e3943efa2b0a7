pub mod auth;
pub mod database;
pub mod domains;
pub mod health;
pub mod links;
pub mod settings;
pub mod sold_domains;

use serde::{Deserialize, Serialize};

/// `?id=` on collection-level deletes.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub const OK: Success = Success { success: true };
}
