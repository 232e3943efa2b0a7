pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod telemetry;

pub use db::{Db, DbManager};
pub use error::AdminError;
