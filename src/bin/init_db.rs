//! One-shot initialization of the data file before the server starts.
//!
//! Runs the same sequence as the server's first open: create the data
//! directory, repair or recreate a damaged file, create and migrate the
//! schema, and seed empty tables.

use std::process::ExitCode;

use domain_admin::config::CONFIG;
use domain_admin::db::{DbManager, Table};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;
    domain_admin::telemetry::init_tracing(&cfg.loglevel);

    let paths = cfg.paths();
    info!(path = %paths.database.display(), "initializing database");
    let manager = DbManager::new(&paths.database, cfg.min_database_size, cfg.busy_timeout());

    let db = match manager.connection().await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "database initialization failed");
            return ExitCode::FAILURE;
        }
    };

    for table in Table::ALL {
        match db.count(table.name()).await {
            Ok(rows) => info!(table = table.name(), rows, "table ready"),
            Err(e) => {
                error!(table = table.name(), error = %e, "table check failed");
                return ExitCode::FAILURE;
            }
        }
    }

    manager.invalidate().await;
    info!("database initialization complete");
    ExitCode::SUCCESS
}
