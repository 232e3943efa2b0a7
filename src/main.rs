use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use domain_admin::config::CONFIG;
use domain_admin::router::{AdminState, admin_router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;
    domain_admin::telemetry::init_tracing(&cfg.loglevel);

    info!(
        listen_addr = %cfg.listen_addr,
        data_dir = %cfg.data_dir.display(),
        database_file = %cfg.database_file,
        loglevel = %cfg.loglevel
    );
    if cfg.admin_key == "change-me" {
        warn!("DOMAIN_ADMIN_ADMIN_KEY is unset; database routes accept the default key");
    }

    let state = AdminState::from_config(cfg);
    // Open eagerly so a broken data dir shows up at boot; requests retry anyway.
    if let Err(e) = state.db.connection().await {
        warn!(error = %e, "initial database open failed");
    }

    let app = admin_router(state, cfg.max_upload_bytes);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
