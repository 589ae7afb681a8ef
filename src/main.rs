use push_deploy::config::Config;
use push_deploy::{AppState, logging, router};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Flushes the log file on exit
    let _log_guard = match logging::setup_logging(&config.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Webhook server starting");
    info!(
        "Deploying pushes to '{}' with {}",
        config.target_branch,
        config.deploy_script.display()
    );
    info!("Writing logs to {}", config.log_file.display());
    if let Some(timeout) = config.deploy_timeout {
        info!("Deploy timeout: {}s", timeout.as_secs());
    }
    if config.serialize_deploys {
        info!("Deploys are serialized");
    }

    let bind_address = config.bind_address.clone();
    let app = router(Arc::new(AppState::new(config)));

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", bind_address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }
    info!("Webhook server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, run until killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
