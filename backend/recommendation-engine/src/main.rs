use anyhow::Result;
use recommendation_engine::jobs::run_batch_recommend_job;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; logs go to stderr so stdout carries the JSON lines
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("Starting recommendation-engine batch runner");

    match run_batch_recommend_job().await {
        Ok(stats) => {
            info!(
                succeeded = stats.users_succeeded,
                failed = stats.users_failed,
                "Batch runner finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Batch runner failed");
            Err(e)
        }
    }
}
