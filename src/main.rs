use coregate::config::GateConfig;
use coregate::context::AppContext;
use coregate::error::GateResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> GateResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coregate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration and bring the store up: open or create the
    // database, apply the schema and seed the bootstrap admin on a fresh
    // store. Front-ends embed the library; this entry point provisions
    // and health-checks a station.
    let config = GateConfig::from_env()?;
    let ctx = AppContext::new(config).await?;

    tracing::info!(
        device = %ctx.config.service.device_name,
        "Store ready, version {}",
        env!("CARGO_PKG_VERSION")
    );

    Ok(())
}
