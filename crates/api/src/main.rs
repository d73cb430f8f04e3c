use anyhow::Context;

use sentinel_api::{app, config::ApiConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sentinel_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let service = app::services::build_service(&config)
        .await
        .context("failed to wire services")?;
    service
        .initialize()
        .await
        .context("failed to seed identity store")?;

    let app = app::build_app(service);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
