use std::sync::Arc;

use anyhow::Context;

use logistiga_infra::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logistiga_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let services = logistiga_api::app::services::build_services(&config).await?;
    let app = logistiga_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
