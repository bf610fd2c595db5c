use std::sync::Arc;

use anyhow::Context;

use questline_api::app::{build_app, services::AppServices};
use questline_api::config::ApiConfig;
use questline_infra::issuer::{IssuerRegistry, ShopifyDiscountIssuer};
use questline_infra::workers::WorkerPools;

// The blocking HTTP client behind the issuer must be created and dropped
// outside the async runtime, so `main` stays synchronous.
fn main() -> anyhow::Result<()> {
    questline_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting");

    let issuer = ShopifyDiscountIssuer::new(config.shopify_api_version.clone())
        .context("failed to build the discount issuer")?;
    let services = Arc::new(
        AppServices::new(&config, IssuerRegistry::with_discount_issuer(Arc::new(issuer)))
            .context("failed to build services")?,
    );

    let pools = WorkerPools::spawn(&services.workers).context("failed to start worker pools")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    let app = build_app(services.clone(), config.admin_token.clone());
    let served = runtime.block_on(serve(&config, app));

    drop(runtime);
    pools.shutdown();
    drop(services);
    served
}

async fn serve(config: &ApiConfig, app: axum::Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
