use crate::{
    config::Config,
    error::{Error, Result},
    generator::Generator,
    registry::Registry,
    server::{self, AppState},
};
use std::sync::Arc;

/// Run the load generator until the HTTP server stops.
///
/// The exporter is built before anything is served, so an unusable collector
/// fails startup before the listener is bound.
pub fn run(config: Config) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let generator = Generator::new(&registry, config.cardinality);

    let exporter = match config.export {
        Some(builder) => Some(builder.build(registry.clone())?.spawn()?),
        None => None,
    };

    let mut state = AppState::new(registry);
    if config.memory_endpoint {
        state = state.with_memory(Arc::new(Registry::new()));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;

    let generator = generator.spawn(config.interval)?;
    let served = runtime.block_on(server::serve(config.listen, state, shutdown_signal()));

    generator.shutdown();
    if let Some(exporter) = exporter {
        exporter.shutdown();
    }

    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl+c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
