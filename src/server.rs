//! HTTP surface: scrape endpoints plus the profiling route, all on one
//! listener.

use crate::{
    error::{Error, Result},
    memory,
    registry::Registry,
    text,
};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::{future::Future, net::SocketAddr, sync::Arc};

pub const METRICS_PATH: &str = "/metrics";
pub const MEMORY_METRICS_PATH: &str = "/memorymetrics";
pub const PPROF_INDEX_PATH: &str = "/debug/pprof/";
pub const PROFILE_PATH: &str = "/debug/pprof/profile";
pub const FLAMEGRAPH_PATH: &str = "/debug/pprof/flamegraph";

#[derive(Clone)]
pub struct AppState {
    registry: Arc<Registry>,
    memory: Option<Arc<Registry>>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            memory: None,
        }
    }

    /// Also serve allocator statistics from their own registry.
    pub fn with_memory(mut self, memory: Arc<Registry>) -> Self {
        self.memory = Some(memory);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route(METRICS_PATH, get(metrics_handler));

    if state.memory.is_some() {
        router = router.route(MEMORY_METRICS_PATH, get(memory_handler));
    }

    #[cfg(unix)]
    {
        router = router
            .route(PPROF_INDEX_PATH, get(profiling::index_handler))
            .route(PROFILE_PATH, get(profiling::profile_handler))
            .route(FLAMEGRAPH_PATH, get(profiling::flamegraph_handler));
    }

    router.with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;

    tracing::info!(%addr, "serving metrics");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Error::Serve)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    exposition(&state.registry)
}

async fn memory_handler(State(state): State<AppState>) -> Response {
    let Some(registry) = &state.memory else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Err(err) = memory::refresh(registry) {
        tracing::error!(%err, "memory statistics refresh failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    exposition(registry)
}

fn exposition(registry: &Registry) -> Response {
    (
        [(header::CONTENT_TYPE, text::CONTENT_TYPE)],
        text::render(registry),
    )
        .into_response()
}

#[cfg(unix)]
mod profiling {
    use super::{FLAMEGRAPH_PATH, PROFILE_PATH};
    use crate::{
        error::Result,
        profile::{self, DEFAULT_SECONDS, MAX_SECONDS},
    };
    use axum::{
        extract::Query,
        http::{StatusCode, header},
        response::{IntoResponse, Response},
    };
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    pub(super) struct ProfileParams {
        seconds: Option<u64>,
    }

    impl ProfileParams {
        fn duration(&self) -> Duration {
            Duration::from_secs(self.seconds.unwrap_or(DEFAULT_SECONDS).clamp(1, MAX_SECONDS))
        }
    }

    pub(super) async fn index_handler() -> Response {
        let body = format!(
            "profiles:\n\
             {PROFILE_PATH}?seconds=N\tCPU profile, profile.proto\n\
             {FLAMEGRAPH_PATH}?seconds=N\tCPU profile, SVG flamegraph\n"
        );
        ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }

    pub(super) async fn profile_handler(Query(params): Query<ProfileParams>) -> Response {
        let duration = params.duration();
        tracing::info!(?duration, "cpu profile requested");
        respond(
            "application/octet-stream",
            tokio::task::spawn_blocking(move || profile::pprof(duration)).await,
        )
    }

    pub(super) async fn flamegraph_handler(Query(params): Query<ProfileParams>) -> Response {
        let duration = params.duration();
        tracing::info!(?duration, "flamegraph requested");
        respond(
            "image/svg+xml",
            tokio::task::spawn_blocking(move || profile::flamegraph(duration)).await,
        )
    }

    fn respond(
        content_type: &'static str,
        result: std::result::Result<Result<Vec<u8>>, tokio::task::JoinError>,
    ) -> Response {
        match result {
            Ok(Ok(body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
            Ok(Err(err)) => {
                tracing::error!(%err, "cpu profile failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
            Err(err) => {
                tracing::error!(%err, "cpu profile task failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
