//! Thin process entrypoint: wires the library's components together and
//! exposes a single HTTP route as a smoke-test harness. The pipeline itself
//! is the product; this binary is a way to exercise it end to end, not a
//! general-purpose gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use mimalloc::MiMalloc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal;

use semcache::{
    CacheKindLabel, Config, CostTracker, Dispatcher, Embedder, EmbedderConfig, GenAiProvider,
    OpenAiProvider, Pool, Provider, QdrantConnector, QueryPipeline, RateLimiter, SimilarityCache,
    SinterConfig, SinterEmbedder,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

type Pipeline = QueryPipeline<QdrantConnector>;

struct AppState {
    pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    text: String,
    provider: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryResponseBody {
    content: String,
    from_cache: bool,
    cache_kind: &'static str,
    provider: String,
    model: String,
    total_tokens: u32,
    cost_usd: f64,
    created: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        vector_url = %config.vector_url(),
        "semcache starting"
    );

    let sinter_config = match std::env::var("SEMCACHE_MODEL_PATH") {
        Ok(path) if !path.trim().is_empty() => SinterConfig::new(std::path::PathBuf::from(path)),
        _ => {
            tracing::warn!("no SEMCACHE_MODEL_PATH configured, running embedder in stub mode");
            SinterConfig::stub()
        }
    };
    let embedder = Arc::new(Embedder::new(
        SinterEmbedder::load(sinter_config)?,
        EmbedderConfig::default(),
    ));

    let connector = QdrantConnector::new(config.vector_url());
    let pool = Pool::connect(connector, config.pool_config()).await?;
    let _janitor = pool.start_janitor();

    let cache = Arc::new(SimilarityCache::new(pool, embedder, config.cache_config()).await?);

    let providers: Vec<Arc<dyn Provider>> = vec![
        Arc::new(OpenAiProvider::new("openai")),
        Arc::new(GenAiProvider::new("genai")),
    ];
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiter_config()));
    let cost_tracker = Arc::new(CostTracker::new());
    let dispatcher = Arc::new(Dispatcher::new(
        providers,
        config.dispatcher_config(),
        Arc::clone(&rate_limiter),
        Arc::clone(&cost_tracker),
    ));

    let pipeline = Arc::new(QueryPipeline::new(
        cache,
        dispatcher,
        cost_tracker,
        config.pipeline_config(),
    ));

    let state = Arc::new(AppState { pipeline });
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/query", post(handle_query))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("semcache shutdown complete");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponseBody>, axum::http::StatusCode> {
    let mut query = semcache::Query::new(request.text);
    query.provider = request.provider;
    query.model = request.model;

    let ctx = semcache::RequestContext::new();
    match state.pipeline.run(query, ctx).await {
        Ok((response, failures)) => {
            for failure in &failures {
                tracing::warn!(step = %failure.step, error = %failure.error, "pipeline step failed, continuing");
            }
            Ok(Json(QueryResponseBody {
                content: response.content,
                from_cache: response.from_cache,
                cache_kind: match response.cache_kind {
                    CacheKindLabel::Exact => "exact",
                    CacheKindLabel::Semantic => "semantic",
                    CacheKindLabel::None => "none",
                },
                provider: response.provider,
                model: response.model,
                total_tokens: response.total_tokens,
                cost_usd: response.cost_usd,
                created: chrono::Utc::now().timestamp(),
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline run failed");
            Err(axum::http::StatusCode::BAD_GATEWAY)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
