//! ScholarMint API Gateway
//!
//! The HTTP surface of the publishing pipeline.
//! Handles:
//! - Session tokens and identity enrichment
//! - Rate limiting
//! - Request routing to the publisher, ownership guard and identity stores
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use scholarmint_common::{
    auth::JwtManager,
    cache::create_checkpoint_store,
    chain::create_chain_client,
    config::{AppConfig, ObservabilityConfig},
    db::{ArticleStore, DbPool, IdentityStore, Repository},
    errors::AppError,
    identity::{create_orcid_client, OrcidClient},
    metrics::{self, LATENCY_BUCKETS, PIPELINE_BUCKETS},
    ownership::OwnershipGuard,
    pinning::create_pinning_service,
};
use scholarmint_publisher::Publisher;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Option<DbPool>,
    pub articles: Arc<dyn ArticleStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub publisher: Arc<Publisher>,
    pub ownership: Arc<OwnershipGuard>,
    pub orcid: Arc<dyn OrcidClient>,
    pub jwt: Arc<JwtManager>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!(
        "Starting ScholarMint API Gateway v{}",
        scholarmint_common::VERSION
    );

    let config = Arc::new(config);

    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let state = build_state(config.clone(), db).await?;
    if state.publisher.clone().spawn_eviction().is_some() {
        info!(
            idle_secs = config.publishing.session_idle_secs,
            "Idle session eviction enabled"
        );
    }
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Serve Prometheus metrics on their own port
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("step_duration_seconds".to_string()),
            PIPELINE_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Wire stores and external clients from configuration
async fn build_state(config: Arc<AppConfig>, db: DbPool) -> Result<AppState, AppError> {
    let secret = config
        .auth
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Configuration {
            message: "auth.jwt_secret must be set".to_string(),
        })?;
    let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

    let repository = Arc::new(Repository::new(db.clone()));
    let pinning = create_pinning_service(&config.pinning)?;
    let chain = create_chain_client(&config.chain)?;
    let orcid = create_orcid_client(&config.orcid)?;
    let checkpoints = create_checkpoint_store(&config.redis).await?;

    let publisher = Arc::new(Publisher::new(
        pinning,
        chain,
        repository.clone(),
        repository.clone(),
        checkpoints,
        config.publishing.clone(),
    ));
    info!(
        checkpoints = publisher.checkpoint_backend(),
        "Publisher ready"
    );

    Ok(AppState {
        config,
        db: Some(db),
        articles: repository.clone(),
        identities: repository.clone(),
        publisher,
        ownership: Arc::new(OwnershipGuard::new(repository)),
        orcid,
        jwt,
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let limiter = middleware::rate_limit::create_rate_limiter(
        state.config.rate_limit.requests_per_second,
        state.config.rate_limit.burst,
    );

    let mut api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Publication pipeline
        .route("/drafts", post(handlers::drafts::start_draft))
        .route(
            "/drafts/{id}",
            get(handlers::drafts::get_draft).put(handlers::drafts::update_draft),
        )
        .route("/drafts/{id}/pdf", post(handlers::drafts::generate_pdf))
        .route("/drafts/{id}/cover", post(handlers::drafts::generate_cover))
        .route("/drafts/{id}/ipfs", post(handlers::drafts::upload_to_ipfs))
        .route("/drafts/{id}/mint", post(handlers::drafts::mint))
        .route("/drafts/{id}/persist", post(handlers::drafts::persist))

        // Published articles
        .route("/articles", get(handlers::articles::list_articles))
        .route("/articles/{id}", get(handlers::articles::get_article))

        // Ownership
        .route("/articles/{id}/claim", post(handlers::ownership::claim))
        .route("/articles/{id}/links/{kind}", post(handlers::ownership::link))

        // Identity proofs
        .route("/identity/orcid/callback", post(handlers::identity::orcid_callback))
        .route("/identity/world-id", post(handlers::identity::world_id))
        .route_layer(from_fn(middleware::metrics::track_metrics));

    if state.config.rate_limit.enabled {
        api_routes = api_routes.layer(from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    } else {
        warn!("Rate limiting disabled");
    }

    Router::new()
        .nest("/v1", api_routes)
        .layer(RequestBodyLimitLayer::new(state.config.server.max_body_bytes))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
