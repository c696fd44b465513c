use authgate::{
    config::AppConfig,
    db, repositories, router,
    services::{self, federation_service::FederationService, otp_service::OtpService,
        session_service::SessionService},
    AppState,
};

use axum::http::{header, HeaderValue, Method};
use repositories::account_repository::SqliteAccountRepository;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authgate=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration is read once; missing required values are fatal here
    // and never surfaced per-request.
    let config = AppConfig::from_env()?;

    // Database connection
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Initialize repositories
    let account_repository = Arc::new(SqliteAccountRepository::new(pool.clone()));

    // External capabilities
    let notifier = services::create_notifier(&config.email);
    let identity_oracle: Arc<dyn services::IdentityOracle> =
        Arc::new(services::HttpIdentityOracle::new(&config.oracle));

    // Initialize services
    let otp_service = Arc::new(OtpService::new(
        account_repository.clone(),
        notifier,
        identity_oracle.clone(),
    ));
    let session_service = Arc::new(SessionService::new(config.session.clone()));
    let federation_service = Arc::new(FederationService::new(account_repository.clone()));

    let app_state = AppState {
        otp_service,
        session_service,
        federation_service,
        account_repository: account_repository as Arc<dyn repositories::AccountRepository>,
        identity_oracle,
    };

    // The frontend calls with credentials, so the allowed origin must be
    // exact rather than a wildcard.
    let cors_layer = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let app = router(app_state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));

    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
