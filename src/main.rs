//! IFSports auth service - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ifsports_auth_lib::api;
use ifsports_auth_lib::config::Config;
use ifsports_auth_lib::db::{DbPool, SeaOrmUserStore};
use ifsports_auth_lib::error::json_error_handler;
use ifsports_auth_lib::middleware::{RequestLogger, TrustedOrigins};
use ifsports_auth_lib::services::AmqpTransport;
use ifsports_auth_lib::services::provisioning::ensure_default_organizer;
use ifsports_auth_lib::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, JWT_SIGNING_KEY and SUAP_CLIENT_SECRET must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  IFSports Auth Service");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    // Initialize database
    let pool = match DbPool::new(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }
    info!("Database migrations complete");

    let store = Arc::new(SeaOrmUserStore::new(pool));

    match store.purge_expired_blacklist().await {
        Ok(0) => {}
        Ok(n) => info!("Purged {} expired blacklist entries", n),
        Err(e) => warn!("Failed to purge token blacklist: {}", e),
    }

    if let Some(password) = &config.default_admin_password {
        match ensure_default_organizer(store.as_ref(), password).await {
            Ok(user) => info!("Default organizer '{}' ready", user.matricula),
            Err(e) => {
                error!("Failed to ensure default organizer: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Audit broker: one shared connection, opened now and reopened on demand
    let transport = Arc::new(AmqpTransport::new(config.broker_url.clone()));
    transport.warm_up().await;

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let allowed_origins = config.allowed_origins.clone();
    let trusted_origins = config.trusted_origins.clone();

    let state = match AppState::new(config, store.clone(), store, transport) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    // Start HTTP server
    let server = HttpServer::new(move || {
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            .wrap(TrustedOrigins::new(trusted_origins.clone()))
            .wrap(RequestLogger)
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_auth_routes)
                    .configure(api::configure_user_routes)
                    .configure(api::configure_openapi_routes),
            )
    });

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
