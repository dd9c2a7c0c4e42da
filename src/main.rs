// src/main.rs - Digital library circulation service
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{Compress, DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use rand::seq::SliceRandom;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sqlx::SqlitePool;
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod admin_handlers;
mod audit;
mod auth;
mod auth_handlers;
mod book_handlers;
mod bookshelf_handlers;
mod borrow_handlers;
mod circulation;
mod clock;
mod config;
mod db;
mod error;
mod fines;
mod handlers;
mod models;
mod monitoring;
mod pagination;
mod report_handlers;
pub mod repositories;
mod routes;
pub mod validator;

use crate::auth::{AuthService, User};
use crate::circulation::CirculationEngine;
use crate::clock::{Clock, SystemClock};
use crate::config::{load_config, Config, SecurityConfig};
use crate::fines::LoanPolicy;
use crate::monitoring::{Metrics, RequestMetrics};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub circulation: CirculationEngine,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config, clock: Arc<dyn Clock>) -> Self {
        let policy = LoanPolicy::from(&config.lending);
        let circulation = CirculationEngine::new(db_pool.clone(), clock, policy);
        Self { db_pool, config, circulation }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (reads .env first)
    let config = load_config()?;

    setup_logging(&config)?;
    config.print_startup_info();

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(&config.auth));
    create_default_admin_if_needed(&pool, &auth_service).await?;

    let app_state = Arc::new(AppState::new(pool, config.clone(), Arc::new(SystemClock)));
    let metrics = Arc::new(Metrics::new());

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let server_config = config.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(setup_cors(&server_config.security, server_config.is_production()))
            .wrap(setup_security_headers(&server_config.security))
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestMetrics::new(metrics.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .app_data(web::JsonConfig::default().limit(server_config.security.max_request_size))
            .configure(routes::configure)
    })
    .keep_alive(std::time::Duration::from_secs(config.server.keep_alive))
    .client_request_timeout(std::time::Duration::from_secs(config.server.client_timeout))
    .client_disconnect_timeout(std::time::Duration::from_secs(config.server.client_shutdown));

    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await?;

    log::info!("Server stopped");
    Ok(())
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    Ok(())
}

fn setup_cors(config: &SecurityConfig, is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .max_age(3600);

    // Config validation already refused a wildcard in production
    if !is_production && config.allowed_origins.iter().any(|o| o == "*") {
        log::warn!("Using wildcard CORS (*) in development mode");
        return cors.allow_any_origin();
    }

    for origin in config.allowed_origins.iter().filter(|o| !o.is_empty()) {
        cors = cors.allowed_origin(origin);
    }
    cors
}

fn setup_security_headers(config: &SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload",
        ));
    }

    headers
}

/// At least one upper, lower and digit so it passes the password rules.
fn generate_admin_password() -> String {
    let mut rng = thread_rng();
    let mut chars: Vec<char> = vec![
        rng.gen_range(b'A'..=b'Z') as char,
        rng.gen_range(b'a'..=b'z') as char,
        rng.gen_range(b'0'..=b'9') as char,
    ];
    chars.extend((&mut rng).sample_iter(&Alphanumeric).take(13).map(char::from));
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    let admin_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    if admin_count > 0 {
        return Ok(());
    }

    let (password, generated) = match env::var("DEFAULT_ADMIN_PASSWORD") {
        Ok(password) => (password, false),
        Err(_) => (generate_admin_password(), true),
    };

    User::create_admin(pool, "admin", "admin@library.local", &password, auth_service)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create default admin user: {}", e))?;

    log::warn!("Default admin user created:");
    log::warn!("  Username: admin");
    if generated {
        log::warn!("  Password: {} (generated - CHANGE IMMEDIATELY!)", password);
    } else {
        log::warn!("  Password: taken from DEFAULT_ADMIN_PASSWORD");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_auth_service;
    use crate::validator::FieldValidator;

    #[test]
    fn test_generated_admin_password_is_strong() {
        for _ in 0..20 {
            let password = generate_admin_password();
            assert_eq!(password.len(), 16);
            assert!(FieldValidator::password_strength(&password).is_ok());
        }
    }

    #[actix_rt::test]
    async fn test_default_admin_created_once() {
        let pool = db::testing::memory_pool().await;
        let auth = test_auth_service();

        create_default_admin_if_needed(&pool, &auth).await.unwrap();
        create_default_admin_if_needed(&pool, &auth).await.unwrap();

        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);
    }
}
