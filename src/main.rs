use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get, web};
use chrono::Duration;
use dotenvy::dotenv;
use serde_json::json;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use hrm_attendance::config::Config;
use hrm_attendance::db::{init_db, migrate};
use hrm_attendance::docs::ApiDoc;
use hrm_attendance::routes;
use hrm_attendance::service::{
    attendance::AttendanceService,
    clock::{Clock, SystemClock},
    qr_session::{QrSessionManager, SessionPolicy, spawn_expiry_sweep},
    schedule::ScheduleResolver,
};
use hrm_attendance::store::mysql::MySqlStore;

#[get("/health")]
async fn health() -> impl Responder {
    web::Json(json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url, config.database_max_connections)
        .await
        .map_err(|e| {
            error!(error = %e, "Database connection failed");
            e
        })?;
    migrate(&pool).await?;

    let store = Arc::new(MySqlStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sessions = Arc::new(QrSessionManager::new(
        store.clone(),
        clock.clone(),
        SessionPolicy {
            rotating_default_minutes: config.qr_rotating_default_minutes,
            static_default_hours: config.qr_static_default_hours,
        },
    ));
    let attendance = Arc::new(AttendanceService::new(
        sessions.clone(),
        store.clone(),
        store.clone(),
        ScheduleResolver::new(
            store.clone(),
            Duration::minutes(config.attendance_grace_minutes),
        ),
        clock,
    ));

    let _sweep = spawn_expiry_sweep(
        sessions.clone(),
        std::time::Duration::from_secs(config.qr_sweep_interval_secs.max(1)),
    );

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(config.clone()))
            .app_data(Data::from(sessions.clone()))
            .app_data(Data::from(attendance.clone()))
            .service(health)
            // Public check-in + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
