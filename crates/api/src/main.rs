//! # Attendance API Server
//!
//! HTTP server for the attendance platform, built on Axum. Startup order:
//! configuration → tracing → database pool → migrations → RBAC bootstrap →
//! service construction → router → serve with graceful shutdown.
//!
//! Requests to protected routes flow through the authorization chain
//! (authenticate → attach city scope → require scope → authorize) declared
//! per route group in the handler modules.

use attend_auth::{AuthRepository, AuthService, AuthState};
use attend_core::{config::CorsConfig, Config, DatabasePool, JwtService};
use attend_workforce::attendance::{AttendanceCalendar, AttendanceRepository};
use attend_workforce::report::ReportEngine;
use attend_workforce::{
    EmployeeRepository, EnrolmentService, HttpFaceService, ImageStore, LocationRepository,
    MessagingGateway, PunchService,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::{response::IntoResponse, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

mod api_middleware;
mod error;
mod handlers;
mod health;
mod state;

use crate::handlers::{attendance, auth, locations, punch, rbac, whatsapp};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting attendance server...");

    let config = Config::load()?;
    info!("Configuration loaded");

    let db = DatabasePool::new(&config.database).await?;
    info!("Database pool initialized");

    run_migrations(&db).await?;
    attend_auth::bootstrap_rbac(&db).await?;
    info!("Schema and RBAC bootstrap complete");

    let app_state = build_state(config.clone(), db);
    let app = create_app(app_state)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn build_state(config: Config, db: DatabasePool) -> AppState {
    let jwt = Arc::new(JwtService::new(&config.jwt));
    let auth_repo = AuthRepository::new(db.clone());
    let auth_service = Arc::new(AuthService::new(auth_repo, jwt.clone()));
    let auth_state = AuthState {
        jwt,
        access: auth_service.access().clone(),
    };

    let calendar = AttendanceCalendar::new(config.attendance_tz(), config.attendance.rollover_hour);
    let attendance_repo = AttendanceRepository::new(db.clone());
    let employee_repo = EmployeeRepository::new(db.clone());
    let face = Arc::new(HttpFaceService::new(config.face.clone()));
    let store = Arc::new(ImageStore::new(&config.storage));

    let punch = Arc::new(PunchService::new(
        attendance_repo.clone(),
        employee_repo.clone(),
        face.clone(),
        store.clone(),
        calendar,
        config.face.match_threshold,
    ));
    let enrolment = Arc::new(EnrolmentService::new(employee_repo, face, store.clone()));

    AppState {
        locations: LocationRepository::new(db.clone()),
        attendance: attendance_repo,
        reports: Arc::new(ReportEngine::new(db.clone())),
        messaging: Arc::new(MessagingGateway::new(config.messaging.clone())),
        auth_service,
        auth_state,
        punch,
        enrolment,
        store,
        config,
        db,
    }
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    #[derive(OpenApi)]
    #[openapi(
        paths(health::health_check, health::readiness_check),
        tags(
            (name = "health", description = "Health check endpoints"),
            (name = "auth", description = "Authentication and authorization"),
            (name = "attendance", description = "Attendance records and reports"),
        )
    )]
    struct ApiDoc;
    let _ = ApiDoc::openapi();

    let auth_state = state.auth_state.clone();

    let api = Router::new()
        .nest("/auth", auth::auth_routes(&auth_state))
        .nest("/rbac", rbac::rbac_routes(&auth_state))
        .merge(locations::location_routes(&auth_state))
        .nest("/attendance", attendance::attendance_routes(&auth_state))
        .nest("/app/attendance/employee", punch::app_attendance_routes(&auth_state))
        .nest("/whatsapp", whatsapp::whatsapp_routes(&auth_state));

    let router = Router::new()
        .nest("/api", api)
        .route("/health", axum::routing::get(health::health_check))
        .route("/ready", axum::routing::get(health::readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(
                    api_middleware::security_headers::security_headers_middleware,
                ))
                .layer(axum::middleware::from_fn(
                    api_middleware::request_id::request_id_middleware,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(build_cors_layer(&state.config.cors)?),
        )
        .with_state(state)
        .fallback(handler_404);

    Ok(router)
}

fn build_cors_layer(cors: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let origins: Result<Vec<HeaderValue>, _> =
        cors.allowed_origins.iter().map(|o| o.parse()).collect();

    Ok(CorsLayer::new()
        .allow_origin(origins?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-access-token"),
            axum::http::HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(cors.allow_credentials))
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Resource not found" })),
    )
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "attend_api=debug,attend_auth=debug,attend_core=debug,attend_workforce=debug,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_migrations(db: &DatabasePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");
    let migrator = sqlx::migrate!("../../migrations");
    migrator.run(db.pool()).await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!("Failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
