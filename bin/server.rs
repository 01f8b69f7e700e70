// Payment Dispatch - Web Server
// Upload roster + archive, review bundles, confirm each send

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use payment_dispatch::{build_sender, normalize, AppConfig, Session, SessionSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

/// Uploads above this are rejected
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Sessions untouched for this long are dropped (tab closed without DELETE)
const SESSION_IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

type SharedSession = Arc<Mutex<Session>>;

/// One open session; its own lock so a slow send never blocks the map
struct SessionEntry {
    session: SharedSession,
    last_used: Instant,
}

type SessionMap = HashMap<Uuid, SessionEntry>;

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    sessions: Arc<Mutex<SessionMap>>,
}

impl AppState {
    fn sessions(&self) -> Result<MutexGuard<'_, SessionMap>, ApiError> {
        self.sessions
            .lock()
            .map_err(|_| ApiError::internal("session store poisoned"))
    }

    /// Look up a session and mark it as used; the map lock is released on return
    fn checkout(&self, id: Uuid) -> Result<SharedSession, ApiError> {
        let mut sessions = self.sessions()?;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| ApiError::session_not_found(id))?;

        entry.last_used = Instant::now();
        Ok(Arc::clone(&entry.session))
    }
}

fn lock_session(session: &SharedSession) -> Result<MutexGuard<'_, Session>, ApiError> {
    session
        .lock()
        .map_err(|_| ApiError::internal("session poisoned"))
}

/// Remove sessions idle for longer than `ttl`
///
/// Returned so the caller drops them (and deletes their files) outside the lock.
fn sweep_idle(sessions: &mut SessionMap, now: Instant, ttl: Duration) -> Vec<SharedSession> {
    let expired: Vec<Uuid> = sessions
        .iter()
        .filter(|(_, entry)| now.saturating_duration_since(entry.last_used) > ttl)
        .map(|(id, _)| *id)
        .collect();

    expired
        .into_iter()
        .filter_map(|id| {
            log::info!("Session {} expired after inactivity", id);
            sessions.remove(&id).map(|entry| entry.session)
        })
        .collect()
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn session_not_found(id: Uuid) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("Session not found: {}", id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Deserialize)]
struct SendRequest {
    /// Explicit operator answer; anything but true declines
    #[serde(default)]
    confirm: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/sessions - multipart fields "roster" (CSV) and "archive" (ZIP)
async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<SessionSummary> {
    let mut roster = None;
    let mut archive = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

        match name.as_str() {
            "roster" => roster = Some(data),
            "archive" => archive = Some(data),
            other => log::debug!("Ignoring upload field {:?}", other),
        }
    }

    let (roster, archive) = match (roster, archive) {
        (Some(roster), Some(archive)) => (roster, archive),
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Both 'roster' and 'archive' files are required",
            ))
        }
    };

    let config = Arc::clone(&state.config);
    let session = tokio::task::spawn_blocking(move || {
        Session::from_uploads(&roster, &archive, &config.roster)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("{:#}", e)))?;

    let summary = session.summary();
    let expired = {
        let mut sessions = state.sessions()?;
        let expired = sweep_idle(&mut sessions, Instant::now(), SESSION_IDLE_TTL);
        sessions.insert(
            session.id(),
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                last_used: Instant::now(),
            },
        );
        expired
    };
    // Fuera del lock: borra los directorios temporales
    drop(expired);

    log::info!("Session {} created ({} suppliers)", summary.id, summary.suppliers.len());
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /api/sessions/:id - Results view
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSummary> {
    let shared = state.checkout(id)?;

    // Puede estar esperando a un envío en curso de esta misma sesión
    let summary = tokio::task::spawn_blocking(move || {
        lock_session(&shared).map(|session| session.summary())
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(ApiResponse::ok(summary)))
}

/// POST /api/sessions/:id/suppliers/:name/send - {"confirm": true} sends
async fn send_supplier(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    Json(request): Json<SendRequest>,
) -> ApiResult<SessionSummary> {
    let name = normalize(&name);
    let shared = state.checkout(id)?;

    // SMTP es bloqueante: fuera del runtime async, sólo con el lock de esta sesión
    tokio::task::spawn_blocking(move || {
        let mut session = lock_session(&shared)?;

        if !request.confirm {
            session
                .decline(&name)
                .map_err(|e| ApiError::new(StatusCode::NOT_FOUND, format!("{:#}", e)))?;
            return Ok(Json(ApiResponse::ok(session.summary())));
        }

        if session.bundle(&name).is_none() {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                format!("Supplier not in results: {}", name),
            ));
        }

        let sender = build_sender(&state.config.mail)
            .map_err(|e| ApiError::internal(format!("{:#}", e)))?;

        session
            .send(&name, sender.as_ref())
            .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, format!("{:#}", e)))?;

        Ok(Json(ApiResponse::ok(session.summary())))
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
}

/// DELETE /api/sessions/:id - Drop session and its extracted files
async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Uuid> {
    let removed = state.sessions()?.remove(&id);

    match removed {
        Some(entry) => {
            // Drop fuera del lock: borra el directorio temporal
            // (un envío en curso conserva su Arc hasta terminar)
            drop(entry);
            log::info!("Session {} closed", id);
            Ok(Json(ApiResponse::ok(id)))
        }
        None => Err(ApiError::session_not_found(id)),
    }
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

/// Ctrl+C or SIGTERM (systemd, docker stop) both end in a graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl+C received, shutting down"),
        _ = terminate => log::info!("SIGTERM received, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("🌐 Payment Dispatch - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::var_os("PAYMENT_DISPATCH_CONFIG").map(std::path::PathBuf::from);
    let config = AppConfig::resolve(config_path.as_deref())?;

    // Fallar temprano si el remitente/transporte es inválido
    build_sender(&config.mail)?;
    println!("✓ Mail transport: {:?}", config.mail.transport);

    let state = AppState {
        config: Arc::new(config),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/suppliers/:name/send", post(send_supplier))
        .with_state(state.clone());

    // Build main router
    let app = Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("PAYMENT_DISPATCH_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Sesiones abiertas: borrar archivos extraídos
    let open = match state.sessions.lock() {
        Ok(mut sessions) => sessions.drain().count(),
        Err(poisoned) => poisoned.into_inner().drain().count(),
    };
    println!("✓ Closed {} open session(s)", open);

    Ok(())
}
