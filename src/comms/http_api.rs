use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::directory::{Member, MemberRepository};
use crate::security::error::AuthError;
use crate::security::filter::run_filter;
use crate::security::login_filter::LoginFilter;
use crate::security::session_service::{LogoutOutcome, SessionService};
use crate::security::session_store::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::security::token_provider::{
    resolve_access_token, resolve_refresh_token, set_access_token_header, TokenProvider, GRANT_TYPE,
};
use crate::security::verification_filter::VerificationFilter;
use crate::security::Authenticated;

type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub members: Arc<MemberRepository>,
    pub sessions: Arc<SessionService>,
}

impl AppState {
    /// Wire the token provider, directory and the given store together.
    pub fn new(config: Arc<Config>, store: Arc<dyn SessionStore>) -> Result<Self> {
        let tokens = Arc::new(TokenProvider::new(&config.jwt).context("deriving signing key")?);
        let members = Arc::new(
            MemberRepository::from_seeds(&config.members).context("seeding member directory")?,
        );
        let sessions = Arc::new(SessionService::new(
            tokens,
            store,
            members.clone(),
            members.clone(),
            config.refresh_record_ttl(),
        ));
        Ok(Self {
            config,
            members,
            sessions,
        })
    }

    /// Like [`AppState::new`], choosing the store from configuration.
    pub async fn connect(config: Arc<Config>) -> Result<Self> {
        let store: Arc<dyn SessionStore> = match &config.store.redis_url {
            Some(url) => Arc::new(
                RedisSessionStore::connect(url, config.store.op_timeout())
                    .await
                    .context("connecting to redis session store")?,
            ),
            None => {
                warn!("no store.redis_url configured; sessions are kept in process memory");
                Arc::new(MemorySessionStore::new())
            }
        };
        Self::new(config, store)
    }
}

#[derive(Deserialize)]
pub struct JoinRequest {
    pub username: String,
    pub password: String,
    pub nickname: Option<String>,
}

/// Role granted to every self-registered member.
pub const JOIN_ROLE: &str = "user";

#[derive(Serialize)]
pub struct ReissueResponse {
    pub grant_type: String,
    pub access_token: String,
    pub access_token_expires_in: i64,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub username: String,
    pub authorities: Vec<String>,
}

async fn root() -> impl IntoResponse {
    Json(json!({"service": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")}))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn error_page() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "request could not be processed"})))
}

async fn fallback() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

// Current member
async fn me(Authenticated(principal): Authenticated) -> impl IntoResponse {
    Json(MeResponse {
        username: principal.identity().to_string(),
        authorities: principal.authorities().to_vec(),
    })
}

async fn api1(auth: Authenticated) -> Result<impl IntoResponse, AuthError> {
    auth.require_authority("ROLE_user")?;
    Ok(Json(json!({"api": "api1"})))
}

async fn api2(auth: Authenticated) -> Result<impl IntoResponse, AuthError> {
    auth.require_authority("ROLE_admin")?;
    Ok(Json(json!({"api": "api2"})))
}

async fn join(
    State(state): State<SharedState>,
    Json(req): Json<JoinRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let member: Member = state.members.save(
        req.username,
        req.password,
        req.nickname,
        vec![JOIN_ROLE.to_string()],
    )?;
    info!(id = member.id, username = %member.username, "member joined");
    Ok((StatusCode::CREATED, Json(member)))
}

// Refresh token in, new access token out (header and body)
async fn reissue(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let refresh = resolve_refresh_token(&headers);
    let reissued = state.sessions.reissue(refresh.as_deref()).await?;
    let mut response = Json(ReissueResponse {
        grant_type: GRANT_TYPE.to_string(),
        access_token: reissued.access_token.clone(),
        access_token_expires_in: reissued.access_token_expires_in,
    })
    .into_response();
    set_access_token_header(response.headers_mut(), &reissued.access_token)?;
    Ok(response)
}

async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let refresh = resolve_refresh_token(&headers);
    let access = resolve_access_token(&headers);
    let outcome = state
        .sessions
        .logout(refresh.as_deref(), access.as_deref())
        .await?;
    let body = match outcome {
        LogoutOutcome::LoggedOut { access_revoked } => {
            json!({"status": "logged out", "access_token_revoked": access_revoked})
        }
        LogoutOutcome::NoActiveSession => json!({"status": "no active session"}),
    };
    Ok(Json(body))
}

/// Routes plus the filter pipeline: login filter first, then verification.
pub fn create_router(state: SharedState) -> Router {
    let login = Arc::new(LoginFilter::new(state.sessions.clone()));
    let verification = Arc::new(VerificationFilter::new(state.sessions.clone()));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/favicon.ico", get(favicon))
        .route("/error", get(error_page))
        .route("/members", get(me))
        .route("/members/join", post(join))
        .route("/members/reissue", get(reissue).post(reissue))
        .route("/members/logout", get(logout).post(logout))
        .route("/api1", get(api1))
        .route("/api2", get(api2))
        // Sign-in has no route of its own; the login filter answers it.
        .fallback(fallback)
        .with_state(state)
        .layer(from_fn_with_state(verification, run_filter::<VerificationFilter>))
        .layer(from_fn_with_state(login, run_filter::<LoginFilter>))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: Config, port: u16) -> Result<()> {
    let state = Arc::new(AppState::connect(Arc::new(config)).await?);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).into_future().await?;
    Ok(())
}
