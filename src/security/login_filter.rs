use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::security::error::{AuthError, ErrorResponse};
use crate::security::filter::RequestFilter;
use crate::security::session_service::SessionService;
use crate::security::token_provider::{set_access_token_header, set_refresh_token_header, TokenPair};

pub const SIGN_IN_PATH: &str = "/members/sign-in";

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

/// Terminates `POST /members/sign-in`: authenticates, issues a token pair and
/// returns it both as headers and as the JSON body.
#[derive(Debug)]
pub struct LoginFilter {
    sessions: Arc<SessionService>,
}

impl LoginFilter {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self { sessions }
    }

    async fn sign_in(&self, request: SignInRequest) -> Result<Response, AuthError> {
        let pair = self
            .sessions
            .sign_in(&request.username, &request.password)
            .await?;
        token_pair_response(pair)
    }
}

fn token_pair_response(pair: TokenPair) -> Result<Response, AuthError> {
    let mut response = Json(&pair).into_response();
    set_access_token_header(response.headers_mut(), &pair.access_token)?;
    set_refresh_token_header(response.headers_mut(), &pair.refresh_token)?;
    Ok(response)
}

#[async_trait]
impl RequestFilter for LoginFilter {
    fn name(&self) -> &'static str {
        "login"
    }

    fn should_skip(&self, path: &str) -> bool {
        path != SIGN_IN_PATH
    }

    async fn handle(&self, request: Request, _next: Next) -> Response {
        if request.method() != Method::POST {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(ErrorResponse {
                    error: "sign-in requires POST".to_string(),
                }),
            )
                .into_response();
        }
        let Json(body) = match Json::<SignInRequest>::from_request(request, &()).await {
            Ok(body) => body,
            Err(rejection) => {
                debug!(error = %rejection, "unreadable sign-in body");
                return rejection.into_response();
            }
        };
        match self.sign_in(body).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
}
