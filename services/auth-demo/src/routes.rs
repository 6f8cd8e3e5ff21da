//! Session routes: `/`, `/login`, `/logout`, `/azureLogin`

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::SignedCookieJar;
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{ApiError, new_request_id};
use crate::metrics;
use crate::session::{clear_session_cookie, current_user, session_cookie};

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    username: Option<String>,
}

/// GET /: what the server knows about the caller's session.
pub async fn index(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let Some(username) = current_user(&jar) else {
        return Json(serde_json::json!({ "logged_in": false })).into_response();
    };
    let Some(session) = state.sessions.get(&username).await else {
        return Json(serde_json::json!({ "logged_in": false })).into_response();
    };

    let azure = session.azure.as_ref();
    let token = azure.and_then(|a| a.access_token.as_ref());
    Json(serde_json::json!({
        "username": session.username,
        "logged_in": session.logged_in,
        "has_token": token.is_some_and(|t| !t.is_expired()),
        "token_expires_at": token.map(|t| t.expires_on),
        "error": azure.and_then(|a| a.error.clone()),
    }))
    .into_response()
}

/// GET|POST /login?username=: create the session and hand out its cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<LoginParams>,
) -> Response {
    let request_id = new_request_id();
    let username = match params.username.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => {
            metrics::record_login("invalid");
            return ApiError::BadRequest("username query parameter is required".into())
                .into_response_with(&request_id);
        }
    };

    match state.sessions.login(&username).await {
        Ok(session) => {
            metrics::record_login("ok");
            info!(username, request_id, "logged in");
            let jar = jar.add(session_cookie(&username));
            (
                jar,
                Json(serde_json::json!({
                    "username": session.username,
                    "logged_in": session.logged_in,
                })),
            )
                .into_response()
        }
        Err(e) => {
            metrics::record_login("conflict");
            warn!(username, request_id, error = %e, "login rejected");
            ApiError::from(e).into_response_with(&request_id)
        }
    }
}

/// GET /logout: drop the session and its token; point at the provider's
/// end-session page.
pub async fn logout(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let request_id = new_request_id();
    let jar_cleared = jar.clone().remove(clear_session_cookie());

    let Some(username) = current_user(&jar) else {
        return (
            jar_cleared,
            ApiError::Unauthorized("no session".into()).into_response_with(&request_id),
        )
            .into_response();
    };

    match state.sessions.logout(&username).await {
        Ok(_) => {
            info!(username, request_id, "logged out");
            let end_session_url = azure_auth::build_logout_url(
                &state.authority,
                state.post_logout_redirect_uri.as_deref(),
            );
            (
                jar_cleared,
                Json(serde_json::json!({
                    "username": username,
                    "logged_in": false,
                    "end_session_url": end_session_url,
                })),
            )
                .into_response()
        }
        Err(e) => {
            (jar_cleared, ApiError::from(e).into_response_with(&request_id)).into_response()
        }
    }
}

/// GET /azureLogin: issue a state + PKCE pair and redirect to the authority.
pub async fn azure_login(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let request_id = new_request_id();
    let Some(username) = current_user(&jar) else {
        return ApiError::Unauthorized("no session".into()).into_response_with(&request_id);
    };

    let auth_state = azure_auth::generate_state();
    let verifier = azure_auth::generate_verifier();
    let challenge = azure_auth::compute_challenge(&verifier);

    if let Err(e) = state
        .sessions
        .begin_authorization(&username, auth_state.clone(), verifier)
        .await
    {
        warn!(username, request_id, error = %e, "authorization refused");
        return ApiError::from(e).into_response_with(&request_id);
    }

    let url = azure_auth::build_authorize_url(&state.authority, &auth_state, Some(&challenge));
    info!(username, request_id, "redirecting to authority");
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}
