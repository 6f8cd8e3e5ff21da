//! `/me`: protected resource proxy
//!
//! Forwards one authenticated GET to the resource API and relays the
//! upstream status and body verbatim. No retries: a failed call surfaces as
//! 502/504 and the user tries again.

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::SignedCookieJar;
use azure_auth::AccessToken;
use tracing::{error, info, instrument, warn};

use crate::AppState;
use crate::error::{ApiError, new_request_id};
use crate::metrics;
use crate::session::current_user;

#[derive(Clone)]
pub struct ResourceState {
    pub client: reqwest::Client,
    pub url: String,
    pub timeout: Duration,
    /// Answer with a canned profile instead of calling `url`.
    pub mock: bool,
}

/// Call the resource API with `token` and relay whatever comes back.
#[instrument(skip_all, fields(request_id = %request_id, username = %username))]
pub async fn call_resource(
    resource: &ResourceState,
    token: &AccessToken,
    username: &str,
    request_id: &str,
) -> Response {
    let started = Instant::now();

    if resource.mock {
        metrics::record_resource_call(200, started.elapsed().as_secs_f64());
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            canned_profile(username).to_string(),
        )
            .into_response();
    }

    let result = resource
        .client
        .get(&resource.url)
        .bearer_auth(token.token.expose())
        .timeout(resource.timeout)
        .send()
        .await;

    let upstream = match result {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            error!(error = %e, "resource call timed out");
            return ApiError::GatewayTimeout(format!(
                "resource API did not answer within {}s",
                resource.timeout.as_secs()
            ))
            .into_response_with(request_id);
        }
        Err(e) => {
            error!(error = %e, "resource call failed");
            return ApiError::BadGateway(format!("resource API unreachable: {e}"))
                .into_response_with(request_id);
        }
    };

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to read resource body");
            return ApiError::BadGateway(format!("resource response read error: {e}"))
                .into_response_with(request_id);
        }
    };

    metrics::record_resource_call(status.as_u16(), started.elapsed().as_secs_f64());
    info!(status = status.as_u16(), "resource call completed");

    let mut response = Response::builder().status(status);
    if let Some(ct) = content_type {
        response = response.header(header::CONTENT_TYPE, ct);
    }
    response
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|e| {
            ApiError::BadGateway(format!("response build error: {e}")).into_response_with(request_id)
        })
}

fn canned_profile(username: &str) -> serde_json::Value {
    serde_json::json!({
        "displayName": username,
        "userPrincipalName": format!("{username}@example.test"),
        "source": "canned",
    })
}

/// GET /me: requires a logged-in session holding a live token.
pub async fn me(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let request_id = new_request_id();
    let Some(username) = current_user(&jar) else {
        return ApiError::Unauthorized("no session".into()).into_response_with(&request_id);
    };

    let token = match state.sessions.access_token(&username).await {
        Ok(t) => t,
        Err(e) => {
            warn!(username, request_id, error = %e, "resource call refused");
            return ApiError::from(e).into_response_with(&request_id);
        }
    };

    call_resource(&state.resource, &token, &username, &request_id).await
}
