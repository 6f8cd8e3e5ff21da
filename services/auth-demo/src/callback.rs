//! `/azureResponse`: authorization code callback
//!
//! Every invocation ends in exactly one `CallbackOutcome`. A callback
//! carrying `error` is branched off first and never reaches the token
//! exchange, but it still has to present a live `state` for the caller's
//! own session before the error is recorded. The exchange itself runs at
//! most once per callback.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::SignedCookieJar;
use azure_auth::AccessToken;
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{ApiError, new_request_id};
use crate::metrics;
use crate::session::current_user;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug)]
pub enum CallbackOutcome {
    Success(AccessToken),
    ProviderError { code: String, description: String },
    Unauthorized(String),
    ExchangeFailed(String),
}

impl CallbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::ProviderError { .. } => "provider_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::ExchangeFailed(_) => "exchange_failed",
        }
    }
}

/// Drive one callback to its outcome, updating the session store on the way.
pub async fn handle_callback(
    state: &AppState,
    username: Option<String>,
    params: CallbackParams,
) -> CallbackOutcome {
    if let Some(code) = params.error {
        let description = params.error_description.unwrap_or_default();
        let Some(username) = username else {
            return CallbackOutcome::Unauthorized("no session".into());
        };
        let Some(auth_state) = params.state else {
            return CallbackOutcome::Unauthorized("missing state".into());
        };
        // Only a callback answering this user's own authorization may touch
        // the session; anything else leaves the current token in place.
        if let Err(e) = state
            .sessions
            .complete_authorization(&auth_state, &username)
            .await
        {
            return CallbackOutcome::Unauthorized(e.to_string());
        }
        if let Err(e) = state
            .sessions
            .store_error(
                &username,
                state.exchanger.credential(),
                format!("{code}: {description}"),
            )
            .await
        {
            return CallbackOutcome::Unauthorized(e.to_string());
        }
        return CallbackOutcome::ProviderError { code, description };
    }

    let Some(username) = username else {
        return CallbackOutcome::Unauthorized("no session".into());
    };
    let Some(auth_state) = params.state else {
        return CallbackOutcome::Unauthorized("missing state".into());
    };
    let pending = match state
        .sessions
        .complete_authorization(&auth_state, &username)
        .await
    {
        Ok(p) => p,
        Err(e) => return CallbackOutcome::Unauthorized(e.to_string()),
    };

    let Some(code) = params.code else {
        return CallbackOutcome::ProviderError {
            code: "invalid_request".into(),
            description: "authorization code missing from callback".into(),
        };
    };

    let credential = state.exchanger.credential();
    match state.exchanger.exchange(&code, &pending.code_verifier).await {
        Ok(token) => {
            match state
                .sessions
                .store_token(&username, credential, token.clone())
                .await
            {
                Ok(()) => CallbackOutcome::Success(token),
                Err(e) => CallbackOutcome::Unauthorized(e.to_string()),
            }
        }
        Err(e) => {
            let cause = e.to_string();
            if let Err(e) = state
                .sessions
                .store_error(&username, credential, cause.clone())
                .await
            {
                warn!(username, error = %e, "could not record exchange failure");
            }
            CallbackOutcome::ExchangeFailed(cause)
        }
    }
}

/// GET /azureResponse?code=&state= (or ?error=&error_description=)
pub async fn azure_response(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let request_id = new_request_id();
    let username = current_user(&jar);
    let outcome = handle_callback(&state, username.clone(), params).await;
    metrics::record_callback(outcome.label());

    let username = username.unwrap_or_default();
    match outcome {
        CallbackOutcome::Success(token) => {
            info!(username, request_id, expires_on = token.expires_on, "token stored");
            (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
        }
        CallbackOutcome::ProviderError { code, description } => {
            warn!(username, request_id, code, description, "provider reported error");
            ApiError::Provider { code, description }.into_response_with(&request_id)
        }
        CallbackOutcome::Unauthorized(reason) => {
            warn!(username, request_id, reason, "callback rejected");
            ApiError::Unauthorized(reason).into_response_with(&request_id)
        }
        CallbackOutcome::ExchangeFailed(cause) => {
            warn!(username, request_id, cause, "token exchange failed");
            ApiError::BadGateway(cause).into_response_with(&request_id)
        }
    }
}
