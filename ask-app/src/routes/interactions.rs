//! Signed interaction webhook.

use crate::driver::{AskDecision, ConversationOutcome};
use crate::server::BotState;
use crate::sweeper::{DM_ONLY_MESSAGE, SWEEP_STARTED_MESSAGE};
use ask_platform::{CommandAction, CommandRequest, Interaction, InteractionResponse};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

pub fn router(path: &str) -> axum::Router {
    axum::Router::new().route(path, post(handle_interaction))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Invalid request signature" })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verifies the signature over the raw body before anything is parsed.
#[tracing::instrument(level = "debug", skip_all)]
async fn handle_interaction(
    Extension(state): Extension<Arc<BotState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (Some(signature), Some(timestamp)) = (
        header_str(&headers, SIGNATURE_HEADER),
        header_str(&headers, TIMESTAMP_HEADER),
    ) else {
        tracing::warn!("interaction rejected: missing signature headers");
        return unauthorized();
    };
    if !state.verifier.verify(&body, signature, timestamp) {
        tracing::warn!("interaction rejected: invalid signature");
        return unauthorized();
    }

    let interaction = match Interaction::from_slice(&body) {
        Ok(interaction) => interaction,
        Err(e) => {
            tracing::warn!(error = %e, "interaction rejected: malformed payload");
            return bad_request("Malformed interaction");
        }
    };

    match interaction {
        Interaction::Ping => Json(InteractionResponse::pong()).into_response(),
        Interaction::Command(request) => dispatch_command(&state, request),
        Interaction::Unsupported { kind } => {
            tracing::info!(kind, "unsupported interaction type");
            bad_request("Unknown interaction type")
        }
    }
}

fn dispatch_command(state: &Arc<BotState>, request: CommandRequest) -> Response {
    let action = request.invocation().action.clone();
    match action {
        CommandAction::Ask { question } => {
            match state.driver.admit(request, question, Instant::now()) {
                AskDecision::Respond(response) => Json(response).into_response(),
                AskDecision::Proceed(conversation) => {
                    let driver = state.driver.clone();
                    tokio::spawn(async move {
                        match driver.run(conversation).await {
                            ConversationOutcome::Completed { frames } => {
                                tracing::debug!(frames, "ask task finished");
                            }
                            ConversationOutcome::Failed { error } => {
                                tracing::debug!(%error, "ask task finished after failure");
                            }
                        }
                    });
                    Json(InteractionResponse::deferred()).into_response()
                }
            }
        }
        CommandAction::ClearDm => {
            if !request.is_direct_message() {
                return Json(InteractionResponse::message(DM_ONLY_MESSAGE)).into_response();
            }
            let sweeper = state.sweeper.clone();
            let invocation = request.invocation().clone();
            tokio::spawn(async move {
                sweeper.clear_and_report(&invocation).await;
            });
            Json(InteractionResponse::message(SWEEP_STARTED_MESSAGE)).into_response()
        }
        CommandAction::Other(name) => {
            tracing::info!(command = %name, "unknown command");
            bad_request("Unknown interaction type")
        }
    }
}
