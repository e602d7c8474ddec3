use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use coffeebuddy_slack::commands::{
    InboundRequest, SIGNATURE_HEADER, SIGNATURE_HEADER_ALIAS, TIMESTAMP_HEADER,
    TIMESTAMP_HEADER_ALIAS,
};
use coffeebuddy_slack::handler::CoffeeCommandHandler;
use serde::Serialize;

pub const COFFEE_COMMAND_PATH: &str = "/slack/commands/coffee";

#[derive(Clone)]
pub struct CommandState {
    handler: Arc<CoffeeCommandHandler>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

pub fn router(handler: Arc<CoffeeCommandHandler>) -> Router {
    Router::new()
        .route(COFFEE_COMMAND_PATH, post(coffee_command))
        .with_state(CommandState { handler })
}

async fn coffee_command(
    State(state): State<CommandState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest::new(
        header_value(&headers, TIMESTAMP_HEADER, TIMESTAMP_HEADER_ALIAS),
        header_value(&headers, SIGNATURE_HEADER, SIGNATURE_HEADER_ALIAS),
        body.to_vec(),
    );

    match state.handler.handle(&request).await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(error) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorDetail { detail: error.detail().to_owned() }),
        )
            .into_response(),
    }
}

/// Missing or non-ASCII headers read as empty, which fails validation.
fn header_value(headers: &HeaderMap, name: &str, alias: &str) -> String {
    headers
        .get(name)
        .or_else(|| headers.get(alias))
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}
