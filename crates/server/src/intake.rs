use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier_agent::AgentError;
use courier_core::inbound::EventBatch;
use serde_json::json;
use tracing::warn;

use crate::health::ServiceState;

/// `POST /agents/{agent}/invoke` with a JSON array of event envelopes.
///
/// The status code comes from the runtime: 200 when every event was published,
/// 400 when all failures were caused by the input, 500 otherwise. An agent that
/// is not registered answers 404 before any event is looked at.
pub async fn invoke(
    State(state): State<ServiceState>,
    Path(agent): Path<String>,
    batch: Result<Json<EventBatch>, JsonRejection>,
) -> Response {
    let Json(batch) = match batch {
        Ok(batch) => batch,
        Err(rejection) => {
            warn!(
                event_name = "system.intake.rejected",
                agent = %agent,
                error = %rejection.body_text(),
                "event batch could not be parsed"
            );
            return error_response(StatusCode::BAD_REQUEST, &agent, rejection.body_text());
        }
    };

    match state.runtime.invoke(&agent, &batch).await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(response.body)).into_response()
        }
        Err(error @ AgentError::UnknownAgent(_)) => {
            error_response(StatusCode::NOT_FOUND, &agent, error.to_string())
        }
        Err(error) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &agent, error.to_string()),
    }
}

fn error_response(status: StatusCode, agent: &str, message: String) -> Response {
    (status, Json(json!({ "agent": agent, "error": message }))).into_response()
}
