//! Axum Handlers for the plain HTTP routes.

use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(MessageResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

pub async fn health() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Twilio Media Stream Server is running!".to_string(),
    })
}

/// Answers an incoming call with TwiML that connects it to our media stream.
pub async fn incoming_call(headers: HeaderMap) -> Result<Response, ApiError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing Host header".to_string()))?;
    info!(%host, "Incoming call");

    Ok((
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_connect(host),
    )
        .into_response())
}

fn twiml_connect(host: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Connect>
        <Stream url="wss://{host}/media-stream" />
    </Connect>
</Response>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_points_stream_at_host() {
        let twiml = twiml_connect("relay.example.com");
        assert!(twiml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(twiml.contains(r#"<Stream url="wss://relay.example.com/media-stream" />"#));
        assert!(twiml.contains("<Connect>"));
    }
}
