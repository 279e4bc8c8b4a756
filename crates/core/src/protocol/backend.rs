//! OpenAI Realtime API events.
//!
//! Only the events the relay acts on are modelled. Every optional field has an
//! explicit default so that a partially shaped event still parses; unknown
//! event and item types collapse into an `Other` variant.

use crate::error::{RelayError, Side};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

// --- Client events (relay -> backend) ---

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    pub fn function_call_output(call_id: &str, output: &Value) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.to_string(),
                output: output.to_string(),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Body of the one-time `session.update` sent after the backend is ready.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub mode: TurnDetectionMode,
    pub create_response: bool,
    pub interrupt_response: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetectionMode {
    ServerVad,
    #[default]
    SemanticVad,
}

impl std::str::FromStr for TurnDetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server_vad" => Ok(TurnDetectionMode::ServerVad),
            "semantic_vad" => Ok(TurnDetectionMode::SemanticVad),
            other => Err(format!(
                "'{}' is not a turn detection mode (expected server_vad or semantic_vad)",
                other
            )),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolDefinition {
    Function {
        name: String,
        description: String,
        parameters: Value,
    },
}

// --- Server events (backend -> relay) ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Value,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: Value,
    },
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    ResponseAudioDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped,
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted,
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseResource,
    },
    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },
    #[serde(other)]
    Other,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|source| RelayError::ProtocolParse {
            side: Side::Backend,
            source,
        })
    }

    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionCreated { .. } => "session.created",
            ServerEvent::SessionUpdated { .. } => "session.updated",
            ServerEvent::ResponseAudioDelta { .. } => "response.audio.delta",
            ServerEvent::InputAudioBufferSpeechStarted => "input_audio_buffer.speech_started",
            ServerEvent::InputAudioBufferSpeechStopped => "input_audio_buffer.speech_stopped",
            ServerEvent::InputAudioBufferCommitted => "input_audio_buffer.committed",
            ServerEvent::ResponseDone { .. } => "response.done",
            ServerEvent::RateLimitsUpdated => "rate_limits.updated",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Other => "other",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResponseResource {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "output_items")]
    pub output: Vec<OutputItem>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    FunctionCall {
        #[serde(default, deserialize_with = "string_or_empty")]
        call_id: String,
        #[serde(default, deserialize_with = "string_or_empty")]
        name: String,
        /// Normally a JSON document encoded as a string; kept raw so a bad
        /// payload can be replaced by defaults instead of failing the event.
        #[serde(default)]
        arguments: Value,
    },
    #[serde(other)]
    Other,
}

/// Parses output items one at a time; an item that does not fit becomes
/// `Other` instead of failing the whole `response.done`.
fn output_items<'de, D>(deserializer: D) -> Result<Vec<OutputItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!(output = %other, "Ignoring non-list response output");
            return Ok(Vec::new());
        }
    };
    Ok(items
        .into_iter()
        .map(|item| {
            OutputItem::deserialize(item).unwrap_or_else(|e| {
                warn!(error = %e, "Unrecognised response output item");
                OutputItem::Other
            })
        })
        .collect())
}

/// Null becomes empty; other scalars keep their JSON text.
fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}
