//! Tool declarations and the dispatcher that answers function calls.
//!
//! The backend embeds function-call items in `response.done`. Each item is
//! admitted as a pending [`ToolCall`], executed locally and resolved with
//! exactly one `function_call_output` carrying the same call id.

use crate::{
    error::RelayError,
    protocol::backend::{ClientEvent, OutputItem, ToolDefinition},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

pub const CAPTURE_USER_TEXT: &str = "capture_user_text";
pub const END_CALL: &str = "end_call";

/// Why the model asked to hang up.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndCallReason {
    #[default]
    UserGoodbye,
    ExplicitRequest,
    SilenceTimeout,
    NoIntent,
    CompletedTask,
}

impl EndCallReason {
    pub const ALL: [EndCallReason; 5] = [
        EndCallReason::UserGoodbye,
        EndCallReason::ExplicitRequest,
        EndCallReason::SilenceTimeout,
        EndCallReason::NoIntent,
        EndCallReason::CompletedTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndCallReason::UserGoodbye => "user_goodbye",
            EndCallReason::ExplicitRequest => "explicit_request",
            EndCallReason::SilenceTimeout => "silence_timeout",
            EndCallReason::NoIntent => "no_intent",
            EndCallReason::CompletedTask => "completed_task",
        }
    }
}

impl fmt::Display for EndCallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndCallReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndCallReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("unknown end_call reason '{}'", s))
    }
}

/// The locally implemented tools, resolved from the name the model used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    CaptureUserText,
    EndCall,
    Unknown(String),
}

impl Tool {
    pub fn from_name(name: &str) -> Self {
        match name {
            CAPTURE_USER_TEXT => Tool::CaptureUserText,
            END_CALL => Tool::EndCall,
            other => Tool::Unknown(other.to_string()),
        }
    }
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CaptureUserTextArgs {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct EndCallArgs {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Tool schemas declared to the backend in `session.update`.
pub fn declared_tools() -> Vec<ToolDefinition> {
    let reasons: Vec<&str> = EndCallReason::ALL.iter().map(|r| r.as_str()).collect();
    vec![
        ToolDefinition::Function {
            name: CAPTURE_USER_TEXT.to_string(),
            description: "Report the exact transcript of the latest user utterance to the server."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Exact transcript of the user's utterance in the user's language."
                    }
                },
                "required": ["text"],
                "additionalProperties": false
            }),
        },
        ToolDefinition::Function {
            name: END_CALL.to_string(),
            description: "End the phone call when the user indicates the conversation is finished or requests to end.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "enum": reasons,
                        "description": "Why the call is ending."
                    }
                },
                "required": ["reason"],
                "additionalProperties": false
            }),
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Pending,
    Resolved,
}

/// One function invocation requested by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub status: ToolStatus,
}

/// Everything a `response.done` batch produced.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    /// One `function_call_output` per admitted call, in item order.
    pub results: Vec<ClientEvent>,
    pub transcripts: Vec<String>,
    pub end_call: Option<EndCallReason>,
}

impl Dispatch {
    /// Generation resumes after a batch unless it asked to hang up.
    pub fn should_continue(&self) -> bool {
        !self.results.is_empty() && self.end_call.is_none()
    }
}

/// Per-session tool call bookkeeping.
///
/// Resolution is idempotent: a call id that was already resolved in this
/// session is ignored if the backend sends it again.
#[derive(Debug, Default)]
pub struct ToolDispatcher {
    pending: HashMap<String, ToolCall>,
    resolved: HashSet<String>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, items: &[OutputItem]) -> Dispatch {
        let mut batch = Dispatch::default();

        for item in items {
            let OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } = item
            else {
                continue;
            };

            if call_id.is_empty() {
                warn!(tool = %name, "Function call without a call_id; it cannot be answered");
                continue;
            }
            if !self.admit(call_id, name, arguments) {
                warn!(%call_id, tool = %name, "Duplicate function call ignored");
                continue;
            }

            let output = match Tool::from_name(name) {
                Tool::CaptureUserText => {
                    let args: CaptureUserTextArgs = parse_arguments(name, arguments)
                        .unwrap_or_else(|e| {
                            warn!(%call_id, error = %e, "Using default arguments");
                            CaptureUserTextArgs::default()
                        });
                    let utterance = args.text.trim();
                    if utterance.is_empty() {
                        info!("User said: (empty)");
                    } else {
                        info!(text = %utterance, "User said");
                        batch.transcripts.push(utterance.to_string());
                    }
                    json!({ "ok": true })
                }
                Tool::EndCall => {
                    let args: EndCallArgs =
                        parse_arguments(name, arguments).unwrap_or_else(|e| {
                            warn!(%call_id, error = %e, "Using default arguments");
                            EndCallArgs::default()
                        });
                    let reason = resolve_reason(args.reason.as_deref());
                    info!(%reason, "Model requested to end the call");
                    batch.end_call.get_or_insert(reason);
                    json!({ "success": true })
                }
                Tool::Unknown(other) => {
                    warn!(%call_id, tool = %other, "Model called an undeclared tool");
                    json!({ "ok": false, "error": format!("unknown tool: {}", other) })
                }
            };

            if let Some(result) = self.resolve(call_id, &output) {
                batch.results.push(result);
            }
        }

        batch
    }

    /// Drops every unresolved call; no results will be sent for them.
    ///
    /// `dispatch` resolves each call it admits before returning, so between
    /// events nothing is pending and this returns 0.
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.pending.len();
        self.pending.clear();
        abandoned
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    fn admit(&mut self, call_id: &str, name: &str, arguments: &Value) -> bool {
        if self.resolved.contains(call_id) || self.pending.contains_key(call_id) {
            return false;
        }
        self.pending.insert(
            call_id.to_string(),
            ToolCall {
                call_id: call_id.to_string(),
                name: name.to_string(),
                arguments: arguments.clone(),
                status: ToolStatus::Pending,
            },
        );
        true
    }

    fn resolve(&mut self, call_id: &str, output: &Value) -> Option<ClientEvent> {
        let mut call = self.pending.remove(call_id)?;
        call.status = ToolStatus::Resolved;
        self.resolved.insert(call.call_id.clone());
        Some(ClientEvent::function_call_output(&call.call_id, output))
    }
}

/// Missing or unrecognised reasons fall back to `user_goodbye`.
fn resolve_reason(raw: Option<&str>) -> EndCallReason {
    match raw.map(str::parse::<EndCallReason>) {
        Some(Ok(reason)) => reason,
        Some(Err(e)) => {
            warn!(error = %e, "Falling back to the default end_call reason");
            EndCallReason::default()
        }
        None => EndCallReason::default(),
    }
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(tool: &str, raw: &Value) -> Result<T, RelayError> {
    let invalid = |reason: String| RelayError::ToolArgument {
        tool: tool.to_string(),
        reason,
    };
    let value = match raw {
        Value::String(text) => {
            serde_json::from_str::<Value>(text).map_err(|e| invalid(e.to_string()))?
        }
        Value::Object(_) => raw.clone(),
        Value::Null => return Err(invalid("no argument payload".to_string())),
        other => return Err(invalid(format!("unexpected argument payload: {}", other))),
    };
    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
}
