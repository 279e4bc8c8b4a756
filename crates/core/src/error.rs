use std::fmt;

/// Which of the two sockets of a session an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Inbound,
    Backend,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Inbound => write!(f, "inbound"),
            Side::Backend => write!(f, "backend"),
        }
    }
}

/// Errors raised while relaying a call.
///
/// Only `Connection` is fatal to a session. The other variants are contained
/// at the point where they occur: the offending frame or argument payload is
/// logged and replaced by a fallback.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{side} connection failed: {reason}")]
    Connection { side: Side, reason: String },
    #[error("malformed {side} frame: {source}")]
    ProtocolParse {
        side: Side,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid arguments for tool `{tool}`: {reason}")]
    ToolArgument { tool: String, reason: String },
    #[error("session `{0}` is already registered")]
    DuplicateSession(String),
}

impl RelayError {
    pub fn connection(side: Side, reason: impl fmt::Display) -> Self {
        Self::Connection {
            side,
            reason: reason.to_string(),
        }
    }

    /// True for errors that must tear the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Connection { .. })
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            RelayError::Connection { side, .. } | RelayError::ProtocolParse { side, .. } => {
                Some(*side)
            }
            RelayError::ToolArgument { .. } | RelayError::DuplicateSession(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::connection(Side::Backend, "reset by peer");
        assert_eq!(err.to_string(), "backend connection failed: reset by peer");
        assert!(err.is_fatal());
        assert_eq!(err.side(), Some(Side::Backend));

        let err = RelayError::ToolArgument {
            tool: "end_call".into(),
            reason: "missing `reason`".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid arguments for tool `end_call`: missing `reason`"
        );
        assert!(!err.is_fatal());
        assert_eq!(err.side(), None);
    }

    #[test]
    fn test_parse_error_is_not_fatal() {
        let source = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = RelayError::ProtocolParse {
            side: Side::Inbound,
            source,
        };
        assert!(err.to_string().starts_with("malformed inbound frame"));
        assert!(!err.is_fatal());
    }
}
