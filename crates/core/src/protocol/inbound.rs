//! Twilio Media Streams messages.

use crate::error::{RelayError, Side};
use serde::{Deserialize, Serialize};

/// Frames received from the telephony media stream.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Sent once when the socket opens, before `start`.
    Connected,
    /// Announces the call; carries the stream identifier.
    Start { start: StreamStart },
    /// One chunk of caller audio.
    Media { media: MediaPayload },
    /// Playback marker echo.
    Mark,
    /// The caller side of the stream has ended.
    Stop,
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|source| RelayError::ProtocolParse {
            side: Side::Inbound,
            source,
        })
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StreamStart {
    #[serde(rename = "streamSid", alias = "streamId")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

/// Base64 encoded audio. G.711 u-law at 8 kHz on this channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaPayload {
    pub payload: String,
}

/// Frames sent back to the telephony media stream.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Agent speech to play to the caller.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Discard any audio buffered for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl OutboundFrame {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        OutboundFrame::Media {
            stream_sid: stream_sid.to_string(),
            media: MediaPayload { payload },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        OutboundFrame::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start_frame() {
        let text = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ123",
                "callSid": "CA456",
                "tracks": ["inbound"],
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            },
            "streamSid": "MZ123"
        }"#;
        let frame = InboundFrame::parse(text).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Start {
                start: StreamStart {
                    stream_sid: "MZ123".into(),
                    call_sid: Some("CA456".into()),
                }
            }
        );
    }

    #[test]
    fn test_parse_start_accepts_stream_id_alias() {
        let frame = InboundFrame::parse(r#"{"event":"start","start":{"streamId":"s1"}}"#).unwrap();
        match frame {
            InboundFrame::Start { start } => {
                assert_eq!(start.stream_sid, "s1");
                assert_eq!(start.call_sid, None);
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_ignores_extra_fields() {
        let text = r#"{"event":"media","media":{"track":"inbound","chunk":"2","timestamp":"5","payload":"AAAA"}}"#;
        let frame = InboundFrame::parse(text).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Media {
                media: MediaPayload {
                    payload: "AAAA".into()
                }
            }
        );
    }

    #[test]
    fn test_parse_informational_frames() {
        assert_eq!(
            InboundFrame::parse(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#)
                .unwrap(),
            InboundFrame::Connected
        );
        assert_eq!(
            InboundFrame::parse(r#"{"event":"mark","mark":{"name":"m1"}}"#).unwrap(),
            InboundFrame::Mark
        );
        assert_eq!(
            InboundFrame::parse(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#).unwrap(),
            InboundFrame::Stop
        );
        assert_eq!(
            InboundFrame::parse(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap(),
            InboundFrame::Unknown
        );
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(InboundFrame::parse("not json").is_err());
        // media without a payload is a shape error, not an unknown event
        let err = InboundFrame::parse(r#"{"event":"media","media":{}}"#).unwrap_err();
        assert!(matches!(
            err,
            RelayError::ProtocolParse {
                side: Side::Inbound,
                ..
            }
        ));
    }

    #[test]
    fn test_outbound_frames_serialize_with_stream_sid() {
        let media = serde_json::to_value(OutboundFrame::media("s1", "BBBB".into())).unwrap();
        assert_eq!(
            media,
            json!({"event": "media", "streamSid": "s1", "media": {"payload": "BBBB"}})
        );

        let clear = serde_json::to_value(OutboundFrame::clear("s1")).unwrap();
        assert_eq!(clear, json!({"event": "clear", "streamSid": "s1"}));
    }
}
