use crate::{
    protocol::backend::{SessionConfig, TurnDetection, TurnDetectionMode},
    tools,
};
use std::time::Duration;

pub const DEFAULT_INSTRUCTIONS: &str = include_str!("../prompts/system_message.md");
pub const DEFAULT_VOICE: &str = "sage";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(5);

/// Twilio Media Streams carry 8 kHz G.711 u-law in both directions.
pub const TELEPHONY_AUDIO_FORMAT: &str = "g711_ulaw";

/// Per-call behaviour shared by every session of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub voice: String,
    pub instructions: String,
    pub turn_detection: TurnDetectionMode,
    pub temperature: f32,
    /// Wait between the backend socket opening and `session.update`.
    pub settle_delay: Duration,
    /// Wait between acknowledging `end_call` and closing both sockets.
    pub grace_delay: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            turn_detection: TurnDetectionMode::default(),
            temperature: DEFAULT_TEMPERATURE,
            settle_delay: DEFAULT_SETTLE_DELAY,
            grace_delay: DEFAULT_GRACE_DELAY,
        }
    }
}

impl RelaySettings {
    /// The body of the `session.update` event.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            turn_detection: TurnDetection {
                mode: self.turn_detection,
                create_response: true,
                interrupt_response: true,
            },
            input_audio_format: TELEPHONY_AUDIO_FORMAT.to_string(),
            output_audio_format: TELEPHONY_AUDIO_FORMAT.to_string(),
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            temperature: self.temperature,
            tools: tools::declared_tools(),
            tool_choice: "auto".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings() {
        let settings = RelaySettings::default();
        assert_eq!(settings.voice, "sage");
        assert_eq!(settings.grace_delay, Duration::from_millis(5000));
        assert_eq!(settings.settle_delay, Duration::from_millis(250));
        assert!(settings.instructions.contains("end_call"));
    }

    #[test]
    fn test_session_config_wire_shape() {
        let settings = RelaySettings {
            turn_detection: TurnDetectionMode::ServerVad,
            instructions: "Be brief.".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(settings.session_config()).unwrap();

        assert_eq!(
            value["turn_detection"],
            json!({"type": "server_vad", "create_response": true, "interrupt_response": true})
        );
        assert_eq!(value["input_audio_format"], "g711_ulaw");
        assert_eq!(value["output_audio_format"], "g711_ulaw");
        assert_eq!(value["voice"], "sage");
        assert_eq!(value["instructions"], "Be brief.");
        assert_eq!(value["modalities"], json!(["text", "audio"]));
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"].as_array().map(Vec::len), Some(2));
    }
}
