//! Audio reframing between the telephony stream and the backend.
//!
//! Audio is never buffered here: every call maps one frame to one frame, so
//! the order in which the runtime applies the results is the wire order.

use crate::protocol::{backend::ClientEvent, inbound::OutboundFrame};

#[derive(Debug, Default)]
pub struct AudioRelay {
    /// Agent audio has been sent to the caller since the last clear.
    playback_pending: bool,
    frames_in: u64,
    frames_out: u64,
}

impl AudioRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller audio becomes an `input_audio_buffer.append` command.
    pub fn inbound_audio(&mut self, payload: String) -> ClientEvent {
        self.frames_in += 1;
        ClientEvent::InputAudioBufferAppend { audio: payload }
    }

    /// Agent audio becomes a `media` frame for the caller. Empty deltas carry
    /// nothing to play and are skipped.
    pub fn backend_audio(&mut self, stream_sid: &str, delta: String) -> Option<OutboundFrame> {
        if delta.is_empty() {
            return None;
        }
        self.frames_out += 1;
        self.playback_pending = true;
        Some(OutboundFrame::media(stream_sid, delta))
    }

    /// Barge-in: a `clear` frame if agent audio may still be playing.
    pub fn interrupt(&mut self, stream_sid: &str) -> Option<OutboundFrame> {
        if !self.playback_pending {
            return None;
        }
        self.playback_pending = false;
        Some(OutboundFrame::clear(stream_sid))
    }

    pub fn playback_pending(&self) -> bool {
        self.playback_pending
    }

    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_audio_preserves_order() {
        let mut relay = AudioRelay::new();
        let payloads = ["f1", "f2", "f3", "f4"];
        let forwarded: Vec<ClientEvent> = payloads
            .iter()
            .map(|p| relay.inbound_audio(p.to_string()))
            .collect();

        let expected: Vec<ClientEvent> = payloads
            .iter()
            .map(|p| ClientEvent::InputAudioBufferAppend {
                audio: p.to_string(),
            })
            .collect();
        assert_eq!(forwarded, expected);
        assert_eq!(relay.frames_in(), 4);
    }

    #[test]
    fn test_backend_audio_targets_stream() {
        let mut relay = AudioRelay::new();
        assert!(!relay.playback_pending());
        let frame = relay.backend_audio("s1", "ZZZZ".into()).unwrap();
        assert_eq!(frame, OutboundFrame::media("s1", "ZZZZ".into()));
        assert!(relay.playback_pending());
        assert_eq!(relay.frames_out(), 1);
    }

    #[test]
    fn test_empty_delta_is_skipped() {
        let mut relay = AudioRelay::new();
        assert!(relay.backend_audio("s1", String::new()).is_none());
        assert!(!relay.playback_pending());
        assert_eq!(relay.frames_out(), 0);
    }

    #[test]
    fn test_interrupt_clears_only_pending_playback() {
        let mut relay = AudioRelay::new();
        assert_eq!(relay.interrupt("s1"), None);

        relay.backend_audio("s1", "AAAA".into());
        assert_eq!(relay.interrupt("s1"), Some(OutboundFrame::clear("s1")));
        // nothing new has been played since the clear
        assert_eq!(relay.interrupt("s1"), None);
    }
}
