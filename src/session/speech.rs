//! Speech-synthesis capability interface.

use crossbeam_channel::Receiver;

use crate::Result;

/// A synthesis request.
#[derive(Clone, Debug)]
pub struct Utterance {
    pub text: String,
    /// BCP-47 language tag for voice selection
    pub language: String,
    /// Specific voice name, when the device supports choosing one
    pub voice: Option<String>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            voice: None,
        }
    }

    /// Request a specific voice
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Events produced by the synthesis device.
#[derive(Clone, Debug)]
pub enum SpeechEvent {
    /// The utterance finished playing
    Finished,
    /// Synthesis or playback failed
    Error(String),
}

/// Speech synthesis device consumed as a black box.
pub trait SpeechOutput: Send {
    /// Start speaking. At most one utterance is active at a time; the
    /// controller enforces this.
    fn speak(&mut self, utterance: Utterance) -> Result<()>;

    /// Halt playback immediately. Unconditional and idempotent; the
    /// controller suppresses the completion event of a cancelled
    /// utterance by ignoring late events.
    fn cancel(&mut self);

    /// Event channel for completion and error notifications
    fn events(&self) -> Receiver<SpeechEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_builder() {
        let utterance = Utterance::new("hello", "en-US").with_voice("daniel");
        assert_eq!(utterance.text, "hello");
        assert_eq!(utterance.language, "en-US");
        assert_eq!(utterance.voice.as_deref(), Some("daniel"));
    }
}
