//! Interaction state for one voice chat session.
//!
//! The session is always in exactly one of four states. Transitions are
//! explicit methods on [`SessionState`]; the controller decides *when* to
//! call them and performs the side effects (cancelling capture, aborting
//! requests, halting synthesis) around them.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::messages::{ChatTurn, SessionContext};

/// Phase of the capture -> submission -> playback pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InteractionState {
    /// Nothing in flight, ready for input
    #[default]
    Idle,
    /// Microphone capture in progress
    Recording,
    /// Message submitted, waiting for the gateway reply
    AwaitingReply,
    /// Reply is being spoken
    Speaking,
}

impl InteractionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, InteractionState::Recording)
    }

    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self, InteractionState::AwaitingReply)
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self, InteractionState::Speaking)
    }

    /// Whether a new capture may begin. Capture interrupts playback but
    /// never an active capture or an in-flight request.
    pub fn can_start_capture(&self) -> bool {
        matches!(self, InteractionState::Idle | InteractionState::Speaking)
    }

    /// Whether a typed submission may begin. Same eligibility as capture:
    /// new input wins over playback, but in-flight work is never queued
    /// behind.
    pub fn can_submit(&self) -> bool {
        matches!(self, InteractionState::Idle | InteractionState::Speaking)
    }

    /// Whether stop-response has anything to cancel
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            InteractionState::AwaitingReply | InteractionState::Speaking
        )
    }
}

impl std::fmt::Display for InteractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "Idle"),
            InteractionState::Recording => write!(f, "Recording"),
            InteractionState::AwaitingReply => write!(f, "AwaitingReply"),
            InteractionState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Session data owned by the controller: the state machine position, the
/// conversation so far, and a transient user-visible status line.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub interaction: InteractionState,
    pub context: SessionContext,
    pub turns: Vec<ChatTurn>,
    pub status: Option<String>,
}

impl SessionState {
    pub fn new(context: SessionContext) -> Self {
        Self {
            interaction: InteractionState::Idle,
            context,
            turns: Vec::new(),
            status: None,
        }
    }

    /// Set a transient status message
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    /// Clear the status message
    pub fn clear_status(&mut self) {
        self.status = None;
    }

    // === State transitions ===

    /// Idle -> Recording
    pub fn start_capture(&mut self) {
        self.interaction = InteractionState::Recording;
        self.clear_status();
    }

    /// Recording -> Idle without submission (manual stop, or capture ended
    /// without producing a transcript)
    pub fn capture_stopped(&mut self) {
        self.interaction = InteractionState::Idle;
    }

    /// Recording -> Idle after a capture failure
    pub fn capture_failed(&mut self, notice: impl Into<String>) {
        self.interaction = InteractionState::Idle;
        self.set_status(notice);
    }

    /// Idle/Recording -> AwaitingReply: the message is on its way to the
    /// gateway and a new turn is opened for it.
    pub fn submit(&mut self, input_text: impl Into<String>) {
        self.turns.push(ChatTurn::new(input_text));
        self.interaction = InteractionState::AwaitingReply;
        self.clear_status();
    }

    /// AwaitingReply -> Speaking for a non-empty reply, -> Idle otherwise.
    /// Returns whether synthesis should start.
    pub fn reply_received(&mut self, reply_text: &str) -> bool {
        if let Some(turn) = self.turns.last_mut() {
            turn.complete(reply_text);
        }
        if reply_text.trim().is_empty() {
            self.interaction = InteractionState::Idle;
            false
        } else {
            self.interaction = InteractionState::Speaking;
            true
        }
    }

    /// AwaitingReply -> Idle after a submission failure. The notice stands
    /// in for the reply so the turn still completes.
    pub fn reply_failed(&mut self, notice: impl Into<String>) {
        let notice = notice.into();
        if let Some(turn) = self.turns.last_mut() {
            turn.complete(notice.clone());
        }
        self.interaction = InteractionState::Idle;
        self.set_status(notice);
    }

    /// AwaitingReply -> Idle after the user cancelled the request
    pub fn reply_cancelled(&mut self, notice: impl Into<String>) {
        self.reply_failed(notice);
    }

    /// Speaking -> Idle, both on natural completion and on cancellation
    pub fn speech_finished(&mut self) {
        self.interaction = InteractionState::Idle;
    }

    /// Speaking -> Idle after a synthesis failure
    pub fn speech_failed(&mut self, notice: impl Into<String>) {
        self.interaction = InteractionState::Idle;
        self.set_status(notice);
    }

    /// Text of the most recent completed reply
    pub fn last_reply(&self) -> Option<&str> {
        self.turns.last().and_then(|turn| turn.reply_text.as_deref())
    }
}

/// Thread-safe shared session state queried by the UI and by tests while
/// the controller loop owns the transitions.
#[derive(Clone)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionState>>,
}

impl SharedSessionState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionState> {
        self.inner.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SessionState> {
        self.inner.write()
    }

    /// Clone of the current state (no lock held after return)
    pub fn snapshot(&self) -> SessionState {
        self.inner.read().clone()
    }

    // === Convenience read methods ===

    pub fn interaction(&self) -> InteractionState {
        self.inner.read().interaction
    }

    pub fn is_idle(&self) -> bool {
        self.interaction().is_idle()
    }

    pub fn can_start_capture(&self) -> bool {
        self.interaction().can_start_capture()
    }

    pub fn can_submit(&self) -> bool {
        self.interaction().can_submit()
    }

    pub fn status(&self) -> Option<String> {
        self.inner.read().status.clone()
    }

    pub fn last_reply(&self) -> Option<String> {
        self.inner.read().last_reply().map(str::to_string)
    }

    pub fn turn_count(&self) -> usize {
        self.inner.read().turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(SessionContext::default())
    }

    #[test]
    fn test_capture_cycle() {
        let mut s = state();
        assert!(s.interaction.is_idle());

        s.start_capture();
        assert!(s.interaction.is_recording());

        s.submit("hello");
        assert!(s.interaction.is_awaiting_reply());
        assert_eq!(s.turns.len(), 1);

        assert!(s.reply_received("hi!"));
        assert!(s.interaction.is_speaking());

        s.speech_finished();
        assert!(s.interaction.is_idle());
        assert_eq!(s.last_reply(), Some("hi!"));
    }

    #[test]
    fn test_empty_reply_skips_speaking() {
        let mut s = state();
        s.submit("hello");
        assert!(!s.reply_received("   "));
        assert!(s.interaction.is_idle());
    }

    #[test]
    fn test_manual_stop_discards_capture() {
        let mut s = state();
        s.start_capture();
        s.capture_stopped();
        assert!(s.interaction.is_idle());
        assert!(s.turns.is_empty());
    }

    #[test]
    fn test_capture_failure_sets_status() {
        let mut s = state();
        s.start_capture();
        s.capture_failed("mic broke");
        assert!(s.interaction.is_idle());
        assert_eq!(s.status.as_deref(), Some("mic broke"));
    }

    #[test]
    fn test_reply_failure_completes_the_turn() {
        let mut s = state();
        s.submit("hello");
        s.reply_failed("fallback notice");
        assert!(s.interaction.is_idle());
        assert_eq!(s.last_reply(), Some("fallback notice"));
        assert_eq!(s.status.as_deref(), Some("fallback notice"));
    }

    #[test]
    fn test_cancellation_records_a_notice() {
        let mut s = state();
        s.submit("hello");
        s.reply_cancelled("Response cancelled.");
        assert!(s.interaction.is_idle());
        assert_eq!(s.last_reply(), Some("Response cancelled."));
    }

    #[test]
    fn test_eligibility_queries() {
        assert!(InteractionState::Idle.can_start_capture());
        assert!(InteractionState::Speaking.can_start_capture());
        assert!(!InteractionState::Recording.can_start_capture());
        assert!(!InteractionState::AwaitingReply.can_start_capture());

        assert!(InteractionState::Idle.can_submit());
        assert!(InteractionState::Speaking.can_submit());
        assert!(!InteractionState::AwaitingReply.can_submit());

        assert!(InteractionState::AwaitingReply.can_cancel());
        assert!(InteractionState::Speaking.can_cancel());
        assert!(!InteractionState::Idle.can_cancel());
    }

    #[test]
    fn test_submit_clears_stale_status() {
        let mut s = state();
        s.set_status("old error");
        s.submit("hello");
        assert!(s.status.is_none());
    }

    #[test]
    fn test_shared_state() {
        let shared = SharedSessionState::new(state());
        assert!(shared.is_idle());

        shared.write().start_capture();
        assert!(shared.interaction().is_recording());

        let snapshot = shared.snapshot();
        shared.write().capture_stopped();

        // The snapshot is independent of later writes
        assert!(snapshot.interaction.is_recording());
        assert!(shared.is_idle());
    }
}
