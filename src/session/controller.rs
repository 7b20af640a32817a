//! Voice interaction controller.
//!
//! Orchestrates one session's capture -> submission -> playback pipeline
//! over three injected capabilities ([`CaptureSession`], [`ReplyTransport`],
//! [`SpeechOutput`]). All transitions run through the dispatch methods on
//! [`VoiceController`], driven by a single `select!` loop, so there are no
//! callbacks closing over shared mutable state.
//!
//! Guarantees, enforced here rather than by the backends:
//! - single-flight: at most one capture, one in-flight request, and one
//!   utterance exist at any time; ineligible commands are rejected, never
//!   queued;
//! - interrupt policy: new input (spoken or typed) cancels active playback
//!   before it begins;
//! - stale events are discarded: outcomes for a cancelled request id and
//!   capture/speech events outside their phase are ignored, so a late
//!   reply can never resurrect a Speaking transition.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::messages::SessionContext;
use crate::session::capture::{CaptureEvent, CaptureSession};
use crate::session::speech::{SpeechEvent, SpeechOutput, Utterance};
use crate::session::state::{SessionState, SharedSessionState};
use crate::session::transport::{ReplyOutcome, ReplyRequest, ReplyTransport};
use crate::{BanterError, Result};

/// Notice recorded when the user aborts an in-flight request.
pub const CANCELLED_NOTICE: &str = "Response cancelled.";

/// Notice shown when the capture engine reports an error.
pub const CAPTURE_ERROR_NOTICE: &str = "Error with speech recognition. Please try again.";

/// Commands accepted by the controller.
#[derive(Clone, Debug)]
pub enum ControllerCommand {
    /// Begin a voice capture
    StartCapture,
    /// Stop the active capture without submitting anything
    StopCapture,
    /// Submit typed text, skipping capture
    SubmitText(String),
    /// Stop-response: abort the in-flight request or halt playback
    CancelReply,
    /// Replace the persona instruction
    SetPersona(Option<String>),
    /// Replace the capture/synthesis language
    SetLanguage(String),
    /// Shut the controller down
    Shutdown,
}

/// Events emitted for UI updates. State is queried from
/// [`SharedSessionState`] rather than reconstructed from events.
#[derive(Clone, Debug)]
pub enum ControllerEvent {
    /// State has changed (trigger a repaint)
    StateChanged,
    /// A reply arrived and is about to be spoken/displayed
    ReplyReady { text: String, provider: String },
    /// Transient status message
    Status(String),
    /// Controller has shut down
    Shutdown,
}

/// Handle for controlling the session from a UI or a test.
pub struct ControllerHandle {
    command_tx: Sender<ControllerCommand>,
    event_rx: Receiver<ControllerEvent>,
    state: SharedSessionState,
}

impl ControllerHandle {
    pub fn send_command(&self, cmd: ControllerCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| BanterError::ChannelError(format!("failed to send command: {e}")))
    }

    pub fn start_capture(&self) -> Result<()> {
        self.send_command(ControllerCommand::StartCapture)
    }

    pub fn stop_capture(&self) -> Result<()> {
        self.send_command(ControllerCommand::StopCapture)
    }

    pub fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(ControllerCommand::SubmitText(text.into()))
    }

    pub fn cancel_reply(&self) -> Result<()> {
        self.send_command(ControllerCommand::CancelReply)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(ControllerCommand::Shutdown)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ControllerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> Result<ControllerEvent> {
        self.event_rx
            .recv()
            .map_err(|e| BanterError::ChannelError(format!("failed to receive event: {e}")))
    }

    /// Shared session state for direct queries
    pub fn state(&self) -> &SharedSessionState {
        &self.state
    }
}

/// Controller owning the state machine and the three capability backends.
pub struct VoiceController {
    state: SharedSessionState,
    capture: Box<dyn CaptureSession>,
    speech: Box<dyn SpeechOutput>,
    transport: Box<dyn ReplyTransport>,
    /// Id of the in-flight submission; `None` means any arriving outcome
    /// is stale
    pending: Option<Uuid>,
    command_rx: Receiver<ControllerCommand>,
    event_tx: Sender<ControllerEvent>,
}

impl VoiceController {
    pub fn new(
        context: SessionContext,
        capture: Box<dyn CaptureSession>,
        speech: Box<dyn SpeechOutput>,
        transport: Box<dyn ReplyTransport>,
    ) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = bounded(64);
        let (event_tx, event_rx) = bounded(64);
        let state = SharedSessionState::new(SessionState::new(context));

        let handle = ControllerHandle {
            command_tx,
            event_rx,
            state: state.clone(),
        };

        let controller = Self {
            state,
            capture,
            speech,
            transport,
            pending: None,
            command_rx,
            event_tx,
        };

        (controller, handle)
    }

    /// Run the controller loop on its own thread
    pub fn start(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(mut self) {
        let command_rx = self.command_rx.clone();
        let capture_rx = self.capture.events();
        let reply_rx = self.transport.events();
        let speech_rx = self.speech.events();

        info!("voice controller loop starting");

        loop {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(ControllerCommand::Shutdown) => break,
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => {
                        warn!("command channel disconnected");
                        break;
                    }
                },
                recv(capture_rx) -> event => match event {
                    Ok(event) => self.handle_capture_event(event),
                    Err(_) => {
                        warn!("capture event channel disconnected");
                        break;
                    }
                },
                recv(reply_rx) -> outcome => match outcome {
                    Ok(outcome) => self.handle_reply_outcome(outcome),
                    Err(_) => {
                        warn!("transport event channel disconnected");
                        break;
                    }
                },
                recv(speech_rx) -> event => match event {
                    Ok(event) => self.handle_speech_event(event),
                    Err(_) => {
                        warn!("speech event channel disconnected");
                        break;
                    }
                },
            }
        }

        let _ = self.event_tx.send(ControllerEvent::Shutdown);
        info!("voice controller loop stopped");
    }

    // === Command dispatch ===

    fn handle_command(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::StartCapture => self.start_capture(),
            ControllerCommand::StopCapture => self.stop_capture(),
            ControllerCommand::SubmitText(text) => self.submit_text(text),
            ControllerCommand::CancelReply => self.cancel_reply(),
            ControllerCommand::SetPersona(prompt) => {
                self.state.write().context.system_prompt = prompt;
            }
            ControllerCommand::SetLanguage(language) => {
                self.state.write().context.language_code = language;
            }
            ControllerCommand::Shutdown => {}
        }
    }

    fn start_capture(&mut self) {
        let current = self.state.read().interaction;
        if !current.can_start_capture() {
            warn!(state = %current, "capture rejected: session is busy");
            return;
        }

        if current.is_speaking() {
            // New capture wins over stale playback: the utterance is halted
            // before the microphone opens.
            self.speech.cancel();
            self.state.write().speech_finished();
        }

        let language = self.state.read().context.language_code.clone();
        match self.capture.start(&language) {
            Ok(()) => {
                self.state.write().start_capture();
                self.emit_state_changed();
                debug!("capture started");
            }
            Err(e) => {
                warn!(error = %e, "capture failed to start");
                self.set_status(e.user_message());
            }
        }
    }

    fn stop_capture(&mut self) {
        if !self.state.read().interaction.is_recording() {
            return;
        }
        self.capture.cancel();
        self.state.write().capture_stopped();
        self.emit_state_changed();
        debug!("capture stopped manually, nothing submitted");
    }

    fn submit_text(&mut self, text: String) {
        // Typed blanks are a silent no-op, matching the send-button guard
        if text.trim().is_empty() {
            return;
        }

        let current = self.state.read().interaction;
        if !current.can_submit() {
            warn!(state = %current, "submission rejected: session is busy");
            return;
        }

        if current.is_speaking() {
            self.speech.cancel();
            self.state.write().speech_finished();
        }

        self.submit_message(text);
    }

    /// Hand a message to the transport and open a turn for it. Shared by
    /// the transcript path (from Recording) and the typed path (from Idle).
    fn submit_message(&mut self, text: String) {
        let context = self.state.read().context.clone();
        let request = ReplyRequest::new(text.clone(), context);
        let id = request.id;

        match self.transport.submit(request) {
            Ok(()) => {
                self.pending = Some(id);
                self.state.write().submit(text);
                self.emit_state_changed();
                debug!(%id, "submission in flight");
            }
            Err(e) => {
                warn!(error = %e, "submission failed to start");
                let mut state = self.state.write();
                state.capture_stopped();
                state.set_status(e.user_message());
                drop(state);
                self.emit_state_changed();
            }
        }
    }

    fn cancel_reply(&mut self) {
        let current = self.state.read().interaction;
        match current {
            s if s.is_awaiting_reply() => {
                // Abort is unconditional and idempotent; clearing `pending`
                // makes any late outcome stale.
                self.transport.cancel();
                self.pending = None;
                self.state.write().reply_cancelled(CANCELLED_NOTICE);
                self.emit_status(CANCELLED_NOTICE);
                self.emit_state_changed();
                debug!("in-flight request cancelled");
            }
            s if s.is_speaking() => {
                self.speech.cancel();
                self.state.write().speech_finished();
                self.emit_state_changed();
                debug!("playback cancelled");
            }
            _ => {}
        }
    }

    // === Backend event dispatch ===

    fn handle_capture_event(&mut self, event: CaptureEvent) {
        if !self.state.read().interaction.is_recording() {
            debug!("capture event ignored outside of recording");
            return;
        }

        match event {
            CaptureEvent::Transcript(text) => {
                debug!(chars = text.len(), "transcript ready");
                if text.trim().is_empty() {
                    self.state.write().capture_stopped();
                    self.emit_state_changed();
                } else {
                    self.submit_message(text);
                }
            }
            CaptureEvent::Error(message) => {
                warn!(%message, "capture failed");
                self.state.write().capture_failed(CAPTURE_ERROR_NOTICE);
                self.emit_status(CAPTURE_ERROR_NOTICE);
                self.emit_state_changed();
            }
            CaptureEvent::Ended => {
                self.state.write().capture_stopped();
                self.emit_state_changed();
            }
        }
    }

    fn handle_reply_outcome(&mut self, outcome: ReplyOutcome) {
        let id = outcome.id();
        if self.pending != Some(id) {
            debug!(%id, "stale reply outcome discarded");
            return;
        }
        self.pending = None;

        match outcome {
            ReplyOutcome::Reply { text, provider, .. } => {
                info!(%provider, "reply received");
                let speak = self.state.write().reply_received(&text);
                let _ = self.event_tx.send(ControllerEvent::ReplyReady {
                    text: text.clone(),
                    provider,
                });

                if speak {
                    let language = self.state.read().context.language_code.clone();
                    if let Err(e) = self.speech.speak(Utterance::new(text, language)) {
                        warn!(error = %e, "synthesis failed to start");
                        self.state.write().speech_failed(e.user_message());
                        self.emit_status(e.user_message());
                    }
                }
                self.emit_state_changed();
            }
            ReplyOutcome::Failed { notice, .. } => {
                warn!("submission failed");
                self.state.write().reply_failed(notice.clone());
                self.emit_status(notice);
                self.emit_state_changed();
            }
            ReplyOutcome::Cancelled { .. } => {
                // Normally stale by the time it arrives, since the cancel
                // command already cleared `pending`.
                self.state.write().reply_cancelled(CANCELLED_NOTICE);
                self.emit_state_changed();
            }
        }
    }

    fn handle_speech_event(&mut self, event: SpeechEvent) {
        if !self.state.read().interaction.is_speaking() {
            debug!("speech event ignored outside of playback");
            return;
        }

        match event {
            SpeechEvent::Finished => {
                self.state.write().speech_finished();
                self.emit_state_changed();
                debug!("playback finished");
            }
            SpeechEvent::Error(message) => {
                warn!(%message, "playback failed");
                let notice = BanterError::SpeechError(message).user_message();
                self.state.write().speech_failed(notice.clone());
                self.emit_status(notice);
                self.emit_state_changed();
            }
        }
    }

    // === Event emission ===

    fn emit_state_changed(&self) {
        let _ = self.event_tx.send(ControllerEvent::StateChanged);
    }

    fn emit_status(&self, status: impl Into<String>) {
        let _ = self
            .event_tx
            .send(ControllerEvent::Status(status.into()));
    }

    fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.state.write().set_status(status.clone());
        self.emit_status(status);
    }
}
