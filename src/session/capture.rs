//! Speech-capture capability interface.
//!
//! The capture engine (a browser speech API, an OS recognizer, or a test
//! double) is consumed as a black box: one capture per invocation, ending
//! in a final transcript, an error, or nothing.

use crossbeam_channel::Receiver;

use crate::Result;

/// Events produced by a capture session.
#[derive(Clone, Debug)]
pub enum CaptureEvent {
    /// Final transcript for the current capture
    Transcript(String),
    /// Capture failed (device, permission, or recognition error)
    Error(String),
    /// Capture ended without producing a transcript
    Ended,
}

/// One-shot speech capture engine.
///
/// Implementations own whatever device or API does the recognizing and
/// report results on the event channel. Consumers must ignore events that
/// arrive after a cancellation; implementations are not required to
/// suppress them.
pub trait CaptureSession: Send {
    /// Begin a capture for the given language tag. At most one capture is
    /// active at a time; the controller enforces this.
    fn start(&mut self, language: &str) -> Result<()>;

    /// Stop the active capture and discard any transcript it would have
    /// produced. Safe to call when no capture is active.
    fn cancel(&mut self);

    /// Event channel for transcript and error notifications
    fn events(&self) -> Receiver<CaptureEvent>;
}
