//! Client-side voice session: state machine, capability interfaces, and the
//! controller that orchestrates them.

pub mod capture;
pub mod controller;
pub mod speech;
pub mod state;
pub mod transport;

pub use capture::{CaptureEvent, CaptureSession};
pub use controller::{ControllerCommand, ControllerEvent, ControllerHandle, VoiceController};
pub use speech::{SpeechEvent, SpeechOutput, Utterance};
pub use state::{InteractionState, SessionState, SharedSessionState};
pub use transport::{HttpReplyTransport, ReplyOutcome, ReplyRequest, ReplyTransport};
