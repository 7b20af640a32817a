pub mod config;
pub mod gateway;
pub mod messages;
pub mod session;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BanterError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Speech output error: {0}")]
    SpeechError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for BanterError {
    fn from(e: std::io::Error) -> Self {
        BanterError::IOError(e.to_string())
    }
}

impl BanterError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Caller mistakes; the session keeps running
            BanterError::InvalidInput(_) => true,
            BanterError::RateLimited(_) => true,
            // These are typically transient errors
            BanterError::UpstreamError(_) => true,
            BanterError::CaptureError(_) => true,
            BanterError::SpeechError(_) => true,
            BanterError::TransportError(_) => true,
            // Channel errors indicate internal issues
            BanterError::ChannelError(_) => false,
            // Config errors require user intervention
            BanterError::ConfigError(_) => false,
            BanterError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description
    ///
    /// Returns a message suitable for display in the UI. Raw upstream
    /// diagnostics never pass through here.
    pub fn user_message(&self) -> String {
        match self {
            BanterError::InvalidInput(_) => {
                "Please provide a valid message.".to_string()
            }
            BanterError::RateLimited(_) => {
                "Too many requests. Please wait a moment before trying again.".to_string()
            }
            BanterError::UpstreamError(_) => {
                "The assistant is temporarily unavailable. Please try again.".to_string()
            }
            BanterError::CaptureError(_) => {
                "Error accessing microphone. Please check permissions.".to_string()
            }
            BanterError::SpeechError(_) => {
                "Text-to-speech failed. The reply will be shown as text.".to_string()
            }
            BanterError::TransportError(_) => {
                "Sorry, there was an error processing your message.".to_string()
            }
            BanterError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            BanterError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            BanterError::IOError(_) => {
                "File system error occurred.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BanterError>;
