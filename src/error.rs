//! Error taxonomy for a placement session

use thiserror::Error;

use crate::types::SystemState;

/// Errors surfaced by session operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Microphone denied or capture unsupported; fatal to the listening flow
    #[error("Audio resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A remote capability failed or answered with a non-success status
    #[error("{capability} call failed: {message}")]
    Transport {
        capability: &'static str,
        message: String,
    },

    /// Remote reply is missing a required field
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Operation requested in an incompatible system state
    #[error("Cannot {operation} while {from}")]
    InvalidTransition {
        from: SystemState,
        operation: &'static str,
    },

    /// Session already closed
    #[error("Session already finalized")]
    Finalized,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Build a transport error for a named capability
    pub fn transport(capability: &'static str, message: impl ToString) -> Self {
        Self::Transport {
            capability,
            message: message.to_string(),
        }
    }

    /// Whether the listening flow may resume after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ResourceUnavailable(_) | Self::Finalized)
    }
}
