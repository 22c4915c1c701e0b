use crate::conversation::TurnState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Any failed chat exchange: non-success status, transport fault, or a
    /// body that could not be read. Callers never distinguish the cause.
    #[error("Request to {endpoint} failed: {message}")]
    Request {
        endpoint: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("A turn is already in progress ({0})")]
    TurnInProgress(TurnState),

    #[error("Cannot {action} while {state}")]
    InvalidTurnState {
        state: TurnState,
        action: &'static str,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn request(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            endpoint: endpoint.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn request_with_status(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Request {
            endpoint: endpoint.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_state(state: TurnState, action: &'static str) -> Self {
        Self::InvalidTurnState { state, action }
    }

    pub fn is_request_failure(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
