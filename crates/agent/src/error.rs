use courier_bus::PublishError;
use courier_core::errors::FailureClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("no agent named `{0}`")]
    UnknownAgent(String),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl AgentError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::InvalidEvent(_) | Self::UnknownAgent(_) => FailureClass::InvalidEvent,
            Self::Publish(error) => error.class(),
        }
    }
}
