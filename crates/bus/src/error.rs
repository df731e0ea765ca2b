use courier_core::errors::FailureClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("schema registry unavailable for subject `{subject}`: {reason}")]
    Unavailable { subject: String, reason: String },
    #[error("schema rejected by registry for subject `{subject}`: {reason}")]
    Incompatible { subject: String, reason: String },
    #[error("schema for subject `{subject}` does not parse: {reason}")]
    InvalidSchema { subject: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("required field `{field}` is missing")]
    MissingField { field: String },
    #[error("field `{field}` expected {expected}, found {found}")]
    TypeMismatch { field: String, expected: String, found: String },
    #[error("field `{field}` has symbol `{symbol}` not declared by the schema")]
    UnknownSymbol { field: String, symbol: String },
    #[error("avro serialization failed: {0}")]
    Serialization(String),
    #[error("payload is not a framed datum: {0}")]
    Framing(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("producer queue is full")]
    QueueFull,
    #[error("delivery channel is closed")]
    Closed,
    #[error("send rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("broker rejected message: {0}")]
    Rejected(String),
    #[error("delivery report dropped before completion")]
    Dropped,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("schema registry unavailable: {0}")]
    RegistryUnavailable(String),
    #[error("schema incompatible: {0}")]
    SchemaIncompatible(String),
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),
    #[error("producer queue is full")]
    QueueFull,
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("publish timed out with {outstanding} message(s) outstanding")]
    PublishTimeout { outstanding: usize },
}

impl PublishError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Configuration(_) => FailureClass::Configuration,
            Self::RegistryUnavailable(_) => FailureClass::RegistryUnavailable,
            Self::SchemaIncompatible(_) => FailureClass::SchemaIncompatible,
            Self::Encoding(_) => FailureClass::Encoding,
            Self::QueueFull => FailureClass::QueueFull,
            Self::DeliveryFailed(_) => FailureClass::DeliveryFailed,
            Self::PublishTimeout { .. } => FailureClass::PublishTimeout,
        }
    }
}

impl From<RegistryError> for PublishError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Unavailable { .. } => Self::RegistryUnavailable(error.to_string()),
            RegistryError::Incompatible { .. } | RegistryError::InvalidSchema { .. } => {
                Self::SchemaIncompatible(error.to_string())
            }
        }
    }
}

impl From<ChannelError> for PublishError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::QueueFull => Self::QueueFull,
            ChannelError::Closed | ChannelError::Rejected(_) => {
                Self::DeliveryFailed(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_core::errors::FailureClass;

    use super::{ChannelError, EncodingError, PublishError, RegistryError};

    #[test]
    fn registry_errors_keep_their_class() {
        let unavailable: PublishError = RegistryError::Unavailable {
            subject: "search-value".to_string(),
            reason: "connect refused".to_string(),
        }
        .into();
        let incompatible: PublishError = RegistryError::Incompatible {
            subject: "search-value".to_string(),
            reason: "409".to_string(),
        }
        .into();

        assert_eq!(unavailable.class(), FailureClass::RegistryUnavailable);
        assert_eq!(incompatible.class(), FailureClass::SchemaIncompatible);
    }

    #[test]
    fn queue_full_send_stays_transient() {
        let error: PublishError = ChannelError::QueueFull.into();
        assert!(matches!(error, PublishError::QueueFull));

        let closed: PublishError = ChannelError::Closed.into();
        assert_eq!(closed.class(), FailureClass::DeliveryFailed);
    }

    #[test]
    fn encoding_error_message_names_the_field() {
        let error: PublishError =
            EncodingError::MissingField { field: "query".to_string() }.into();
        assert_eq!(error.to_string(), "encoding failed: required field `query` is missing");
    }
}
