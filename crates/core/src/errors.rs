use serde::Serialize;
use thiserror::Error;

/// Coarse classification shared by every failure that can end an agent invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    InvalidEvent,
    Configuration,
    RegistryUnavailable,
    SchemaIncompatible,
    Encoding,
    QueueFull,
    DeliveryFailed,
    PublishTimeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryHint {
    /// The same input will fail the same way.
    Never,
    /// Transient; the caller may retry after backing off.
    AfterBackoff,
    /// The message may or may not have landed.
    Unknown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEvent => "invalid_event",
            Self::Configuration => "configuration",
            Self::RegistryUnavailable => "registry_unavailable",
            Self::SchemaIncompatible => "schema_incompatible",
            Self::Encoding => "encoding",
            Self::QueueFull => "queue_full",
            Self::DeliveryFailed => "delivery_failed",
            Self::PublishTimeout => "publish_timeout",
        }
    }

    pub fn retry_hint(&self) -> RetryHint {
        match self {
            Self::InvalidEvent | Self::Configuration | Self::SchemaIncompatible | Self::Encoding => {
                RetryHint::Never
            }
            Self::RegistryUnavailable | Self::QueueFull | Self::DeliveryFailed => {
                RetryHint::AfterBackoff
            }
            Self::PublishTimeout => RetryHint::Unknown,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn from_class(
        class: FailureClass,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let correlation_id = correlation_id.into();
        match class {
            FailureClass::InvalidEvent | FailureClass::Encoding => {
                Self::BadRequest { message, correlation_id }
            }
            FailureClass::RegistryUnavailable
            | FailureClass::QueueFull
            | FailureClass::DeliveryFailed
            | FailureClass::PublishTimeout => Self::ServiceUnavailable { message, correlation_id },
            FailureClass::Configuration | FailureClass::SchemaIncompatible => {
                Self::Internal { message, correlation_id }
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The event could not be processed. Check inputs before resubmitting."
            }
            Self::ServiceUnavailable { .. } => {
                "The result could not be confirmed as delivered. Retry after a short delay."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}
