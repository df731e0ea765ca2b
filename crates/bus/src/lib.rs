//! Schema-validated result publishing: registry resolution, Avro encoding with
//! registry framing, and acknowledged delivery to a topic.

pub mod channel;
pub mod context;
pub mod encoder;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod publisher;
pub mod registry;

pub use channel::{DeliveryChannel, DeliveryReceipt, DeliveryReport, OutboundMessage};
pub use context::PublisherContext;
pub use encoder::RecordEncoder;
pub use error::{ChannelError, DeliveryError, EncodingError, PublishError, RegistryError};
pub use memory::{InMemoryChannel, MemoryBehavior, MemoryChannelOptions, StoredMessage};
pub use publisher::{PublishReceipt, ResultPublisher};
pub use registry::{
    bundled_schema, subject_for, CompiledSchema, HttpSchemaRegistry, InMemorySchemaRegistry,
    SchemaRegistry, SchemaResolver,
};
