//! Source abstractions and backend drivers.
//!
//! This module defines the boundary between the crate and a partitioned,
//! at-least-once message source (event-hub- or queue-style). The source
//! adapter owns connections, delivery order, and the durable checkpoint
//! store; this crate only consumes the contracts declared here.
//!
//! ## Key components
//!
//! - [`SourceMessage`]: capability surface of a provider message
//! - [`PartitionContext`]: per-partition handle exposing the asynchronous
//!   checkpoint operations
//! - [`Batch`] / [`StreamBatches`]: delivery of provider messages, one ordered
//!   stream per partition
//!
//! Concrete implementations are provided by backend modules such as
//! [`inmemory`] and `kafka` (feature-gated).

pub mod inmemory;

#[cfg(feature = "kafka")]
pub mod kafka;

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Capability surface of a provider message.
///
/// Conversion reads the payload and the declared header fields; checkpoint
/// bookkeeping reads the identity fields for diagnostics. Absent optional
/// fields are simply absent, never an error.
pub trait SourceMessage {
    /// Raw payload bytes.
    fn payload(&self) -> &[u8];

    /// Provider-assigned message identifier, if the message carries one.
    fn message_id(&self) -> Option<&str>;

    /// Content type of the payload, if the message carries one.
    fn content_type(&self) -> Option<&str>;

    /// Reply-to destination, if the message carries one.
    fn reply_to(&self) -> Option<&str>;

    /// Opaque offset or sequence token, if the source exposes one.
    fn offset(&self) -> Option<String>;
}

/// Per-partition handle supplied by the source adapter.
///
/// The crate never constructs a partition context for a real provider; it only
/// invokes one. Both checkpoint operations are asynchronous and their outcome
/// is delivered through the returned future, never by blocking the caller.
#[async_trait]
pub trait PartitionContext<M>: Send + Sync {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError> + Send;

    /// Identifier of the partition this context belongs to.
    fn partition_id(&self) -> &str;

    /// Durably record the partition's current read position.
    async fn checkpoint(&self) -> Result<(), Self::Error>;

    /// Durably record a specific, possibly non-latest, message as consumed.
    async fn checkpoint_message(&self, message: M) -> Result<(), Self::Error>;
}

/// One delivery batch for one partition.
///
/// Messages appear in the source's delivery order for that partition.
#[derive(Debug)]
pub struct Batch<C, M> {
    /// Partition handle the batch was delivered on.
    pub context: C,
    /// Delivered provider messages, in order.
    pub messages: Vec<M>,
}

/// Trait for streaming delivery batches from a source.
///
/// The returned stream should:
/// - Yield batches per partition in the source's delivery order
/// - Respect cancellation via the provided [`CancellationToken`]
#[async_trait]
pub trait StreamBatches<C, M> {
    /// Backend-specific error type.
    type Error;

    /// Stream delivery batches until exhaustion or cancellation.
    async fn batches(
        &self,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'_, Result<Batch<C, M>, Self::Error>>, Self::Error>;
}
