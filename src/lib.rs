#![doc = include_str!("../README.md")]

pub mod checkpoint;
mod consumer;
pub mod converter;
pub mod envelope;
pub mod handler;
pub mod source;

#[doc(inline)]
pub use envelope::{Envelope, HeaderValue, Headers};

#[doc(inline)]
pub use converter::{MessageConverter, PayloadFormat};

#[doc(inline)]
pub use checkpoint::{CheckpointConfig, CheckpointManager, CheckpointMode, CheckpointStrategy};

#[doc(inline)]
pub use source::{Batch, PartitionContext, SourceMessage, StreamBatches};

#[doc(inline)]
pub use handler::{Handler, Pipeline, PipelineError, PipelineErrorKind};

#[doc(inline)]
pub use consumer::{Consumer, ConsumerHook, ConsumerRunError, DefaultConsumerHook};
