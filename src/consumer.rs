//! Consumer loop delivering source messages through conversion, handling,
//! and checkpoint bookkeeping.
//!
//! This module implements a generic *inbound adapter* that:
//!
//! - Streams delivery batches from a partitioned source
//! - Converts each provider message into an [`Envelope`]
//! - Dispatches the envelope through a handler [`Pipeline`]
//! - Feeds the checkpoint manager as messages and batches complete
//! - Exposes lifecycle hooks for observability and customization
//!
//! The consumer runs until:
//! - The source stream ends
//! - A source error occurs
//! - A [`CancellationToken`] is triggered
//!
//! Handler failures are absorbed: the failed message is left un-recorded by
//! the checkpoint manager and delivery continues, preserving at-least-once
//! semantics. Checkpoint commit failures never reach this loop at all; they
//! are logged by the checkpoint manager.

use std::marker::PhantomData;

use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::{
    checkpoint::CheckpointManager,
    converter::MessageConverter,
    handler::Pipeline,
    source::{Batch, PartitionContext, SourceMessage, StreamBatches},
    Envelope,
};

/// Inbound consumer.
///
/// The `Consumer` continuously pulls delivery batches from a source, converts
/// each message, hands it to the pipeline, and lets the checkpoint manager
/// decide when consumption progress is durably advanced.
///
/// Generic parameters:
/// - `C`: Partition context type supplied by the source
/// - `S`: Source implementation
/// - `V`: Message converter
/// - `CM`: Checkpoint manager
/// - `HK`: Hook implementation for lifecycle events
/// - `T`: Handler service type
pub struct Consumer<C, S, V, CM, HK, T> {
    source: S,
    converter: V,
    checkpoint: CM,
    pipeline: Pipeline<T>,
    hook: HK,
    context_marker: PhantomData<C>,
}

impl<C, S, V, CM, T> Consumer<C, S, V, CM, DefaultConsumerHook, T>
where
    V: MessageConverter,
    S: StreamBatches<C, V::Message>,
    T: Service<Envelope>,
{
    /// Create a new consumer with the default hook implementation.
    pub fn new(source: S, converter: V, checkpoint: CM, pipeline: Pipeline<T>) -> Self {
        Self {
            source,
            converter,
            checkpoint,
            pipeline,
            hook: DefaultConsumerHook,
            context_marker: PhantomData,
        }
    }
}

impl<C, S, V, CM, HK, T> Consumer<C, S, V, CM, HK, T>
where
    C: PartitionContext<V::Message>,
    V: MessageConverter,
    V::Message: SourceMessage + Send + 'static,
    S: StreamBatches<C, V::Message> + Send,
    S::Error: Into<tower::BoxError>,
    CM: CheckpointManager<C, V::Message>,
    HK: ConsumerHook,
    T: Service<Envelope> + Clone + Send + 'static,
    T::Future: Send + 'static,
    T::Error: Into<tower::BoxError>,
{
    /// Replace the consumer hook while keeping all other generics unchanged.
    ///
    /// This allows customizing behavior (logging, metrics, alerting, etc.)
    /// without rebuilding the consumer.
    pub fn with_hook<HK2: ConsumerHook>(self, hook: HK2) -> Consumer<C, S, V, CM, HK2, T> {
        Consumer {
            source: self.source,
            converter: self.converter,
            checkpoint: self.checkpoint,
            pipeline: self.pipeline,
            hook,
            context_marker: self.context_marker,
        }
    }

    /// Run the consumer loop.
    ///
    /// The consumer:
    /// - Subscribes to the source's batch stream
    /// - Converts and dispatches each message in delivery order
    /// - Records successfully handled messages with the checkpoint manager
    /// - Signals batch boundaries to the checkpoint manager
    /// - Stops on cancellation, stream end, or source error
    ///
    /// The loop can be terminated gracefully using the provided
    /// [`CancellationToken`].
    #[tracing::instrument(skip(self))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ConsumerRunError> {
        self.hook.on_startup();

        let mut batches = self
            .source
            .batches(cancel.clone())
            .await
            .map_err(|e| ConsumerRunError::receive(e.into()))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.hook.on_shutdown();
                    break;
                }
                batch = batches.next() => {
                    match batch {
                        Some(Ok(Batch { context, messages })) => {
                            for message in messages {
                                let envelope = self.converter.to_envelope(&message);
                                self.hook.on_message(context.partition_id(), &envelope);

                                match self.pipeline.dispatch(envelope).await {
                                    Ok(()) => self.checkpoint.on_message(&context, message),
                                    Err(err) => {
                                        self.hook.on_handler_error(context.partition_id(), &err);
                                    }
                                }
                            }

                            self.checkpoint.complete_batch(&context);
                            self.hook.on_batch_complete(context.partition_id());
                        }
                        Some(Err(err)) => {
                            let err = err.into();
                            self.hook.on_receive_error(err.as_ref());
                            return Err(ConsumerRunError::receive(err));
                        }
                        None => {
                            self.hook.on_stream_end();
                            return Ok(());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Error returned when the consumer loop fails.
///
/// Only source failures are fatal to the loop; they are handed back to the
/// source adapter, which owns retry and backoff policy.
#[derive(Debug)]
pub struct ConsumerRunError {
    context: tracing_error::SpanTrace,
    source: tower::BoxError,
}

impl ConsumerRunError {
    fn receive(error: tower::BoxError) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            source: error,
        }
    }
}

impl std::fmt::Display for ConsumerRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Source error: {}", self.source)?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ConsumerRunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Hook trait for observing consumer lifecycle events.
///
/// Hooks are invoked synchronously and should avoid heavy or blocking work.
/// Typical use cases include logging, metrics, and tracing integration.
pub trait ConsumerHook: Send + Sync {
    fn on_startup(&self);
    fn on_shutdown(&self);
    fn on_message(&self, partition_id: &str, envelope: &Envelope);
    fn on_handler_error(&self, partition_id: &str, error: &dyn std::error::Error);
    fn on_receive_error(&self, error: &dyn std::error::Error);
    fn on_batch_complete(&self, partition_id: &str);
    fn on_stream_end(&self);
}

/// Default consumer hook implementation.
///
/// Logs lifecycle events using `tracing`.
pub struct DefaultConsumerHook;

impl ConsumerHook for DefaultConsumerHook {
    fn on_startup(&self) {
        tracing::info!("Consumer is starting up");
    }

    fn on_shutdown(&self) {
        tracing::info!("Consumer is shutting down");
    }

    fn on_message(&self, partition_id: &str, _envelope: &Envelope) {
        tracing::debug!(partition = %partition_id, "Message received");
    }

    fn on_handler_error(&self, partition_id: &str, error: &dyn std::error::Error) {
        tracing::error!(partition = %partition_id, ?error, "Error handling message");
    }

    fn on_receive_error(&self, error: &dyn std::error::Error) {
        tracing::error!(?error, "Error receiving from source");
    }

    fn on_batch_complete(&self, partition_id: &str) {
        tracing::debug!(partition = %partition_id, "Batch complete");
    }

    fn on_stream_end(&self) {
        tracing::info!("Source stream ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::checkpoint::testsupport::wait_for_commits;
    use crate::checkpoint::{CheckpointConfig, CheckpointMode, CheckpointStrategy};
    use crate::handler::Handler;
    use crate::source::inmemory::{
        CommitRecord, InMemoryConverter, InMemoryMessage, InMemoryPartition, InMemorySource,
    };

    #[derive(Clone, Default)]
    struct Collect {
        seen: Arc<Mutex<Vec<Envelope>>>,
    }

    #[async_trait::async_trait]
    impl Handler for Collect {
        type Error = std::io::Error;

        async fn handle(&mut self, envelope: Envelope) -> Result<(), Self::Error> {
            self.seen.lock().unwrap().push(envelope);
            Ok(())
        }
    }

    #[derive(Clone)]
    struct RejectPayload(&'static [u8]);

    #[async_trait::async_trait]
    impl Handler for RejectPayload {
        type Error = std::io::Error;

        async fn handle(&mut self, envelope: Envelope) -> Result<(), Self::Error> {
            if envelope.payload == self.0 {
                Err(std::io::Error::other("handler refused"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn delivers_converts_and_checkpoints_across_partitions() {
        let source = InMemorySource::new();
        let left = InMemoryPartition::new("0");
        let right = InMemoryPartition::new("1");

        source
            .push_batch(Batch {
                context: left.clone(),
                messages: vec![
                    InMemoryMessage::new(b"a".to_vec())
                        .with_offset(0)
                        .with_content_type("text/plain"),
                    InMemoryMessage::new(b"b".to_vec()).with_offset(1),
                ],
            })
            .await;
        source
            .push_batch(Batch {
                context: right.clone(),
                messages: vec![InMemoryMessage::new(b"c".to_vec()).with_offset(0)],
            })
            .await;

        let handler = Collect::default();
        let consumer = Consumer::new(
            source,
            InMemoryConverter,
            CheckpointStrategy::new(CheckpointConfig::new(CheckpointMode::Record)),
            Pipeline::new(handler.clone()),
        );

        consumer.run(CancellationToken::new()).await.unwrap();

        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].payload, b"a");
        assert_eq!(
            seen[0].headers.content_type(),
            Some("text/plain".to_owned()),
        );

        assert_eq!(wait_for_commits(&left, 2).await.len(), 2);
        assert_eq!(wait_for_commits(&right, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn handler_failure_skips_checkpoint_but_not_delivery() {
        let source = InMemorySource::new();
        let partition = InMemoryPartition::new("0");

        source
            .push_batch(Batch {
                context: partition.clone(),
                messages: vec![
                    InMemoryMessage::new(b"poison".to_vec()).with_offset(0),
                    InMemoryMessage::new(b"fine".to_vec()).with_offset(1),
                ],
            })
            .await;

        let consumer = Consumer::new(
            source,
            InMemoryConverter,
            CheckpointStrategy::new(CheckpointConfig::new(CheckpointMode::Record)),
            Pipeline::new(RejectPayload(b"poison")),
        );

        consumer.run(CancellationToken::new()).await.unwrap();

        let commits = wait_for_commits(&partition, 1).await;
        assert_eq!(
            commits,
            vec![CommitRecord::Message {
                message_id: None,
                offset: Some("1".to_owned()),
            }],
        );
    }

    #[tokio::test]
    async fn commit_failure_does_not_stop_the_loop() {
        let source = InMemorySource::new();
        let failing = InMemoryPartition::new("0");
        failing.set_failing(true);
        let healthy = InMemoryPartition::new("1");

        source
            .push_batch(Batch {
                context: failing.clone(),
                messages: vec![InMemoryMessage::new(b"a".to_vec()).with_offset(0)],
            })
            .await;
        source
            .push_batch(Batch {
                context: healthy.clone(),
                messages: vec![InMemoryMessage::new(b"b".to_vec()).with_offset(0)],
            })
            .await;

        let handler = Collect::default();
        let consumer = Consumer::new(
            source,
            InMemoryConverter,
            CheckpointStrategy::new(CheckpointConfig::new(CheckpointMode::Record)),
            Pipeline::new(handler.clone()),
        );

        consumer.run(CancellationToken::new()).await.unwrap();

        // Both messages were delivered; only the healthy partition committed.
        assert_eq!(handler.seen.lock().unwrap().len(), 2);
        assert_eq!(wait_for_commits(&healthy, 1).await.len(), 1);
        assert!(failing.commits().await.is_empty());
    }

    #[tokio::test]
    async fn batch_mode_commits_at_the_batch_boundary() {
        let source = InMemorySource::new();
        let partition = InMemoryPartition::new("0");

        source
            .push_batch(Batch {
                context: partition.clone(),
                messages: vec![
                    InMemoryMessage::new(b"a".to_vec()).with_offset(0),
                    InMemoryMessage::new(b"b".to_vec()).with_offset(1),
                ],
            })
            .await;

        let consumer = Consumer::new(
            source,
            InMemoryConverter,
            CheckpointStrategy::new(CheckpointConfig::new(CheckpointMode::Batch)),
            Pipeline::new(Collect::default()),
        );

        consumer.run(CancellationToken::new()).await.unwrap();

        let commits = wait_for_commits(&partition, 1).await;
        assert_eq!(
            commits,
            vec![CommitRecord::Message {
                message_id: None,
                offset: Some("1".to_owned()),
            }],
        );
    }
}
