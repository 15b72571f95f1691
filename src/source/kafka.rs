use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use rdkafka::consumer::{CommitMode, Consumer as _, StreamConsumer};
use rdkafka::message::Headers as _;
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;

use crate::converter::MessageConverter;
use crate::envelope::Headers;
use crate::source::{Batch, PartitionContext, SourceMessage, StreamBatches};

/// Kafka header carrying the message id.
pub const MESSAGE_ID_HEADER: &str = "message-id";

/// Kafka header carrying the payload content type.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Kafka header carrying the reply-to destination.
pub const REPLY_TO_HEADER: &str = "reply-to";

/// Detached copy of a Kafka message.
///
/// Kafka has no native id, content-type or reply-to fields; they travel as
/// message headers under the keys above. Header values that are not valid
/// UTF-8 are skipped. Partition and offset are present on consumed messages
/// and absent on messages built for the outbound path.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaMessage {
    topic: String,
    partition: Option<i32>,
    offset: Option<i64>,
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
    headers: HashMap<String, String>,
}

impl KafkaMessage {
    /// Copy a native rdkafka message into an owned, detached form.
    pub fn from_native<N: Message>(message: &N) -> Self {
        let mut headers = HashMap::new();
        if let Some(native) = message.headers() {
            for i in 0..native.count() {
                let header = native.get(i);
                if let Some(value) = header.value {
                    if let Ok(value) = std::str::from_utf8(value) {
                        headers.insert(header.key.to_owned(), value.to_owned());
                    }
                }
            }
        }

        Self {
            topic: message.topic().to_owned(),
            partition: Some(message.partition()),
            offset: Some(message.offset()),
            key: message.key().map(ToOwned::to_owned),
            payload: message.payload().map(ToOwned::to_owned).unwrap_or_default(),
            headers,
        }
    }

    /// The topic this message belongs (or will be sent) to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The partition the message was consumed from, if any.
    pub fn partition(&self) -> Option<i32> {
        self.partition
    }

    /// The message key, if any.
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// Look up a message header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

impl SourceMessage for KafkaMessage {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn message_id(&self) -> Option<&str> {
        self.header(MESSAGE_ID_HEADER)
    }

    fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE_HEADER)
    }

    fn reply_to(&self) -> Option<&str> {
        self.header(REPLY_TO_HEADER)
    }

    fn offset(&self) -> Option<String> {
        self.offset.map(|offset| offset.to_string())
    }
}

/// Converter between [`Envelope`](crate::Envelope)s and [`KafkaMessage`]s.
///
/// Outbound messages are scoped to a single topic, selected at construction.
#[derive(Debug, Clone)]
pub struct KafkaConverter {
    topic: String,
}

impl KafkaConverter {
    /// Create a converter building messages for the given topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    fn blank(&self, payload: Vec<u8>) -> KafkaMessage {
        KafkaMessage {
            topic: self.topic.clone(),
            partition: None,
            offset: None,
            key: None,
            payload,
            headers: HashMap::new(),
        }
    }
}

impl MessageConverter for KafkaConverter {
    type Message = KafkaMessage;

    fn message_from_text(&self, payload: String) -> Self::Message {
        self.blank(payload.into_bytes())
    }

    fn message_from_bytes(&self, payload: Vec<u8>) -> Self::Message {
        self.blank(payload)
    }

    fn apply_headers(&self, headers: &Headers, message: &mut Self::Message) {
        if let Some(content_type) = headers.content_type() {
            message
                .headers
                .insert(CONTENT_TYPE_HEADER.to_owned(), content_type);
        }
        if let Some(message_id) = headers.message_id() {
            message
                .headers
                .insert(MESSAGE_ID_HEADER.to_owned(), message_id);
        }
        if let Some(reply_to) = headers.reply_to() {
            message.headers.insert(REPLY_TO_HEADER.to_owned(), reply_to);
        }
    }
}

/// Kafka partition handle.
///
/// Checkpoints by committing offsets on the shared consumer:
/// [`checkpoint`](PartitionContext::checkpoint) commits the consumer's current
/// state, [`checkpoint_message`](PartitionContext::checkpoint_message) commits
/// the offset just past the given message. Commits are issued in
/// non-blocking mode; broker-side failures surface through the consumer's
/// error callback.
#[derive(Clone)]
pub struct KafkaPartition {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    id: String,
}

impl KafkaPartition {
    fn new(consumer: Arc<StreamConsumer>, topic: &str, partition: i32) -> Self {
        Self {
            consumer,
            id: format!("{topic}-{partition}"),
            topic: topic.to_owned(),
            partition,
        }
    }
}

#[async_trait]
impl PartitionContext<KafkaMessage> for KafkaPartition {
    type Error = rdkafka::error::KafkaError;

    fn partition_id(&self) -> &str {
        &self.id
    }

    async fn checkpoint(&self) -> Result<(), Self::Error> {
        self.consumer.commit_consumer_state(CommitMode::Async)
    }

    async fn checkpoint_message(&self, message: KafkaMessage) -> Result<(), Self::Error> {
        match message.offset {
            Some(offset) => {
                let mut list = TopicPartitionList::new();
                list.add_partition_offset(&self.topic, self.partition, Offset::Offset(offset + 1))?;
                self.consumer.commit(&list, CommitMode::Async)
            }
            // A message without an offset cannot be committed explicitly.
            None => self.consumer.commit_consumer_state(CommitMode::Async),
        }
    }
}

/// Kafka source.
///
/// Streams messages from a subscribed [`StreamConsumer`]. Kafka delivers one
/// message at a time, so every [`Batch`] holds a single message and batch
/// boundaries collapse to message boundaries: with this source, batch-oriented
/// checkpoint strategies behave like record mode.
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
}

impl KafkaSource {
    /// Create a source over an already-subscribed consumer.
    pub fn new(consumer: StreamConsumer) -> Self {
        Self {
            consumer: Arc::new(consumer),
        }
    }

    /// Create a source sharing a consumer with other components.
    pub fn from_shared(consumer: Arc<StreamConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl StreamBatches<KafkaPartition, KafkaMessage> for KafkaSource {
    type Error = rdkafka::error::KafkaError;

    #[tracing::instrument(skip_all)]
    async fn batches(
        &self,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'_, Result<Batch<KafkaPartition, KafkaMessage>, Self::Error>>, Self::Error>
    {
        let consumer = Arc::clone(&self.consumer);
        let stream = async_stream::stream! {
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = consumer.recv() => received,
                };

                match received {
                    Ok(native) => {
                        let context = KafkaPartition::new(
                            Arc::clone(&consumer),
                            native.topic(),
                            native.partition(),
                        );
                        let message = KafkaMessage::from_native(&native);
                        yield Ok(Batch { context, messages: vec![message] });
                    }
                    Err(error) => yield Err(error),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
