//! Transport-agnostic message representation.
//!
//! An [`Envelope`] bundles a payload with its associated [`Headers`]. It is the
//! only message shape downstream code ever sees: converters translate
//! provider messages into envelopes on the way in and back out of them on the
//! way out, so application logic stays isolated from provider SDK types.

use std::collections::HashMap;
use std::fmt;

/// Header key for the payload content type (MIME-like string).
pub const CONTENT_TYPE: &str = "content-type";

/// Header key for the message identifier assigned by the sending application.
pub const MESSAGE_ID: &str = "id";

/// Header key for the identifier assigned by the provider itself.
///
/// Kept distinct from [`MESSAGE_ID`] so that a round trip through an
/// intermediate bus that blends headers cannot collide with the generic id
/// semantics.
pub const RAW_ID: &str = "raw-id";

/// Header key for the reply-to destination.
pub const REPLY_TO: &str = "reply-to";

/// A single header value.
///
/// Values may be stored as plain text, as a parsed MIME type, or as a
/// structured identifier. All variants coerce uniformly to their string form
/// via [`Display`](fmt::Display), which is the form that crosses provider
/// boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Plain text value.
    Text(String),
    /// Parsed MIME type.
    Mime(mime::Mime),
    /// Structured message identifier.
    Id(uuid::Uuid),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Text(value) => f.write_str(value),
            HeaderValue::Mime(value) => write!(f, "{value}"),
            HeaderValue::Id(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<mime::Mime> for HeaderValue {
    fn from(value: mime::Mime) -> Self {
        HeaderValue::Mime(value)
    }
}

impl From<uuid::Uuid> for HeaderValue {
    fn from(value: uuid::Uuid) -> Self {
        HeaderValue::Id(value)
    }
}

/// Message headers: a unique-keyed map from header name to [`HeaderValue`].
///
/// Insertion order is irrelevant. The typed accessors return the well-known
/// headers coerced to their string form, whichever variant they are stored as.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(HashMap<String, HeaderValue>);

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a header by key.
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    /// Whether a header is present under the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map holds no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The [`CONTENT_TYPE`] header in string form.
    pub fn content_type(&self) -> Option<String> {
        self.coerced(CONTENT_TYPE)
    }

    /// The [`MESSAGE_ID`] header in string form.
    pub fn message_id(&self) -> Option<String> {
        self.coerced(MESSAGE_ID)
    }

    /// The [`RAW_ID`] header in string form.
    pub fn raw_id(&self) -> Option<String> {
        self.coerced(RAW_ID)
    }

    /// The [`REPLY_TO`] header in string form.
    pub fn reply_to(&self) -> Option<String> {
        self.coerced(REPLY_TO)
    }

    fn coerced(&self, key: &str) -> Option<String> {
        self.0.get(key).map(ToString::to_string)
    }
}

impl FromIterator<(String, HeaderValue)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, HeaderValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Message container used by the conversion and delivery pipeline.
///
/// `Envelope` bundles a byte payload together with its headers. It is
/// intentionally provider-agnostic: a text payload and a binary payload are
/// represented identically once inside. Envelopes are created by a converter
/// on the inbound path or by application code on the outbound path, and are
/// treated as immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message metadata.
    pub headers: Headers,
    /// Message payload.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope with the given payload and no headers.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    /// Attach a header, consuming and returning the envelope.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

impl From<(Headers, Vec<u8>)> for Envelope {
    fn from(value: (Headers, Vec<u8>)) -> Self {
        Envelope {
            headers: value.0,
            payload: value.1,
        }
    }
}
