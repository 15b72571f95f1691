//! Conversion between [`Envelope`]s and provider messages.
//!
//! [`MessageConverter`] carries the shared mapping logic in its provided
//! methods; implementations supply only the provider-specific constructors and
//! field setters. A converter instance is stateless and safe to share across
//! concurrent conversions.
//!
//! ## Header fidelity
//!
//! Only the declared header set crosses the provider boundary: content-type,
//! message-id, and reply-to. Arbitrary custom headers on either side are not
//! propagated by this path. This is a deliberate limitation of the base
//! conversion, kept explicit rather than silently extended.

use crate::{
    Envelope,
    envelope::{self, HeaderValue, Headers},
    source::SourceMessage,
};

/// Which provider constructor path applies to an envelope payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// The payload is text; the provider's string constructor is used.
    Text,
    /// The payload is binary; the provider's byte constructor is used.
    Binary,
}

/// Converts between an [`Envelope`] and a provider message.
///
/// ## Mapping
///
/// Inbound ([`to_envelope`](MessageConverter::to_envelope)):
/// - provider payload → `Envelope.payload`
/// - provider message id → [`envelope::RAW_ID`] header
/// - provider content type → [`envelope::CONTENT_TYPE`] header, parsed as a
///   MIME type; a malformed value is dropped with a warning, never an error
/// - provider reply-to → [`envelope::REPLY_TO`] header
///
/// Outbound ([`from_envelope`](MessageConverter::from_envelope)):
/// - `Envelope.payload` → provider payload, via the constructor selected by
///   [`PayloadFormat`]
/// - [`envelope::CONTENT_TYPE`], [`envelope::MESSAGE_ID`] and
///   [`envelope::REPLY_TO`] headers → provider fields, each coerced to its
///   string form whichever [`HeaderValue`] variant it is stored as
pub trait MessageConverter {
    /// Provider message type this converter maps to and from.
    type Message: SourceMessage;

    /// Build a provider message from a text payload.
    fn message_from_text(&self, payload: String) -> Self::Message;

    /// Build a provider message from a binary payload.
    fn message_from_bytes(&self, payload: Vec<u8>) -> Self::Message;

    /// Copy the declared header set into the provider message's fields.
    ///
    /// Implementations read [`Headers::content_type`], [`Headers::message_id`]
    /// and [`Headers::reply_to`] (already string-coerced) and set the
    /// corresponding provider fields. Absent headers leave the fields unset.
    fn apply_headers(&self, headers: &Headers, message: &mut Self::Message);

    /// Convert a provider message into an [`Envelope`].
    fn to_envelope(&self, message: &Self::Message) -> Envelope {
        let mut headers = Headers::new();

        if let Some(id) = message.message_id() {
            headers.insert(envelope::RAW_ID, id);
        }

        if let Some(content_type) = message.content_type() {
            match content_type.parse::<mime::Mime>() {
                Ok(parsed) => headers.insert(envelope::CONTENT_TYPE, HeaderValue::Mime(parsed)),
                Err(_) => tracing::warn!(
                    content_type,
                    "invalid content type on inbound message, header dropped",
                ),
            }
        }

        if let Some(reply_to) = message.reply_to() {
            headers.insert(envelope::REPLY_TO, reply_to);
        }

        Envelope {
            headers,
            payload: message.payload().to_vec(),
        }
    }

    /// Convert an [`Envelope`] into a provider message.
    fn from_envelope(&self, envelope: &Envelope, format: PayloadFormat) -> Self::Message {
        let mut message = match format {
            PayloadFormat::Text => {
                self.message_from_text(String::from_utf8_lossy(&envelope.payload).into_owned())
            }
            PayloadFormat::Binary => self.message_from_bytes(envelope.payload.clone()),
        };

        self.apply_headers(&envelope.headers, &mut message);
        message
    }
}
