//! Codec port: converts between envelopes and encoded queue messages.

use crate::envelope::Envelope;
use crate::error::CodecError;
use crate::message::EncodedMessage;

/// Serializer for envelopes crossing the queue boundary
///
/// `decode(encode(e))` must reproduce the message and all items of `e`.
pub trait EnvelopeCodec: Send + Sync {
    /// Rebuild an envelope from a raw message's body, headers and properties
    fn decode(&self, encoded: EncodedMessage) -> Result<Envelope, CodecError>;

    /// Encode an envelope for publishing
    fn encode(&self, envelope: &Envelope) -> Result<EncodedMessage, CodecError>;
}
