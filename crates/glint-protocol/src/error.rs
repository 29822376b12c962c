//! Error taxonomy of the wire protocol.

/// Decoding failures for a scanned payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Missing or mistyped field. Dropped by the receiver.
    #[error("malformed packet: {0}")]
    Structure(String),

    /// Well-formed packet from an incompatible peer. Fatal for the session.
    #[error("incompatible protocol version {found} (this side speaks {expected})")]
    Version { found: i64, expected: u32 },

    #[error("cannot serialize packet: {0}")]
    Encode(String),
}

impl PacketError {
    /// Version mismatches abort the session; everything else is channel noise.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Version { .. })
    }
}

/// A packet or slice that cannot fit the optical symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("no room for data: budget {budget} bytes, overhead {overhead} bytes")]
    NoRoom { budget: usize, overhead: usize },

    #[error("{kind} packet is {size} bytes, budget is {budget}")]
    Overflow {
        kind: &'static str,
        size: usize,
        budget: usize,
    },

    #[error("chunk size must be greater than zero")]
    ZeroChunk,

    #[error("a character at byte {offset} is wider than the {size}-byte chunk size")]
    UnsplittableChar { offset: usize, size: usize },
}

/// Integrity failures of the reassembled payload. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("payload is not valid base64: {0}")]
    Decode(String),

    #[error("size mismatch: declared {expected} bytes, reassembled {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("invalid sequence number {0:?}")]
    InvalidNumber(String),

    #[error("sequence numbers start at 1")]
    Zero,

    #[error("descending range {start}-{end}")]
    Descending { start: u32, end: u32 },

    #[error("sequence number {0} is beyond any transfer")]
    TooLarge(u32),
}
