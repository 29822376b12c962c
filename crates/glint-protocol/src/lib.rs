//! Glint wire protocol: packets carried by a sequence of scanned optical codes.
//!
//! Provides:
//! - Three packet kinds (handshake, data, final) as a tagged enum with a compact JSON wire form
//! - Capacity planning per error-correction level
//! - Splitting of the encoded archive stream into capacity-bounded slices
//! - Additive 16-bit checksum verification of the reassembled payload
//! - Missing-sequence range formatting and parsing

pub mod capacity;
pub mod error;
pub mod packet;
pub mod ranges;
pub mod session;
pub mod splitter;
pub mod verify;

// Re-export key types for convenience.
pub use capacity::{
    ErrorCorrection, MIN_CHUNK_SIZE, SAFETY_MARGIN, check_fits, data_overhead,
    effective_chunk_size, max_slice_len,
};
pub use error::{CapacityError, PacketError, RangeError, VerifyError};
pub use packet::{MAX_TOTAL_CHUNKS, PROTOCOL_VERSION, Packet, PacketBody, PacketKind};
pub use ranges::{format_ranges, parse_ranges};
pub use session::TransferSession;
pub use splitter::split_encoded;
pub use verify::{checksum, decode_payload, encode_payload, verify};
