//! Transfer logging trait for structured logs.
//!
//! Both state machines report milestones through a [`TransferLogger`] so the
//! caller decides whether they go to `tracing`, a UI console, or nowhere.

use std::fmt;

use glint_protocol::PacketKind;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub file_id: String,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Sender: archive packed, encoded and split
    ArchiveLoaded {
        archive_bytes: u64,
        chunks: u32,
        chunk_size: usize,
    },
    /// Sender: one symbol shown
    PacketEmitted {
        kind: PacketKind,
        seq: Option<u32>,
        size: usize,
    },
    /// Sender: partial resend queued
    ResendQueued {
        count: usize,
        ranges: String,
    },
    /// Sender: stopped by the operator
    SenderStopped {
        keep_data: bool,
    },
    /// Receiver: handshake adopted
    SessionAdopted {
        total: u32,
        archive_bytes: u64,
    },
    /// Receiver: new slice stored
    ChunkStored {
        seq: u32,
        received: u32,
        total: u32,
    },
    /// Receiver: packet dropped without a state change
    PacketIgnored {
        reason: String,
    },
    /// Receiver: final seen with slices still missing
    MissingChunks {
        count: u32,
        ranges: String,
    },
    /// Receiver: payload verified
    TransferVerified {
        archive_bytes: u64,
    },
    /// Receiver: size or checksum mismatch
    VerificationFailed {
        message: String,
    },
    /// Receiver: peer speaks another protocol version
    VersionMismatch {
        found: i64,
        expected: u32,
    },
    /// Error occurred
    Error {
        message: String,
    },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchiveLoaded { archive_bytes, chunks, chunk_size } => {
                write!(f, "archive_loaded bytes={} chunks={} chunk_size={}", archive_bytes, chunks, chunk_size)
            }
            Self::PacketEmitted { kind, seq: Some(seq), size } => {
                write!(f, "packet_emitted kind={} seq={} size={}", kind, seq, size)
            }
            Self::PacketEmitted { kind, seq: None, size } => {
                write!(f, "packet_emitted kind={} size={}", kind, size)
            }
            Self::ResendQueued { count, ranges } => {
                write!(f, "resend_queued count={} seqs={}", count, ranges)
            }
            Self::SenderStopped { keep_data } => {
                write!(f, "sender_stopped keep_data={}", keep_data)
            }
            Self::SessionAdopted { total, archive_bytes } => {
                write!(f, "session_adopted total={} bytes={}", total, archive_bytes)
            }
            Self::ChunkStored { seq, received, total } => {
                write!(f, "chunk_stored seq={} received={}/{}", seq, received, total)
            }
            Self::PacketIgnored { reason } => {
                write!(f, "packet_ignored reason={}", reason)
            }
            Self::MissingChunks { count, ranges } => {
                write!(f, "missing_chunks count={} seqs={}", count, ranges)
            }
            Self::TransferVerified { archive_bytes } => {
                write!(f, "transfer_verified bytes={}", archive_bytes)
            }
            Self::VerificationFailed { message } => {
                write!(f, "verification_failed: {}", message)
            }
            Self::VersionMismatch { found, expected } => {
                write!(f, "version_mismatch found={} expected={}", found, expected)
            }
            Self::Error { message } => {
                write!(f, "error: {}", message)
            }
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing, feed a
/// UI, or discard entries.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Use info for lifecycle events, debug for per-packet spam
        match &entry.event {
            TransferEvent::VerificationFailed { .. }
            | TransferEvent::VersionMismatch { .. }
            | TransferEvent::Error { .. } => {
                tracing::warn!(
                    component = entry.component,
                    file_id = %entry.file_id,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::ArchiveLoaded { .. }
            | TransferEvent::ResendQueued { .. }
            | TransferEvent::SenderStopped { .. }
            | TransferEvent::SessionAdopted { .. }
            | TransferEvent::MissingChunks { .. }
            | TransferEvent::TransferVerified { .. } => {
                tracing::info!(
                    component = entry.component,
                    file_id = %entry.file_id,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::debug!(
                    component = entry.component,
                    file_id = %entry.file_id,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_render_as_key_value_text() {
        let emitted = TransferEvent::PacketEmitted {
            kind: PacketKind::Data,
            seq: Some(4),
            size: 310,
        };
        assert_eq!(emitted.to_string(), "packet_emitted kind=data seq=4 size=310");

        let missing = TransferEvent::MissingChunks {
            count: 2,
            ranges: "2, 4".into(),
        };
        assert_eq!(missing.to_string(), "missing_chunks count=2 seqs=2, 4");
    }
}
