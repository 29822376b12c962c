//! Glint Transfer: file transfer over a sequence of optical codes.
//!
//! Provides:
//! - Sender sequencer: handshake, data slices and final shown one symbol at a time
//! - Manual or timer-driven pacing with operator commands over a channel
//! - Full and partial (missing-only) resends under a stable file id
//! - Receiver assembler tolerant of loss, duplicates and out-of-order scans
//! - Size and checksum verification before any file is offered
//! - Zip archive packing, extraction and download collaborators
//! - In-memory loopback link standing in for a screen and camera

pub mod archive;
pub mod chunk_store;
pub mod logging;
pub mod optical;
pub mod receiver;
pub mod sender;

// Re-export key types for convenience.
pub use archive::{Archiver, DirectorySink, DownloadSink, MemorySink, NamedBuffer, ZipArchiver};
pub use chunk_store::ChunkStore;
pub use logging::{NullLogger, TracingLogger, TransferLogger};
pub use optical::{LoopbackDisplay, ScanEvent, ScannerError, SymbolDisplay, loopback};
pub use receiver::{
    Assembler, Intake, ReceiverError, ReceiverEvent, ReceiverPhase, VerifiedTransfer, deliver, run_receiver,
};
pub use sender::{
    Pacing, SenderCommand, SenderConfig, SenderError, SenderPhase, Sequencer, StopMode, run_sender,
};
