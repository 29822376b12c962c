//! Optical receiver: reassembles a session from scanned symbols.
//!
//! [`Assembler`] consumes one decoded payload at a time and never blocks.
//! Symbols may arrive in any order, repeatedly, or not at all; the store is
//! keyed by sequence number so none of that changes the reassembled result.
//! [`run_receiver`] feeds it from the scanner channel, reports progress as
//! [`ReceiverEvent`]s and hands a verified archive to extraction and download.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use glint_protocol::{
    Packet, PacketBody, PacketError, TransferSession, VerifyError, decode_payload, format_ranges, verify,
};

use crate::archive::{ArchiveError, Archiver, DownloadSink, SinkError};
use crate::chunk_store::{ChunkStore, Insert};
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::optical::{ScanEvent, ScannerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    Idle,
    WaitingHandshake,
    ReceivingData,
    WaitingFinal,
    WaitingMissing,
    Verifying,
    Complete,
    Error,
}

impl ReceiverPhase {
    /// Phases that accept scanned packets.
    pub fn is_listening(self) -> bool {
        matches!(
            self,
            Self::WaitingHandshake | Self::ReceivingData | Self::WaitingFinal | Self::WaitingMissing
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("cannot {action} while {phase:?}")]
    InvalidPhase { action: &'static str, phase: ReceiverPhase },

    #[error("incompatible sender: protocol version {found}, this receiver speaks {expected}")]
    Version { found: i64, expected: u32 },

    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("scanner failed: {0}")]
    Scanner(#[from] ScannerError),

    #[error("extraction failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("download failed: {0}")]
    Sink(#[from] SinkError),

    #[error("scanning stopped before the transfer completed")]
    Stopped,
}

/// Why a packet was dropped without changing state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IgnoreReason {
    #[error("{0}")]
    Malformed(PacketError),

    #[error("receiver is {0:?}")]
    NotListening(ReceiverPhase),

    #[error("packet belongs to another transfer")]
    WrongSession,

    #[error("handshake repeated")]
    RepeatedHandshake,

    #[error("sequence {0} outside the announced range")]
    OutOfRange(u32),
}

/// A reassembled archive that passed size and checksum checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransfer {
    pub session: TransferSession,
    pub archive: Vec<u8>,
}

/// Effect of one scanned payload.
#[derive(Debug)]
pub enum Intake {
    Ignored(IgnoreReason),
    /// A handshake for a new file id was adopted.
    SessionStarted { total: u32 },
    /// Intake picked the retained session back up after a restart.
    Resumed { received: u32, total: u32 },
    Stored { seq: u32, received: u32, total: u32 },
    Duplicate { seq: u32 },
    /// Every slice is held; the final packet has not been seen yet.
    AwaitingFinal,
    /// The final packet arrived with slices still missing.
    Missing(Vec<u32>),
    Completed(VerifiedTransfer),
    Failed(ReceiverError),
}

/// Progress reported by [`run_receiver`] to whoever operates the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    SessionStarted { file_id: String, total: u32 },
    /// The final packet was seen with these slices still missing.
    Missing { seqs: Vec<u32>, display: String },
    Delivered { file_id: String, name: String },
}

pub struct Assembler {
    phase: ReceiverPhase,
    session: Option<TransferSession>,
    store: ChunkStore,
    final_checksum: Option<String>,
    missing: Vec<u32>,
    logger: Option<Arc<dyn TransferLogger>>,
    last_error: Option<String>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Assembler {
    pub fn new(logger: Option<Arc<dyn TransferLogger>>) -> Self {
        Self {
            phase: ReceiverPhase::Idle,
            session: None,
            store: ChunkStore::default(),
            final_checksum: None,
            missing: Vec::new(),
            logger,
            last_error: None,
        }
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&TransferSession> {
        self.session.as_ref()
    }

    /// `(received, total)` data chunks of the current session.
    pub fn progress(&self) -> (u32, u32) {
        (self.store.received(), self.store.total())
    }

    /// Missing sequence numbers as of the last final packet, ascending.
    pub fn missing(&self) -> &[u32] {
        &self.missing
    }

    /// [`missing`](Self::missing) rendered as ranges, e.g. `"2, 4-6"`.
    pub fn missing_display(&self) -> String {
        format_ranges(&self.missing)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Begin intake. A session kept by [`stop`](Self::stop) is resumed by its next packet.
    pub fn start(&mut self) -> Result<(), ReceiverError> {
        if self.phase != ReceiverPhase::Idle {
            return Err(ReceiverError::InvalidPhase {
                action: "start",
                phase: self.phase,
            });
        }
        self.phase = ReceiverPhase::WaitingHandshake;
        Ok(())
    }

    /// Halt intake, keeping the session and every stored slice.
    pub fn stop(&mut self) {
        if self.phase.is_listening() {
            self.phase = ReceiverPhase::Idle;
        }
    }

    /// Forget everything and return to Idle.
    pub fn reset(&mut self) {
        self.phase = ReceiverPhase::Idle;
        self.session = None;
        self.store.reset(0);
        self.final_checksum = None;
        self.missing.clear();
        self.last_error = None;
    }

    /// Process one scanned payload.
    pub fn handle(&mut self, raw: &str) -> Intake {
        if !self.phase.is_listening() {
            return Intake::Ignored(IgnoreReason::NotListening(self.phase));
        }
        match Packet::from_wire(raw) {
            Ok(packet) => self.handle_packet(packet),
            Err(PacketError::Version { found, expected }) => {
                self.log(TransferEvent::VersionMismatch { found, expected });
                let err = ReceiverError::Version { found, expected };
                self.fail(&err);
                Intake::Failed(err)
            }
            Err(e) => self.ignore(IgnoreReason::Malformed(e)),
        }
    }

    fn handle_packet(&mut self, packet: Packet) -> Intake {
        let is_current = self
            .session
            .as_ref()
            .is_some_and(|session| session.file_id == packet.file_id);

        if let PacketBody::Handshake { .. } = &packet.body {
            if is_current {
                return self.on_repeated_handshake();
            }
            return match TransferSession::from_handshake(&packet) {
                Some(session) => self.adopt(session),
                None => self.ignore(IgnoreReason::WrongSession),
            };
        }

        if !is_current {
            return self.ignore(IgnoreReason::WrongSession);
        }
        if self.phase == ReceiverPhase::WaitingHandshake {
            self.phase = self.intake_phase();
        }

        match packet.body {
            PacketBody::Data { seq, data } => self.on_data(seq, &data),
            PacketBody::Final { checksum } => self.on_final(checksum),
            PacketBody::Handshake { .. } => self.ignore(IgnoreReason::RepeatedHandshake),
        }
    }

    fn adopt(&mut self, session: TransferSession) -> Intake {
        let total = session.total_data_chunks;
        self.store.reset(total);
        self.final_checksum = None;
        self.missing.clear();
        self.last_error = None;
        self.phase = if total > 0 {
            ReceiverPhase::ReceivingData
        } else {
            ReceiverPhase::WaitingFinal
        };
        self.session = Some(session);
        self.log(TransferEvent::SessionAdopted {
            total,
            archive_bytes: self.session.as_ref().map_or(0, |s| s.archive_size),
        });
        Intake::SessionStarted { total }
    }

    fn on_repeated_handshake(&mut self) -> Intake {
        if self.phase == ReceiverPhase::WaitingHandshake {
            self.phase = self.intake_phase();
            return Intake::Resumed {
                received: self.store.received(),
                total: self.store.total(),
            };
        }
        self.ignore(IgnoreReason::RepeatedHandshake)
    }

    fn on_data(&mut self, seq: u32, data: &str) -> Intake {
        match self.store.insert(seq, data) {
            Insert::OutOfRange => self.ignore(IgnoreReason::OutOfRange(seq)),
            Insert::Duplicate => Intake::Duplicate { seq },
            Insert::Stored => {
                let (received, total) = self.progress();
                self.log(TransferEvent::ChunkStored { seq, received, total });

                if !self.store.is_complete() {
                    if self.phase == ReceiverPhase::WaitingMissing {
                        self.missing.retain(|missing| *missing != seq);
                    }
                    return Intake::Stored { seq, received, total };
                }
                match self.final_checksum.clone() {
                    Some(expected) => self.verify(&expected),
                    None => {
                        self.phase = ReceiverPhase::WaitingFinal;
                        Intake::AwaitingFinal
                    }
                }
            }
        }
    }

    fn on_final(&mut self, checksum: String) -> Intake {
        let missing = self.store.missing();
        self.final_checksum = Some(checksum.clone());
        if missing.is_empty() {
            return self.verify(&checksum);
        }

        self.log(TransferEvent::MissingChunks {
            count: missing.len() as u32,
            ranges: format_ranges(&missing),
        });
        self.missing = missing.clone();
        self.phase = ReceiverPhase::WaitingMissing;
        Intake::Missing(missing)
    }

    fn verify(&mut self, expected: &str) -> Intake {
        self.phase = ReceiverPhase::Verifying;
        self.missing.clear();

        let (Some(session), Some(encoded)) = (self.session.clone(), self.store.assemble()) else {
            self.phase = self.intake_phase();
            return Intake::Missing(self.store.missing());
        };

        let checked = decode_payload(&encoded).and_then(|bytes| {
            verify(&bytes, session.archive_size, expected)?;
            Ok(bytes)
        });
        match checked {
            Ok(archive) => {
                self.phase = ReceiverPhase::Complete;
                self.log(TransferEvent::TransferVerified {
                    archive_bytes: archive.len() as u64,
                });
                Intake::Completed(VerifiedTransfer { session, archive })
            }
            Err(e) => {
                self.log(TransferEvent::VerificationFailed { message: e.to_string() });
                let err = ReceiverError::Verify(e);
                self.fail(&err);
                Intake::Failed(err)
            }
        }
    }

    /// The intake phase the stored state corresponds to.
    fn intake_phase(&self) -> ReceiverPhase {
        if self.session.is_none() {
            ReceiverPhase::WaitingHandshake
        } else if self.store.is_complete() {
            ReceiverPhase::WaitingFinal
        } else if self.final_checksum.is_some() {
            ReceiverPhase::WaitingMissing
        } else {
            ReceiverPhase::ReceivingData
        }
    }

    fn ignore(&self, reason: IgnoreReason) -> Intake {
        self.log(TransferEvent::PacketIgnored {
            reason: reason.to_string(),
        });
        Intake::Ignored(reason)
    }

    fn fail(&mut self, err: &ReceiverError) {
        self.last_error = Some(err.to_string());
        self.phase = ReceiverPhase::Error;
    }

    fn log(&self, event: TransferEvent) {
        if let Some(logger) = &self.logger {
            logger.log(TransferLog {
                component: "receiver",
                file_id: self
                    .session
                    .as_ref()
                    .map(|s| s.file_id.clone())
                    .unwrap_or_default(),
                event,
            });
        }
    }
}

/// Offer a verified transfer to the user: the original file when the
/// handshake named one and the archive holds it, otherwise the archive itself.
///
/// Returns the name the data was offered under.
pub fn deliver(
    verified: &VerifiedTransfer,
    archiver: &dyn Archiver,
    sink: &mut dyn DownloadSink,
) -> Result<String, ReceiverError> {
    if let Some(original) = &verified.session.original_filename {
        if let Some(data) = archiver.extract(&verified.archive, original)? {
            sink.offer(&data, original)?;
            return Ok(original.clone());
        }
        tracing::warn!(name = %original, "archive does not hold the announced file, offering archive");
    }
    sink.offer(&verified.archive, &verified.session.archive_name)?;
    Ok(verified.session.archive_name.clone())
}

/// Drive `assembler` from scanner events until one transfer completes.
///
/// Starts intake if the assembler is idle. Session starts, missing-chunk
/// reports and the delivery are sent on `events` when given; a dropped event
/// receiver does not stop intake. On success the assembler is reset and the
/// delivered session returned.
pub fn run_receiver(
    assembler: &mut Assembler,
    scans: &Receiver<ScanEvent>,
    archiver: &dyn Archiver,
    sink: &mut dyn DownloadSink,
    events: Option<&Sender<ReceiverEvent>>,
) -> Result<TransferSession, ReceiverError> {
    let report = |event: ReceiverEvent| {
        if let Some(events) = events {
            let _ = events.send(event);
        }
    };

    if assembler.phase() == ReceiverPhase::Idle {
        assembler.start()?;
    }

    for event in scans.iter() {
        let raw = match event {
            ScanEvent::Decoded(raw) => raw,
            ScanEvent::NoCode => continue,
            ScanEvent::Failed(e) => {
                tracing::warn!(error = %e, "scanner failed, stopping intake");
                assembler.stop();
                return Err(e.into());
            }
        };

        match assembler.handle(&raw) {
            Intake::Completed(verified) => {
                let delivered = deliver(&verified, archiver, &mut *sink);
                assembler.reset();
                let name = delivered?;
                tracing::info!(file_id = %verified.session.file_id, name = %name, "transfer delivered");
                report(ReceiverEvent::Delivered {
                    file_id: verified.session.file_id.clone(),
                    name,
                });
                return Ok(verified.session);
            }
            Intake::Failed(e) => return Err(e),
            Intake::Missing(seqs) => {
                let missing = format_ranges(&seqs);
                tracing::info!(count = seqs.len(), missing = %missing, "waiting for missing chunks");
                report(ReceiverEvent::Missing { seqs, display: missing });
            }
            Intake::SessionStarted { total } => {
                tracing::info!(total, "receiving transfer");
                let file_id = assembler
                    .session()
                    .map(|session| session.file_id.clone())
                    .unwrap_or_default();
                report(ReceiverEvent::SessionStarted { file_id, total });
            }
            _ => {}
        }
    }

    assembler.stop();
    Err(ReceiverError::Stopped)
}
