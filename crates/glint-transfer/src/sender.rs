//! Optical sender: one symbol at a time.
//!
//! ```text
//! Idle --load--> Processing --> Ready --start--> Transferring
//!                                 ^                  | Handshake, Data 1..N, Final
//!                                 |                  v
//!                               stop          FinalDisplayed --advance--> PostFinal
//!                                                                   | resend all / resend specific
//!                                                                   v
//!                                              Transferring | SendingSpecific
//! ```
//!
//! [`Sequencer`] is the pure state machine; [`run_sender`] drives it with a
//! pacing clock and an operator command channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use glint_protocol::{
    CapacityError, ErrorCorrection, MAX_TOTAL_CHUNKS, Packet, PacketError, PacketKind, TransferSession,
    check_fits, checksum, effective_chunk_size, encode_payload, format_ranges, split_encoded,
};
use uuid::Uuid;

use crate::archive::{ArchiveError, Archiver, NamedBuffer};
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::optical::{DisplayError, SymbolDisplay};

pub const MIN_AUTO_DELAY: Duration = Duration::from_millis(50);
pub const MAX_AUTO_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_CHUNK_TARGET: usize = 1024;
pub const DEFAULT_FINAL_HOLD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    Idle,
    Processing,
    Ready,
    Transferring,
    FinalDisplayed,
    PostFinal,
    SendingSpecific,
    Error,
}

impl SenderPhase {
    /// Phases in which a symbol is on screen and the clock is running.
    pub fn is_emitting(self) -> bool {
        matches!(self, Self::Transferring | Self::FinalDisplayed | Self::SendingSpecific)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Operator advances each symbol.
    Manual,
    /// Symbols advance on a timer.
    Automatic(Duration),
}

impl Pacing {
    pub fn automatic(delay: Duration) -> Self {
        Self::Automatic(delay.clamp(MIN_AUTO_DELAY, MAX_AUTO_DELAY))
    }

    /// Time to hold each symbol, clamped. `None` for manual pacing.
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Manual => None,
            Self::Automatic(delay) => Some(delay.clamp(MIN_AUTO_DELAY, MAX_AUTO_DELAY)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Keep the loaded archive so the transfer can be restarted.
    KeepData,
    /// Discard everything.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderCommand {
    Advance,
    ResendAll(Pacing),
    ResendSpecific(Vec<u32>, Pacing),
    Stop(StopMode),
}

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("cannot {action} while {phase:?}")]
    InvalidPhase { action: &'static str, phase: SenderPhase },

    #[error("archive failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("archive needs {0} chunks, more than a transfer can carry")]
    TooManyChunks(usize),

    #[error("no chunks selected for resend")]
    NothingToResend,

    #[error("chunk {seq} does not exist (transfer has {total})")]
    SequenceOutOfRange { seq: u32, total: u32 },

    #[error("display failed: {0}")]
    Display(#[from] DisplayError),
}

pub struct SenderConfig {
    pub level: ErrorCorrection,
    /// Requested data-field length; capped by the symbol capacity.
    pub chunk_target: usize,
    /// How long the final symbol stays up under automatic pacing.
    pub final_hold: Duration,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            level: ErrorCorrection::default(),
            chunk_target: DEFAULT_CHUNK_TARGET,
            final_hold: DEFAULT_FINAL_HOLD,
            logger: None,
        }
    }
}

/// A packet that has passed the capacity check and may be displayed.
#[derive(Debug, Clone)]
pub struct Emission {
    pub packet: Packet,
    pub wire: String,
    /// 1-based position within the current run.
    pub step: usize,
    pub total_steps: usize,
}

struct LoadedArchive {
    session: TransferSession,
    slices: Vec<String>,
    checksum: String,
    chunk_size: usize,
}

pub struct Sequencer {
    config: SenderConfig,
    phase: SenderPhase,
    pacing: Pacing,
    archive: Option<LoadedArchive>,
    /// Steps already emitted in the current run.
    emitted: usize,
    run_steps: usize,
    resend_queue: VecDeque<u32>,
    last_error: Option<String>,
}

impl Sequencer {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            phase: SenderPhase::Idle,
            pacing: Pacing::Manual,
            archive: None,
            emitted: 0,
            run_steps: 0,
            resend_queue: VecDeque::new(),
            last_error: None,
        }
    }

    pub fn phase(&self) -> SenderPhase {
        self.phase
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&TransferSession> {
        self.archive.as_ref().map(|a| &a.session)
    }

    /// Checksum of the loaded archive.
    pub fn checksum(&self) -> Option<&str> {
        self.archive.as_ref().map(|a| a.checksum.as_str())
    }

    pub fn chunk_size(&self) -> Option<usize> {
        self.archive.as_ref().map(|a| a.chunk_size)
    }

    /// `(emitted, total)` steps of the current run.
    pub fn progress(&self) -> (usize, usize) {
        (self.emitted, self.run_steps)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Pack, encode and split `files` into a new session.
    pub fn load(
        &mut self,
        files: &[NamedBuffer],
        archiver: &dyn Archiver,
    ) -> Result<&TransferSession, SenderError> {
        match self.phase {
            SenderPhase::Idle | SenderPhase::Ready | SenderPhase::Error => {}
            phase => return Err(SenderError::InvalidPhase { action: "load", phase }),
        }

        self.phase = SenderPhase::Processing;
        self.archive = None;
        self.last_error = None;

        let loaded = match self.prepare(files, archiver) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.log(
            &loaded.session.file_id,
            TransferEvent::ArchiveLoaded {
                archive_bytes: loaded.session.archive_size,
                chunks: loaded.session.total_data_chunks,
                chunk_size: loaded.chunk_size,
            },
        );
        self.phase = SenderPhase::Ready;
        Ok(&self.archive.insert(loaded).session)
    }

    fn prepare(&self, files: &[NamedBuffer], archiver: &dyn Archiver) -> Result<LoadedArchive, SenderError> {
        let bytes = archiver.pack(files)?;
        let encoded = encode_payload(&bytes);
        let file_id = Uuid::new_v4().simple().to_string();

        // The slice count never exceeds the encoded length, so its digits bound the seq width.
        let max_seq = u32::try_from(encoded.len().max(1)).unwrap_or(u32::MAX);
        let chunk_size = effective_chunk_size(self.config.chunk_target, self.config.level, file_id.len(), max_seq)?;
        let slices: Vec<String> = split_encoded(&encoded, chunk_size)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let total = u32::try_from(slices.len())
            .ok()
            .filter(|total| *total <= MAX_TOTAL_CHUNKS)
            .ok_or(SenderError::TooManyChunks(slices.len()))?;

        let (archive_name, original_filename) = match files {
            [single] => (format!("{}.zip", single.name), Some(single.name.clone())),
            _ => (format!("glint-{}.zip", &file_id[..8]), None),
        };

        let session = TransferSession {
            file_id,
            total_data_chunks: total,
            archive_size: bytes.len() as u64,
            archive_name,
            original_filename,
        };
        check_fits(PacketKind::Handshake, &session.handshake().to_wire()?, self.config.level)?;

        Ok(LoadedArchive {
            session,
            slices,
            checksum: checksum(&bytes),
            chunk_size,
        })
    }

    /// Begin a full pass: Handshake, every Data packet, Final.
    pub fn start(&mut self, pacing: Pacing) -> Result<(), SenderError> {
        if self.phase != SenderPhase::Ready {
            return Err(SenderError::InvalidPhase {
                action: "start",
                phase: self.phase,
            });
        }
        self.begin_full_pass(pacing);
        Ok(())
    }

    /// Repeat the full pass with the same `file_id`.
    pub fn resend_all(&mut self, pacing: Pacing) -> Result<(), SenderError> {
        if self.phase != SenderPhase::PostFinal {
            return Err(SenderError::InvalidPhase {
                action: "resend all",
                phase: self.phase,
            });
        }
        self.begin_full_pass(pacing);
        Ok(())
    }

    fn begin_full_pass(&mut self, pacing: Pacing) {
        self.pacing = pacing;
        self.emitted = 0;
        self.run_steps = self.session().map_or(0, TransferSession::total_steps);
        self.resend_queue.clear();
        self.phase = SenderPhase::Transferring;
    }

    /// Emit only `seqs` (ascending, deduplicated) followed by Final.
    pub fn resend_specific(&mut self, seqs: &[u32], pacing: Pacing) -> Result<(), SenderError> {
        if self.phase != SenderPhase::PostFinal {
            return Err(SenderError::InvalidPhase {
                action: "resend specific chunks",
                phase: self.phase,
            });
        }
        let Some(session) = self.session() else {
            return Err(SenderError::InvalidPhase {
                action: "resend specific chunks",
                phase: self.phase,
            });
        };
        let total = session.total_data_chunks;

        let mut queue = seqs.to_vec();
        queue.sort_unstable();
        queue.dedup();
        if queue.is_empty() {
            return Err(SenderError::NothingToResend);
        }
        if let Some(&seq) = queue.iter().find(|seq| **seq == 0 || **seq > total) {
            return Err(SenderError::SequenceOutOfRange { seq, total });
        }

        let file_id = session.file_id.clone();
        self.log(
            &file_id,
            TransferEvent::ResendQueued {
                count: queue.len(),
                ranges: format_ranges(&queue),
            },
        );

        self.pacing = pacing;
        self.emitted = 0;
        self.run_steps = queue.len() + 1;
        self.resend_queue = queue.into();
        self.phase = SenderPhase::SendingSpecific;
        Ok(())
    }

    /// The advance event. Returns the next packet to display, or `None` when
    /// the run has ended and the sender is now PostFinal.
    pub fn advance(&mut self) -> Result<Option<Emission>, SenderError> {
        match self.phase {
            SenderPhase::Transferring => {
                let packet = self.full_pass_packet(self.emitted)?;
                let is_final = packet.kind() == PacketKind::Final;
                let emission = self.emit(packet)?;
                if is_final {
                    self.phase = SenderPhase::FinalDisplayed;
                }
                Ok(Some(emission))
            }
            SenderPhase::FinalDisplayed => {
                self.phase = SenderPhase::PostFinal;
                Ok(None)
            }
            SenderPhase::SendingSpecific => {
                let packet = match self.resend_queue.front() {
                    Some(&seq) => self.data_packet(seq)?,
                    None => self.final_packet()?,
                };
                let is_final = packet.kind() == PacketKind::Final;
                let emission = self.emit(packet)?;
                if is_final {
                    self.phase = SenderPhase::PostFinal;
                } else {
                    self.resend_queue.pop_front();
                }
                Ok(Some(emission))
            }
            phase => Err(SenderError::InvalidPhase { action: "advance", phase }),
        }
    }

    /// Cancel the current run.
    pub fn stop(&mut self, mode: StopMode) {
        let file_id = self.session().map(|s| s.file_id.clone()).unwrap_or_default();
        if mode == StopMode::Reset {
            self.archive = None;
            self.last_error = None;
        }
        self.resend_queue.clear();
        self.emitted = 0;
        self.run_steps = 0;
        self.phase = if self.archive.is_some() {
            SenderPhase::Ready
        } else {
            SenderPhase::Idle
        };
        self.log(
            &file_id,
            TransferEvent::SenderStopped {
                keep_data: mode == StopMode::KeepData,
            },
        );
    }

    /// Enter Error with `err` recorded.
    pub fn fail(&mut self, err: &SenderError) {
        let file_id = self.session().map(|s| s.file_id.clone()).unwrap_or_default();
        self.last_error = Some(err.to_string());
        self.phase = SenderPhase::Error;
        self.log(&file_id, TransferEvent::Error { message: err.to_string() });
    }

    fn loaded(&self) -> Result<&LoadedArchive, SenderError> {
        self.archive.as_ref().ok_or(SenderError::InvalidPhase {
            action: "emit",
            phase: self.phase,
        })
    }

    /// Step 0 is the handshake, steps 1..=N the data packets, step N+1 the final.
    fn full_pass_packet(&self, step: usize) -> Result<Packet, SenderError> {
        let loaded = self.loaded()?;
        let total = loaded.slices.len();
        if step == 0 {
            Ok(loaded.session.handshake())
        } else if step <= total {
            self.data_packet(step as u32)
        } else {
            self.final_packet()
        }
    }

    fn data_packet(&self, seq: u32) -> Result<Packet, SenderError> {
        let loaded = self.loaded()?;
        let slice = loaded
            .slices
            .get((seq as usize).wrapping_sub(1))
            .ok_or(SenderError::SequenceOutOfRange {
                seq,
                total: loaded.session.total_data_chunks,
            })?;
        Ok(Packet::data(&loaded.session.file_id, seq, slice))
    }

    fn final_packet(&self) -> Result<Packet, SenderError> {
        let loaded = self.loaded()?;
        Ok(Packet::final_packet(&loaded.session.file_id, &loaded.checksum))
    }

    fn emit(&mut self, packet: Packet) -> Result<Emission, SenderError> {
        let kind = packet.kind();
        let checked = packet
            .to_wire()
            .map_err(SenderError::from)
            .and_then(|wire| {
                check_fits(kind, &wire, self.config.level)?;
                Ok(wire)
            });
        let wire = match checked {
            Ok(wire) => wire,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.emitted += 1;
        self.log(
            &packet.file_id,
            TransferEvent::PacketEmitted {
                kind,
                seq: packet.seq(),
                size: wire.len(),
            },
        );
        Ok(Emission {
            packet,
            wire,
            step: self.emitted,
            total_steps: self.run_steps,
        })
    }

    fn log(&self, file_id: &str, event: TransferEvent) {
        if let Some(logger) = &self.config.logger {
            logger.log(TransferLog {
                component: "sender",
                file_id: file_id.to_string(),
                event,
            });
        }
    }
}

/// Why a pacing wait ended.
enum Wake {
    Advance,
    Stop(StopMode),
    /// A resend requested while the final symbol is held.
    Resend(SenderCommand),
    Closed,
}

/// Drive `sequencer` from its current phase until the run is stopped or the
/// command channel closes.
///
/// Expects the sequencer to have been started. Returns the phase it ended in.
pub fn run_sender(
    sequencer: &mut Sequencer,
    display: &mut dyn SymbolDisplay,
    commands: &Receiver<SenderCommand>,
) -> Result<SenderPhase, SenderError> {
    let level = sequencer.config().level;
    let final_hold = sequencer.config().final_hold;

    loop {
        match sequencer.phase() {
            SenderPhase::PostFinal => {
                let Ok(command) = commands.recv() else {
                    return Ok(SenderPhase::PostFinal);
                };
                apply_post_final(sequencer, command);
                continue;
            }
            phase if !phase.is_emitting() => return Ok(phase),
            _ => {}
        }

        if let Some(emission) = sequencer.advance()? {
            tracing::debug!(step = emission.step, total = emission.total_steps, "symbol shown");
            if let Err(e) = display.show(&emission.wire, level) {
                let err = SenderError::from(e);
                sequencer.fail(&err);
                return Err(err);
            }
        }
        if !sequencer.phase().is_emitting() {
            continue;
        }

        let hold = match (sequencer.pacing().delay(), sequencer.phase()) {
            (Some(_), SenderPhase::FinalDisplayed) => Some(final_hold),
            (delay, _) => delay,
        };
        let final_held = sequencer.phase() == SenderPhase::FinalDisplayed;
        match wait_for_advance(commands, hold, final_held) {
            Wake::Advance => {}
            Wake::Stop(mode) => sequencer.stop(mode),
            Wake::Resend(command) => {
                // Cut the hold short: FinalDisplayed advances straight to PostFinal.
                sequencer.advance()?;
                apply_post_final(sequencer, command);
            }
            Wake::Closed => {
                tracing::info!("command channel closed, stopping sender");
                sequencer.stop(StopMode::KeepData);
            }
        }
    }
}

fn apply_post_final(sequencer: &mut Sequencer, command: SenderCommand) {
    let result = match command {
        SenderCommand::ResendAll(pacing) => sequencer.resend_all(pacing),
        SenderCommand::ResendSpecific(seqs, pacing) => sequencer.resend_specific(&seqs, pacing),
        SenderCommand::Stop(mode) => {
            sequencer.stop(mode);
            Ok(())
        }
        SenderCommand::Advance => Ok(()),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "sender command rejected");
    }
}

/// Wait for the next advance. `hold` is the automatic delay; `None` waits for
/// an explicit [`SenderCommand::Advance`]. Resend commands end the wait only
/// when `accept_resend` is set and are otherwise dropped.
fn wait_for_advance(
    commands: &Receiver<SenderCommand>,
    hold: Option<Duration>,
    accept_resend: bool,
) -> Wake {
    let deadline = hold.map(|hold| Instant::now() + hold);
    loop {
        let received = match deadline {
            Some(deadline) => match commands.recv_deadline(deadline) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => return Wake::Advance,
                Err(RecvTimeoutError::Disconnected) => {
                    // Nobody left to interrupt; keep the clock running.
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    return Wake::Advance;
                }
            },
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => return Wake::Closed,
            },
        };
        match received {
            SenderCommand::Advance => return Wake::Advance,
            SenderCommand::Stop(mode) => return Wake::Stop(mode),
            resend if accept_resend => return Wake::Resend(resend),
            other => tracing::debug!(command = ?other, "command ignored while emitting"),
        }
    }
}
