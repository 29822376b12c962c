mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use glint_protocol::{TransferSession, parse_ranges};
use glint_transfer::{
    Assembler, DirectorySink, Pacing, ReceiverError, ReceiverEvent, SenderCommand, SenderConfig, Sequencer,
    StopMode, TracingLogger, ZipArchiver, loopback, run_receiver, run_sender,
};
use tracing::{info, warn};

use crate::config::Config;

/// Resend rounds before the transfer is given up.
const MAX_ROUNDS: usize = 8;

/// What the receiver thread hands back: the session and the paths written.
type Received = Result<(TransferSession, Vec<PathBuf>), ReceiverError>;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glint=info,glint_transfer=info".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;
    let files = config.read_inputs()?;

    // Sender
    let mut sequencer = Sequencer::new(SenderConfig {
        level: config.level,
        chunk_target: config.chunk_target,
        final_hold: config.final_hold,
        logger: Some(Arc::new(TracingLogger)),
    });
    let session = sequencer.load(&files, &ZipArchiver)?.clone();
    info!(
        file_id = %session.file_id,
        archive = %session.archive_name,
        bytes = session.archive_size,
        chunks = session.total_data_chunks,
        level = %config.level,
        "archive ready"
    );

    let pacing = Pacing::automatic(config.delay);
    sequencer.start(pacing)?;

    let (display, scans) = loopback();
    let mut display = display.drop_every(config.drop_every);
    let (cmd_tx, cmd_rx) = unbounded();
    let sender = thread::spawn(move || run_sender(&mut sequencer, &mut display, &cmd_rx));

    // Receiver
    let (event_tx, event_rx) = unbounded();
    let (done_tx, done_rx) = unbounded();
    let output_dir = config.output_dir.clone();
    let receiver = thread::spawn(move || {
        let mut assembler = Assembler::new(Some(Arc::new(TracingLogger)));
        let mut sink = DirectorySink::new(output_dir);
        let received = run_receiver(&mut assembler, &scans, &ZipArchiver, &mut sink, Some(&event_tx))
            .map(|session| (session, sink.written().to_vec()));
        let _ = done_tx.send(received);
    });

    // One full pass plus slack.
    let steps = u32::try_from(session.total_steps()).unwrap_or(u32::MAX);
    let pass_time = pacing
        .delay()
        .unwrap_or_default()
        .saturating_mul(steps)
        .saturating_add(config.final_hold)
        .saturating_add(Duration::from_secs(2));

    let outcome = supervise(&cmd_tx, &event_rx, &done_rx, pass_time, pacing);

    let _ = cmd_tx.send(SenderCommand::Stop(StopMode::Reset));
    drop(cmd_tx);
    let phase = sender
        .join()
        .map_err(|_| anyhow!("sender thread panicked"))??;
    receiver
        .join()
        .map_err(|_| anyhow!("receiver thread panicked"))?;
    info!(?phase, "sender stopped");

    let (session, written) = outcome?;
    for path in &written {
        info!(file_id = %session.file_id, path = %path.display(), "transfer complete");
    }
    Ok(())
}

/// Answer missing-chunk reports with targeted resends, and silence with a full
/// resend, until the receiver finishes.
fn supervise(
    commands: &Sender<SenderCommand>,
    events: &Receiver<ReceiverEvent>,
    done: &Receiver<Received>,
    pass_time: Duration,
    pacing: Pacing,
) -> anyhow::Result<(TransferSession, Vec<PathBuf>)> {
    let mut round = 0;
    while round < MAX_ROUNDS {
        select! {
            recv(done) -> received => {
                let received = received.map_err(|_| anyhow!("receiver exited without a result"))?;
                return Ok(received?);
            }
            recv(events) -> event => match event {
                Ok(ReceiverEvent::Missing { display: missing, .. }) => {
                    round += 1;
                    info!(round, missing = %missing, "requesting missing chunks");
                    let seqs = parse_ranges(&missing)?;
                    commands.send(SenderCommand::ResendSpecific(seqs, pacing))?;
                }
                Ok(ReceiverEvent::SessionStarted { file_id, total }) => {
                    info!(file_id = %file_id, total, "receiver locked on");
                }
                // Delivery is reported through `done`.
                Ok(ReceiverEvent::Delivered { .. }) | Err(_) => {}
            },
            default(pass_time) => {
                round += 1;
                warn!(round, "final symbol not seen, resending everything");
                commands.send(SenderCommand::ResendAll(pacing))?;
            }
        }
    }
    bail!("transfer incomplete after {MAX_ROUNDS} rounds")
}
