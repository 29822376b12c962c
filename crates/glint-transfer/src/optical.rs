//! Seams to the optical encoder and decoder.
//!
//! The sender renders each packet string as a symbol through [`SymbolDisplay`];
//! the receiver is fed one [`ScanEvent`] per decoder callback. [`loopback`]
//! connects the two in memory, optionally losing frames like a shaky camera.

use crossbeam_channel::{Receiver, Sender, unbounded};
use glint_protocol::ErrorCorrection;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("symbol encoder failed: {0}")]
    Encoder(String),

    #[error("display link closed")]
    Closed,
}

/// Device or permission failure reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScannerError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera available")]
    NoDevice,

    #[error("scanner failure: {0}")]
    Device(String),
}

/// One decoder callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Decoded(String),
    /// Frame sampled without a readable symbol. Not an error.
    NoCode,
    Failed(ScannerError),
}

/// Optical encoder: renders a payload as a scannable symbol.
///
/// Each call replaces the previous symbol.
pub trait SymbolDisplay {
    fn show(&mut self, payload: &str, level: ErrorCorrection) -> Result<(), DisplayError>;
}

/// Frame filter: returns `false` for payloads the camera should miss.
pub type FrameFilter = Box<dyn FnMut(&str) -> bool + Send>;

/// In-memory display whose every symbol is "scanned" by the paired receiver.
pub struct LoopbackDisplay {
    tx: Sender<ScanEvent>,
    filter: Option<FrameFilter>,
    shown: u64,
    dropped: u64,
}

/// Create a connected display and scan stream.
pub fn loopback() -> (LoopbackDisplay, Receiver<ScanEvent>) {
    let (tx, rx) = unbounded();
    let display = LoopbackDisplay {
        tx,
        filter: None,
        shown: 0,
        dropped: 0,
    };
    (display, rx)
}

impl LoopbackDisplay {
    /// Deliver only the payloads `filter` accepts; the rest arrive as [`ScanEvent::NoCode`].
    pub fn with_filter(mut self, filter: FrameFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Lose every `n`-th symbol. `0` keeps them all.
    pub fn drop_every(self, n: u64) -> Self {
        if n == 0 {
            return self;
        }
        let mut count = 0u64;
        self.with_filter(Box::new(move |_| {
            count += 1;
            count % n != 0
        }))
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SymbolDisplay for LoopbackDisplay {
    fn show(&mut self, payload: &str, _level: ErrorCorrection) -> Result<(), DisplayError> {
        self.shown += 1;
        let deliver = self.filter.as_mut().map_or(true, |filter| filter(payload));
        let event = if deliver {
            ScanEvent::Decoded(payload.to_string())
        } else {
            self.dropped += 1;
            ScanEvent::NoCode
        };
        self.tx.send(event).map_err(|_| DisplayError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_payloads() {
        let (mut display, rx) = loopback();
        display.show("one", ErrorCorrection::Medium).unwrap();
        display.show("two", ErrorCorrection::Medium).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::Decoded("one".into()));
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::Decoded("two".into()));
        assert_eq!(display.shown(), 2);
    }

    #[test]
    fn drop_every_loses_frames() {
        let (display, rx) = loopback();
        let mut display = display.drop_every(3);
        for i in 0..6 {
            display.show(&i.to_string(), ErrorCorrection::Low).unwrap();
        }
        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert_eq!(events[2], ScanEvent::NoCode);
        assert_eq!(events[5], ScanEvent::NoCode);
        assert_eq!(events[4], ScanEvent::Decoded("4".into()));
        assert_eq!(display.dropped(), 2);
    }

    #[test]
    fn closed_link_is_reported() {
        let (mut display, rx) = loopback();
        drop(rx);
        assert!(matches!(
            display.show("x", ErrorCorrection::High),
            Err(DisplayError::Closed)
        ));
    }
}
