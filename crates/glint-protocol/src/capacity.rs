//! Capacity planning for optical symbols.
//!
//! Budgets sit below the byte-mode capacity of the largest symbol at each
//! error-correction level, so every packet stays decodable by ordinary scanners.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CapacityError;
use crate::packet::{Packet, PacketKind};

/// Bytes kept free on top of the computed overhead.
pub const SAFETY_MARGIN: usize = 32;

/// Smallest chunk size a user target is raised to.
pub const MIN_CHUNK_SIZE: usize = 64;

/// Error-correction strength of the optical symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCorrection {
    Low,
    #[default]
    Medium,
    Quartile,
    High,
}

impl ErrorCorrection {
    /// Maximum serialized packet size for this level. Stronger correction, smaller budget.
    pub fn byte_budget(self) -> usize {
        match self {
            Self::Low => 2800,
            Self::Medium => 2200,
            Self::Quartile => 1600,
            Self::High => 1200,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::Low => 'L',
            Self::Medium => 'M',
            Self::Quartile => 'Q',
            Self::High => 'H',
        }
    }
}

impl fmt::Display for ErrorCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for ErrorCorrection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Self::Low),
            "m" | "medium" => Ok(Self::Medium),
            "q" | "quartile" => Ok(Self::Quartile),
            "h" | "high" => Ok(Self::High),
            other => Err(format!("unknown error-correction level {:?}", other)),
        }
    }
}

/// Serialized size of a data packet with an empty slice.
///
/// Measured on a template packet so keys, punctuation and the widest
/// sequence number are counted exactly as the encoder writes them.
pub fn data_overhead(file_id_len: usize, max_seq: u32) -> usize {
    let template = Packet::data(&"x".repeat(file_id_len), max_seq.max(1), "");
    // The template only holds ASCII strings and integers.
    template.to_wire().map(|wire| wire.len()).unwrap_or(usize::MAX)
}

/// Largest data slice that keeps a data packet within the level's budget.
pub fn max_slice_len(
    level: ErrorCorrection,
    file_id_len: usize,
    max_seq: u32,
) -> Result<usize, CapacityError> {
    let budget = level.byte_budget();
    let overhead = data_overhead(file_id_len, max_seq);
    match budget.checked_sub(overhead.saturating_add(SAFETY_MARGIN)) {
        Some(room) if room > 0 => Ok(room),
        _ => Err(CapacityError::NoRoom { budget, overhead }),
    }
}

/// Chunk size actually used: the user target raised to [`MIN_CHUNK_SIZE`],
/// then capped by what the symbol can carry.
pub fn effective_chunk_size(
    target: usize,
    level: ErrorCorrection,
    file_id_len: usize,
    max_seq: u32,
) -> Result<usize, CapacityError> {
    let max = max_slice_len(level, file_id_len, max_seq)?;
    Ok(target.max(MIN_CHUNK_SIZE).min(max))
}

/// Emission-time guard against symbols the scanner could not read.
pub fn check_fits(kind: PacketKind, wire: &str, level: ErrorCorrection) -> Result<(), CapacityError> {
    let budget = level.byte_budget();
    if wire.len() > budget {
        return Err(CapacityError::Overflow {
            kind: kind.as_str(),
            size: wire.len(),
            budget,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stronger_correction_has_smaller_budget() {
        let levels = [
            ErrorCorrection::Low,
            ErrorCorrection::Medium,
            ErrorCorrection::Quartile,
            ErrorCorrection::High,
        ];
        for pair in levels.windows(2) {
            assert!(pair[0].byte_budget() > pair[1].byte_budget());
        }
    }

    #[test]
    fn overhead_counts_id_and_seq_width() {
        let narrow = data_overhead(8, 9);
        assert_eq!(data_overhead(16, 9), narrow + 8);
        assert_eq!(data_overhead(8, 99_999), narrow + 4);
        // {"v":1,"id":"xxxxxxxx","t":"d","seq":9,"data":""}
        assert_eq!(narrow, 49);
    }

    #[test]
    fn max_slice_leaves_margin() {
        let max = max_slice_len(ErrorCorrection::High, 32, 500).unwrap();
        let wire = Packet::data(&"a".repeat(32), 500, &"Z".repeat(max))
            .to_wire()
            .unwrap();
        assert_eq!(wire.len() + SAFETY_MARGIN, ErrorCorrection::High.byte_budget());
    }

    #[test]
    fn effective_size_is_clamped() {
        let max = max_slice_len(ErrorCorrection::Medium, 32, 100).unwrap();
        assert_eq!(effective_chunk_size(500, ErrorCorrection::Medium, 32, 100).unwrap(), 500);
        assert_eq!(effective_chunk_size(1, ErrorCorrection::Medium, 32, 100).unwrap(), MIN_CHUNK_SIZE);
        assert_eq!(
            effective_chunk_size(1_000_000, ErrorCorrection::Medium, 32, 100).unwrap(),
            max
        );
    }

    #[test]
    fn oversized_id_has_no_room() {
        let err = effective_chunk_size(100, ErrorCorrection::High, 2000, 1).unwrap_err();
        assert!(matches!(err, CapacityError::NoRoom { budget: 1200, .. }));
    }

    #[test]
    fn check_fits_rejects_overflow() {
        let wire = "x".repeat(1201);
        assert!(check_fits(PacketKind::Data, &wire, ErrorCorrection::Medium).is_ok());
        let err = check_fits(PacketKind::Data, &wire, ErrorCorrection::High).unwrap_err();
        assert_eq!(
            err,
            CapacityError::Overflow {
                kind: "data",
                size: 1201,
                budget: 1200
            }
        );
    }

    #[test]
    fn parses_levels() {
        assert_eq!("q".parse::<ErrorCorrection>().unwrap(), ErrorCorrection::Quartile);
        assert_eq!("High".parse::<ErrorCorrection>().unwrap(), ErrorCorrection::High);
        assert!("X".parse::<ErrorCorrection>().is_err());
    }
}
