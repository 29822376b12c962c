//! Payload encoding and integrity check.
//!
//! The archive buffer travels as standard base64; the final packet carries an
//! additive checksum of the archive bytes (sum mod 65536, four lowercase hex digits).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::VerifyError;

/// Sum of all bytes modulo 65536, rendered as four lowercase hex digits.
pub fn checksum(bytes: &[u8]) -> String {
    let sum = bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    format!("{:04x}", sum)
}

/// Archive bytes to the text stream carried by data packets.
pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Reassembled text stream back to archive bytes.
pub fn decode_payload(encoded: &str) -> Result<Vec<u8>, VerifyError> {
    BASE64
        .decode(encoded)
        .map_err(|e| VerifyError::Decode(e.to_string()))
}

/// Check reassembled bytes against the handshake size and the final checksum.
pub fn verify(bytes: &[u8], declared_size: u64, expected: &str) -> Result<(), VerifyError> {
    let actual_size = bytes.len() as u64;
    if actual_size != declared_size {
        return Err(VerifyError::SizeMismatch {
            expected: declared_size,
            actual: actual_size,
        });
    }
    let actual = checksum(bytes);
    if actual != expected {
        return Err(VerifyError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps_at_16_bits() {
        assert_eq!(checksum(b""), "0000");
        assert_eq!(checksum(b"ABC"), "00c6"); // 65 + 66 + 67
        assert_eq!(checksum(&[0xFF; 257]), "ffff");
        assert_eq!(checksum(&[0xFF; 258]), "00fe");
        assert_eq!(checksum(&[1u8; 65536]), "0000");
    }

    #[test]
    fn verify_accepts_matching_payload() {
        let data = b"The quick brown fox";
        assert!(verify(data, data.len() as u64, &checksum(data)).is_ok());
    }

    #[test]
    fn verify_reports_size_before_checksum() {
        let err = verify(b"abc", 4, "ffff").unwrap_err();
        assert_eq!(err, VerifyError::SizeMismatch { expected: 4, actual: 3 });
    }

    #[test]
    fn verify_requires_exact_checksum_text() {
        let err = verify(b"ABC", 3, "00C6").unwrap_err();
        assert_eq!(
            err,
            VerifyError::ChecksumMismatch {
                expected: "00C6".into(),
                actual: "00c6".into()
            }
        );
    }

    #[test]
    fn payload_encoding_roundtrip() {
        let data: Vec<u8> = (0..=255u8).collect();
        let encoded = encode_payload(&data);
        assert!(encoded.is_ascii());
        assert_eq!(decode_payload(&encoded).unwrap(), data);
        assert!(matches!(decode_payload("***"), Err(VerifyError::Decode(_))));
    }
}
