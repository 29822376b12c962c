//! Packet format for the optical link.
//!
//! Every scanned code carries exactly one packet, serialized as compact JSON:
//!
//! ```text
//! {"v":1,"id":"<file id>","t":"h","name":"<pct>","size":123,"total":4,"zip":true,"orig":"<pct>"}
//! {"v":1,"id":"<file id>","t":"d","seq":1,"data":"<base64 slice>"}
//! {"v":1,"id":"<file id>","t":"f","checksum":"1a2b"}
//! ```
//!
//! Archive names are percent-encoded on the wire and plain strings in memory.
//! `orig` is only present when the archive wraps a single original file.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PacketError;

/// Protocol version spoken by this implementation. Peers must match exactly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on the chunk count a handshake may announce.
pub const MAX_TOTAL_CHUNKS: u32 = 100_000;

/// A decoded packet: common header plus one of three bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "id")]
    pub file_id: String,
    #[serde(flatten)]
    pub body: PacketBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum PacketBody {
    #[serde(rename = "h")]
    Handshake {
        #[serde(with = "percent")]
        name: String,
        size: u64,
        total: u32,
        zip: bool,
        #[serde(
            rename = "orig",
            default,
            skip_serializing_if = "Option::is_none",
            with = "percent_opt"
        )]
        original_name: Option<String>,
    },
    #[serde(rename = "d")]
    Data { seq: u32, data: String },
    #[serde(rename = "f")]
    Final { checksum: String },
}

/// Packet kind without its payload, for logging and capacity planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Handshake,
    Data,
    Final,
}

impl PacketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Data => "data",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Packet {
    pub fn handshake(
        file_id: &str,
        archive_name: &str,
        size: u64,
        total: u32,
        original_name: Option<&str>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            file_id: file_id.to_string(),
            body: PacketBody::Handshake {
                name: archive_name.to_string(),
                size,
                total,
                zip: true,
                original_name: original_name.map(str::to_string),
            },
        }
    }

    pub fn data(file_id: &str, seq: u32, data: &str) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            file_id: file_id.to_string(),
            body: PacketBody::Data {
                seq,
                data: data.to_string(),
            },
        }
    }

    pub fn final_packet(file_id: &str, checksum: &str) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            file_id: file_id.to_string(),
            body: PacketBody::Final {
                checksum: checksum.to_string(),
            },
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self.body {
            PacketBody::Handshake { .. } => PacketKind::Handshake,
            PacketBody::Data { .. } => PacketKind::Data,
            PacketBody::Final { .. } => PacketKind::Final,
        }
    }

    /// Sequence number of a data packet.
    pub fn seq(&self) -> Option<u32> {
        match self.body {
            PacketBody::Data { seq, .. } => Some(seq),
            _ => None,
        }
    }

    /// Serialize to the string handed to the optical encoder.
    pub fn to_wire(&self) -> Result<String, PacketError> {
        serde_json::to_string(self).map_err(|e| PacketError::Encode(e.to_string()))
    }

    /// Parse a scanned string.
    ///
    /// The version is checked before the body so that a packet from a newer
    /// peer is reported as [`PacketError::Version`] even when its layout changed.
    pub fn from_wire(raw: &str) -> Result<Self, PacketError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| PacketError::Structure(format!("not JSON: {}", e)))?;

        let version = value
            .get("v")
            .and_then(Value::as_i64)
            .ok_or_else(|| PacketError::Structure("missing integer field \"v\"".into()))?;
        if version != PROTOCOL_VERSION as i64 {
            return Err(PacketError::Version {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }

        let packet: Packet =
            serde_json::from_value(value).map_err(|e| PacketError::Structure(e.to_string()))?;
        packet.validate()?;
        Ok(packet)
    }

    /// Field constraints serde cannot express.
    fn validate(&self) -> Result<(), PacketError> {
        if self.file_id.is_empty() {
            return Err(PacketError::Structure("empty file id".into()));
        }
        match &self.body {
            PacketBody::Handshake { zip, total, .. } => {
                if !zip {
                    return Err(PacketError::Structure("handshake must set zip=true".into()));
                }
                if *total > MAX_TOTAL_CHUNKS {
                    return Err(PacketError::Structure(format!(
                        "total {} exceeds {}",
                        total, MAX_TOTAL_CHUNKS
                    )));
                }
            }
            PacketBody::Data { seq, data } => {
                if *seq == 0 {
                    return Err(PacketError::Structure("sequence numbers start at 1".into()));
                }
                // Data packets only exist when total > 0, and then every slice is non-empty.
                if data.is_empty() {
                    return Err(PacketError::Structure(format!("data packet {} is empty", seq)));
                }
            }
            PacketBody::Final { checksum } => {
                if checksum.is_empty() {
                    return Err(PacketError::Structure("empty checksum".into()));
                }
            }
        }
        Ok(())
    }
}

/// Characters left as-is when percent-encoding names: the unreserved URI set.
const NAME_SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_name(name: &str) -> String {
    percent_encoding::utf8_percent_encode(name, NAME_SET).to_string()
}

fn decode_name(raw: &str) -> Result<String, std::str::Utf8Error> {
    percent_encoding::percent_decode_str(raw)
        .decode_utf8()
        .map(|name| name.into_owned())
}

mod percent {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(name: &str, serializer: S) -> Result<S::Ok, S::Error> {
        super::encode_name(name).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::decode_name(&raw).map_err(serde::de::Error::custom)
    }
}

mod percent_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(name: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match name {
            Some(name) => serializer.serialize_some(&super::encode_name(name)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::decode_name(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_wire_shape() {
        let pkt = Packet::handshake("f1", "my file.zip", 120, 3, None);
        let wire = pkt.to_wire().unwrap();
        assert!(wire.contains(r#""t":"h""#));
        assert!(wire.contains(r#""name":"my%20file.zip""#));
        assert!(wire.contains(r#""zip":true"#));
        assert!(!wire.contains("orig"));
        assert_eq!(Packet::from_wire(&wire).unwrap(), pkt);
    }

    #[test]
    fn handshake_original_name_is_percent_encoded() {
        let pkt = Packet::handshake("f1", "a.zip", 1, 1, Some("résumé (v2).pdf"));
        let wire = pkt.to_wire().unwrap();
        assert!(wire.contains(r#""orig":"r%C3%A9sum%C3%A9%20(v2).pdf""#));
        let parsed = Packet::from_wire(&wire).unwrap();
        match parsed.body {
            PacketBody::Handshake { original_name, .. } => {
                assert_eq!(original_name.as_deref(), Some("résumé (v2).pdf"));
            }
            other => panic!("expected handshake, got {:?}", other),
        }
    }

    #[test]
    fn data_and_final_parse() {
        let data = Packet::from_wire(r#"{"v":1,"id":"x","t":"d","seq":2,"data":"QUJD"}"#).unwrap();
        assert_eq!(data.kind(), PacketKind::Data);
        assert_eq!(data.seq(), Some(2));

        let fin = Packet::from_wire(r#"{"v":1,"id":"x","t":"f","checksum":"00c6"}"#).unwrap();
        assert_eq!(fin, Packet::final_packet("x", "00c6"));
    }

    #[test]
    fn version_checked_before_structure() {
        let err = Packet::from_wire(r#"{"v":2,"id":"x","t":"zz"}"#).unwrap_err();
        assert_eq!(
            err,
            PacketError::Version {
                found: 2,
                expected: PROTOCOL_VERSION
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn rejects_malformed_structure() {
        let cases = [
            "not json at all",
            r#"{"id":"x","t":"f","checksum":"0001"}"#,
            r#"{"v":"1","id":"x","t":"f","checksum":"0001"}"#,
            r#"{"v":1,"id":"x","t":"q"}"#,
            r#"{"v":1,"id":"x","t":"d","seq":"one","data":"QQ=="}"#,
            r#"{"v":1,"id":"x","t":"d","seq":0,"data":"QQ=="}"#,
            r#"{"v":1,"id":"x","t":"d","seq":1,"data":""}"#,
            r#"{"v":1,"id":"","t":"f","checksum":"0001"}"#,
            r#"{"v":1,"id":"x","t":"f","checksum":""}"#,
            r#"{"v":1,"id":"x","t":"h","name":"a","size":1,"total":1,"zip":false}"#,
            r#"{"v":1,"id":"x","t":"h","name":"a","size":-1,"total":1,"zip":true}"#,
            r#"{"v":1,"id":"x","t":"h","name":"%FF","size":1,"total":1,"zip":true}"#,
            r#"{"v":1,"id":"x","t":"h","name":"a","size":1,"total":4000000000,"zip":true}"#,
        ];
        for raw in cases {
            let err = Packet::from_wire(raw).unwrap_err();
            assert!(
                matches!(err, PacketError::Structure(_)),
                "{} gave {:?}",
                raw,
                err
            );
            assert!(!err.is_fatal());
        }
    }

    #[test]
    fn zero_total_handshake_is_valid() {
        let pkt = Packet::handshake("f", "empty.zip", 0, 0, None);
        let parsed = Packet::from_wire(&pkt.to_wire().unwrap()).unwrap();
        assert_eq!(parsed, pkt);
    }
}
