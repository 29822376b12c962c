use serde::{Deserialize, Serialize};

use crate::packet::{Packet, PacketBody};

/// One transfer attempt, identified by `file_id`.
///
/// Created by the sender when an archive is loaded and by the receiver when
/// it adopts a handshake. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSession {
    pub file_id: String,
    pub total_data_chunks: u32,
    pub archive_size: u64,
    pub archive_name: String,
    pub original_filename: Option<String>,
}

impl TransferSession {
    /// Builds the session a handshake packet announces. `None` for data/final packets.
    pub fn from_handshake(packet: &Packet) -> Option<Self> {
        match &packet.body {
            PacketBody::Handshake {
                name,
                size,
                total,
                original_name,
                ..
            } => Some(Self {
                file_id: packet.file_id.clone(),
                total_data_chunks: *total,
                archive_size: *size,
                archive_name: name.clone(),
                original_filename: original_name.clone(),
            }),
            _ => None,
        }
    }

    /// The handshake packet announcing this session.
    pub fn handshake(&self) -> Packet {
        Packet::handshake(
            &self.file_id,
            &self.archive_name,
            self.archive_size,
            self.total_data_chunks,
            self.original_filename.as_deref(),
        )
    }

    /// Handshake + data + final.
    pub fn total_steps(&self) -> usize {
        self.total_data_chunks as usize + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_roundtrips_through_session() {
        let session = TransferSession {
            file_id: "abc".into(),
            total_data_chunks: 7,
            archive_size: 900,
            archive_name: "bundle.zip".into(),
            original_filename: Some("report.pdf".into()),
        };
        let packet = session.handshake();
        assert_eq!(TransferSession::from_handshake(&packet), Some(session.clone()));
        assert_eq!(session.total_steps(), 9);
    }

    #[test]
    fn data_packet_is_not_a_session() {
        let packet = Packet::data("abc", 1, "QUJD");
        assert!(TransferSession::from_handshake(&packet).is_none());
    }
}
