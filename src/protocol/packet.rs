use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::MAX_PAYLOAD_LEN;

/// Size of the compressed frame header on the wire.
pub const COMPRESSED_HEADER_LEN: usize = 7;

/// MySQL packet header (zero-copy)
///
/// Layout matches MySQL wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Overwrite the header bytes in place (the caller-reserved 4-byte slot
    /// at the front of an outgoing fragment).
    pub fn encode_in_place(&mut self, length: usize, sequence_id: u8) {
        let len = u32::to_le_bytes(length as u32);
        self.length = [len[0], len[1], len[2]];
        self.sequence_id = sequence_id;
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }

    /// Whether this fragment terminates its logical packet.
    pub fn is_final_fragment(&self) -> bool {
        self.length() < MAX_PAYLOAD_LEN
    }
}

/// Compressed frame header (zero-copy)
///
/// Layout:
/// - compressed_length: 3 bytes (little-endian, bytes on the wire)
/// - sequence_id: 1 byte (compressed-layer counter, independent of the
///   packet-layer counter)
/// - uncompressed_length: 3 bytes (little-endian; 0 means the body is
///   literal, not compressed)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct CompressedHeader {
    pub compressed_length: [u8; 3],
    pub sequence_id: u8,
    pub uncompressed_length: [u8; 3],
}

impl CompressedHeader {
    pub fn encode_in_place(
        &mut self,
        compressed_length: usize,
        sequence_id: u8,
        uncompressed_length: usize,
    ) {
        let clen = u32::to_le_bytes(compressed_length as u32);
        let ulen = u32::to_le_bytes(uncompressed_length as u32);
        self.compressed_length = [clen[0], clen[1], clen[2]];
        self.sequence_id = sequence_id;
        self.uncompressed_length = [ulen[0], ulen[1], ulen[2]];
    }

    pub fn compressed_length(&self) -> usize {
        u32::from_le_bytes([
            self.compressed_length[0],
            self.compressed_length[1],
            self.compressed_length[2],
            0,
        ]) as usize
    }

    pub fn uncompressed_length(&self) -> usize {
        u32::from_le_bytes([
            self.uncompressed_length[0],
            self.uncompressed_length[1],
            self.uncompressed_length[2],
            0,
        ]) as usize
    }
}
