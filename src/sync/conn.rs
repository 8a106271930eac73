use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use tracing::{instrument, trace};
use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::auth;
use crate::buffer_pool::{GLOBAL_BUFFER_POOL, TOO_BIG_BLOCK_SIZE};
use crate::constant::{Compression, MAX_PAYLOAD_LEN, MIN_COMPRESS_LENGTH};
use crate::error::{Error, Result};
use crate::protocol::packet::{COMPRESSED_HEADER_LEN, CompressedHeader, PacketHeader};

use super::compress::{CompressedReader, compress_into};
use super::stream::Stream;

/// Largest slice of a fragment carried by one compressed frame. 64 KiB
/// under the 24-bit ceiling, far more than the worst-case expansion of
/// either algorithm on incompressible input.
const MAX_COMPRESSED_CHUNK: usize = MAX_PAYLOAD_LEN - 0xFFFF;

/// A byte stream framed into MySQL protocol packets.
///
/// `Conn` owns the stream and both sequence counters. Payloads larger than
/// 16 MiB - 1 are split into fragments on write and reassembled on read;
/// when compression is negotiated, fragments additionally travel inside
/// compressed frames with their own sequence numbering. Callers above never
/// see fragments or frames, only whole payloads.
///
/// At most one reader and one writer may act on a `Conn` at a time; the
/// upper layer serializes access per direction.
pub struct Conn {
    stream: Stream,

    /// Next expected/emitted packet sequence number.
    seq: u8,

    compression: Compression,

    /// Next expected/emitted compressed frame sequence number.
    cseq: u8,

    /// Decompressor scoped to the compressed frame currently being read.
    /// `None` while no frame is open or the open frame is literal.
    compressed_reader: Option<CompressedReader>,

    /// Whether a compressed-frame read context is installed. Kept separate
    /// from `compressed_reader` because a frame with uncompressed length 0
    /// installs a context without a decompressor; without this flag the
    /// next read would misparse the literal body as a fresh frame header.
    compressed_reader_active: bool,
}

impl Conn {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            seq: 0,
            compression: Compression::None,
            cseq: 0,
            compressed_reader: None,
            compressed_reader_active: false,
        }
    }

    /// Install the negotiated compression mode.
    ///
    /// Called once by the handshake layer before the first command-phase
    /// packet; never changed mid-connection.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn sequence(&self) -> u8 {
        self.seq
    }

    pub fn compressed_sequence(&self) -> u8 {
        self.cseq
    }

    /// Read one logical packet into a fresh buffer.
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        self.read_packet_reuse_mem(Vec::new())
    }

    /// Read one logical packet, appending to `dst`.
    ///
    /// The payload is staged in a pooled buffer; large payloads are handed
    /// back directly instead of being copied and pooled.
    #[instrument(skip_all)]
    pub fn read_packet_reuse_mem(&mut self, mut dst: Vec<u8>) -> Result<Vec<u8>> {
        let mut buf = GLOBAL_BUFFER_POOL.get();
        self.read_packet_to(&mut buf)?;

        if dst.is_empty() && buf.len() > TOO_BIG_BLOCK_SIZE {
            return Ok(buf.into_inner());
        }
        dst.extend_from_slice(buf.as_slice());
        Ok(dst)
    }

    /// Read one logical packet into `out`, concatenating fragments until
    /// the first one shorter than [`MAX_PAYLOAD_LEN`].
    pub fn read_packet_to(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.compression.is_enabled() && !self.compressed_reader_active {
            self.compressed_reader = self.open_compressed_frame()?;
            self.compressed_reader_active = true;
        }

        loop {
            // The header itself may straddle compressed frames, so it goes
            // through the same packet reader as the body.
            let mut header = PacketHeader::new_zeroed();
            self.read_exact_packet(header.as_mut_bytes())?;

            let length = header.length();
            if header.sequence_id != self.seq {
                return Err(Error::SequenceMismatch {
                    got: header.sequence_id,
                    expected: self.seq,
                });
            }
            self.seq = self.seq.wrapping_add(1);

            self.copy_n(out, length)?;

            if header.is_final_fragment() {
                return Ok(());
            }
        }
    }

    /// Open a compressed-frame read context: parse the 7-byte frame header
    /// and build a decompressor over the frame body.
    ///
    /// Returns `None` for a literal frame (uncompressed length 0); its body
    /// is consumed directly from the raw stream by subsequent reads. The
    /// frame counter is checked here but only advanced at frame exhaustion.
    fn open_compressed_frame(&mut self) -> Result<Option<CompressedReader>> {
        let mut header = CompressedHeader::new_zeroed();
        self.stream.read_exact(header.as_mut_bytes())?;

        if header.sequence_id != self.cseq {
            return Err(Error::CompressedSequenceMismatch {
                got: header.sequence_id,
                expected: self.cseq,
            });
        }

        let compressed_length = header.compressed_length();
        let uncompressed_length = header.uncompressed_length();
        trace!(
            compressed_length,
            uncompressed_length,
            cseq = self.cseq,
            "opening compressed frame"
        );

        if uncompressed_length == 0 {
            return Ok(None);
        }

        let mut body = GLOBAL_BUFFER_POOL.get();
        body.resize(compressed_length, 0);
        self.stream.read_exact(body.as_mut_slice())?;

        CompressedReader::new(self.compression, body).map(Some)
    }

    /// One read from the current packet reader: the frame decompressor when
    /// one is installed, the raw stream otherwise.
    ///
    /// A decompressor hitting end-of-input mid-packet means the packet
    /// continues in the next compressed frame: advance the frame counter,
    /// open the next frame and keep going. The raw stream hitting EOF is
    /// fatal. Never opens a frame eagerly — exhaustion is only observed
    /// when more bytes are actually needed.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.compressed_reader.as_mut() {
                Some(reader) => {
                    let n = reader.read(buf)?;
                    if n > 0 {
                        return Ok(n);
                    }
                }
                None => {
                    let n = self.stream.read(buf)?;
                    if n == 0 {
                        return Err(Error::BadConn("unexpected end of stream"));
                    }
                    return Ok(n);
                }
            }

            self.cseq = self.cseq.wrapping_add(1);
            self.compressed_reader = self.open_compressed_frame()?;
        }
    }

    /// Fill `buf` exactly from the current packet reader.
    fn read_exact_packet(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.read_some(buf)?;
            let rest = std::mem::take(&mut buf);
            buf = &mut rest[n..];
        }
        Ok(())
    }

    /// Move exactly `n` uncompressed bytes from the current packet reader
    /// into `out`, transparently crossing frame boundaries.
    fn copy_n(&mut self, out: &mut Vec<u8>, n: usize) -> Result<()> {
        let start = out.len();
        out.resize(start + n, 0);

        let mut filled = start;
        while filled < start + n {
            let read = self.read_some(&mut out[filled..])?;
            filled += read;
        }
        Ok(())
    }

    /// Write one logical packet.
    ///
    /// `data` starts with a caller-reserved 4-byte header slot which is
    /// overwritten in place; for payloads beyond [`MAX_PAYLOAD_LEN`] the
    /// header slot of each subsequent fragment overwrites the tail of the
    /// already-written previous fragment. A payload that is an exact
    /// multiple of [`MAX_PAYLOAD_LEN`] ends with a mandatory zero-length
    /// fragment.
    #[instrument(skip_all)]
    pub fn write_packet(&mut self, mut data: &mut [u8]) -> Result<()> {
        if data.len() < 4 {
            return Err(Error::InvalidPacket("missing the 4-byte header slot"));
        }

        if self.compression.is_enabled() {
            // Frames of this packet start a fresh run.
            self.cseq = 0;
        }

        loop {
            let body_len = data.len() - 4;
            let fragment_len = body_len.min(MAX_PAYLOAD_LEN);
            PacketHeader::mut_from_bytes(&mut data[..4])?.encode_in_place(fragment_len, self.seq);

            match self.compression {
                Compression::None => self.stream.write_all(&data[..4 + fragment_len])?,
                Compression::Zlib | Compression::Zstd => {
                    self.write_compressed_fragment(&data[..4 + fragment_len])?;
                }
            }
            self.seq = self.seq.wrapping_add(1);

            if fragment_len < MAX_PAYLOAD_LEN {
                break;
            }
            let rest = std::mem::take(&mut data);
            data = &mut rest[MAX_PAYLOAD_LEN..];
        }

        if self.compression.is_enabled() {
            // The peer's next frames answer this packet; drop any stale
            // read context and start the counter over.
            self.compressed_reader = None;
            self.compressed_reader_active = false;
            self.cseq = 0;
        }

        self.stream.flush()?;
        Ok(())
    }

    /// Wrap one fragment in compressed frames and write them out.
    ///
    /// Both length fields of a frame header are 24-bit, so a full-size
    /// fragment (4-byte header + 16 MiB - 1 body) cannot ride in a single
    /// frame; it is split at the frame layer. The reader reassembles
    /// transparently since packets may straddle frames anyway. The chunk
    /// cap leaves a margin under 2^24 - 1 so even a chunk that deflate or
    /// zstd cannot shrink still fits the compressed-length field.
    fn write_compressed_fragment(&mut self, fragment: &[u8]) -> Result<()> {
        for chunk in fragment.chunks(MAX_COMPRESSED_CHUNK) {
            self.write_compressed_frame(chunk)?;
        }
        Ok(())
    }

    /// Write one compressed frame.
    ///
    /// Chunks of [`MIN_COMPRESS_LENGTH`] bytes or fewer go out literal
    /// (uncompressed length 0); compressing them would grow them. A small
    /// chunk is necessarily the last frame of its packet, which is the only
    /// place a literal frame is readable: the receiving side cannot detect
    /// the end of a literal body mid-packet.
    fn write_compressed_frame(&mut self, chunk: &[u8]) -> Result<()> {
        let mut frame = GLOBAL_BUFFER_POOL.get();
        frame.resize(COMPRESSED_HEADER_LEN, 0);

        let uncompressed_length = if chunk.len() > MIN_COMPRESS_LENGTH {
            compress_into(self.compression, chunk, &mut frame)?;
            chunk.len()
        } else {
            frame.extend_from_slice(chunk);
            0
        };
        let compressed_length = frame.len() - COMPRESSED_HEADER_LEN;

        CompressedHeader::mut_from_bytes(&mut frame.as_mut_slice()[..COMPRESSED_HEADER_LEN])?
            .encode_in_place(compressed_length, self.cseq, uncompressed_length);
        trace!(
            compressed_length,
            uncompressed_length,
            cseq = self.cseq,
            "writing compressed frame"
        );
        self.cseq = self.cseq.wrapping_add(1);

        // Header and body leave in a single stream write.
        self.stream.write_all(frame.as_slice())?;
        Ok(())
    }

    /// Clear-text password packet: password bytes plus a NUL terminator.
    pub fn write_clear_auth_packet(&mut self, password: &str) -> Result<()> {
        let mut data = Vec::with_capacity(4 + password.len() + 1);
        data.extend_from_slice(&[0_u8; 4]);
        data.extend_from_slice(password.as_bytes());
        data.push(0);
        self.write_packet(&mut data)
    }

    /// Auth-switch response: the plugin-computed auth data, optionally
    /// NUL-terminated.
    pub fn write_auth_switch_packet(&mut self, auth_data: &[u8], add_nul: bool) -> Result<()> {
        let mut data = Vec::with_capacity(4 + auth_data.len() + usize::from(add_nul));
        data.extend_from_slice(&[0_u8; 4]);
        data.extend_from_slice(auth_data);
        if add_nul {
            data.push(0);
        }
        self.write_packet(&mut data)
    }

    /// caching_sha2_password full authentication: request the server's RSA
    /// public key, then send the XOR-masked password encrypted under it.
    #[instrument(skip_all)]
    pub fn write_public_key_auth_packet(&mut self, password: &str, cipher: &[u8]) -> Result<()> {
        // 0x02 asks the server for its public key
        let mut data = vec![0_u8; 5];
        data[4] = 0x02;
        self.write_packet(&mut data)?;

        let payload = self.read_packet()?;
        if payload.len() < 2 {
            return Err(Error::InvalidPacket("public key payload is too short"));
        }
        let pem = simdutf8::basic::from_utf8(&payload[1..])
            .map_err(|_| Error::InvalidPacket("public key PEM is not UTF-8"))?;
        let key = RsaPublicKey::from_public_key_pem(pem)?;

        let encrypted = auth::encrypt_password(password, cipher, &key)?;
        let mut response = Vec::with_capacity(4 + encrypted.len());
        response.extend_from_slice(&[0_u8; 4]);
        response.extend_from_slice(&encrypted);
        self.write_packet(&mut response)
    }

    /// Send the password encrypted under an already-known server key as an
    /// auth-switch response.
    pub fn write_encrypted_password(
        &mut self,
        password: &str,
        seed: &[u8],
        key: &RsaPublicKey,
    ) -> Result<()> {
        let encrypted = auth::encrypt_password(password, seed, key)?;
        self.write_auth_switch_packet(&encrypted, false)
    }

    /// Reset both sequence counters for the next command cycle.
    ///
    /// Also drops any compressed read context: the frame counter and the
    /// frame scope are bound to the cycle that just ended.
    pub fn reset_sequence(&mut self) {
        self.seq = 0;
        self.cseq = 0;
        self.compressed_reader = None;
        self.compressed_reader_active = false;
    }

    /// Close the underlying stream. Counters are zeroed so a half-closed
    /// connection cannot be mistaken for a usable one.
    pub fn close(&mut self) -> Result<()> {
        self.seq = 0;
        self.cseq = 0;
        self.compressed_reader = None;
        self.compressed_reader_active = false;
        self.stream.shutdown()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::os::unix::net::UnixStream;

    use super::*;

    fn conn_pair(compression: Compression) -> (Conn, Conn) {
        let (a, b) = UnixStream::pair().unwrap();
        let mut left = Conn::new(Stream::unix(a));
        let mut right = Conn::new(Stream::unix(b));
        left.set_compression(compression);
        right.set_compression(compression);
        (left, right)
    }

    fn conn_with_raw_peer(compression: Compression) -> (Conn, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        let mut conn = Conn::new(Stream::unix(a));
        conn.set_compression(compression);
        (conn, b)
    }

    #[test]
    fn write_clears_compressed_read_state() {
        let (mut writer, mut reader) = conn_pair(Compression::Zlib);

        let payload = vec![0x41_u8; 600];
        let mut data = vec![0_u8; 4];
        data.extend_from_slice(&payload);
        writer.write_packet(&mut data).unwrap();

        assert_eq!(writer.compressed_sequence(), 0);
        assert!(!writer.compressed_reader_active);
        assert!(writer.compressed_reader.is_none());
        assert_eq!(writer.sequence(), 1);

        assert_eq!(reader.read_packet().unwrap(), payload);
        assert_eq!(reader.sequence(), 1);
    }

    #[test]
    fn literal_frame_installs_context_without_decompressor() {
        let (mut conn, mut peer) = conn_with_raw_peer(Compression::Zstd);

        // Literal frame: C=6, cseq=0, U=0, body = packet header + "ok"
        peer.write_all(&[0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .unwrap();
        peer.write_all(&[0x02, 0x00, 0x00, 0x00, b'o', b'k']).unwrap();

        assert_eq!(conn.read_packet().unwrap(), b"ok");
        assert!(conn.compressed_reader_active);
        assert!(conn.compressed_reader.is_none());
        assert_eq!(conn.compressed_sequence(), 0);
    }

    #[test]
    fn raw_eof_is_a_broken_connection() {
        let (mut conn, peer) = conn_with_raw_peer(Compression::None);
        drop(peer);
        assert!(conn.read_packet().unwrap_err().is_conn_broken());
    }

    #[test]
    fn short_header_slot_is_rejected() {
        let (mut conn, _peer) = conn_with_raw_peer(Compression::None);
        let mut data = [0_u8; 3];
        assert!(matches!(
            conn.write_packet(&mut data),
            Err(Error::InvalidPacket(_))
        ));
    }
}
