use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The stream is no longer usable as a packet transport. Carries the
    /// stage that detected it (header vs body, compressed vs plain).
    #[error("Connection is broken: {0}")]
    BadConn(&'static str),

    #[error("Invalid packet sequence {got}, expected {expected}")]
    SequenceMismatch { got: u8, expected: u8 },

    #[error("Invalid compressed packet sequence {got}, expected {expected}")]
    CompressedSequenceMismatch { got: u8, expected: u8 },

    #[error("Unsupported compression algorithm: {0:#04x}")]
    UnsupportedCompression(u8),

    #[error("Corrupt compressed frame body: {0}")]
    Decompress(std::io::Error),

    #[error("Malformed packet: {0}")]
    InvalidPacket(&'static str),

    #[error("Server public key is not a valid PKIX key: {0}")]
    InvalidPublicKey(#[from] rsa::pkcs8::spki::Error),

    #[error("Password encryption failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("A bug in strand-mysql: {0}")]
    LibraryBug(color_eyre::Report),
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl Error {
    /// Whether the transport must be closed after this error.
    ///
    /// Sequence and framing errors leave the stream position unknown; the
    /// upper layer must not retry on the same connection.
    pub fn is_conn_broken(&self) -> bool {
        matches!(
            self,
            Self::IoError(_)
                | Self::BadConn(_)
                | Self::SequenceMismatch { .. }
                | Self::CompressedSequenceMismatch { .. }
                | Self::Decompress(_)
        )
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Self::LibraryBug(color_eyre::eyre::eyre!("{:#?}", err))
    }
}
