use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

#[cfg(feature = "tls")]
use native_tls::TlsStream;

/// Read-side buffer for plaintext transports. 64 KiB keeps header reads and
/// small payloads off the syscall path.
const READ_BUFFER_SIZE: usize = 65536;

/// The byte stream under the packet codec.
///
/// Plaintext transports read through a 64 KiB buffer. The TLS transport is
/// deliberately unbuffered: a buffer installed in front of the TLS record
/// layer would swallow bytes belonging to the TLS handshake (the server's
/// records after our SSLRequest) and deadlock it, so TLS drains its own
/// records directly.
pub enum Stream {
    Tcp(BufReader<TcpStream>),
    #[cfg(feature = "tls")]
    Tls(TlsStream<TcpStream>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::with_capacity(READ_BUFFER_SIZE, stream))
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::with_capacity(READ_BUFFER_SIZE, stream))
    }

    #[cfg(feature = "tls")]
    pub fn upgrade_to_tls(self, host: &str) -> std::io::Result<Self> {
        let tcp = match self {
            Self::Tcp(buf_reader) => buf_reader.into_inner(),
            Self::Tls(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "Already using TLS",
                ));
            }
            Self::Unix(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "TLS not supported for Unix sockets",
                ));
            }
        };

        let connector = native_tls::TlsConnector::new()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let tls_stream = connector
            .connect(host, tcp)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        Ok(Self::Tls(tls_stream))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(r) => r.read(buf),
            #[cfg(feature = "tls")]
            Self::Tls(r) => r.read(buf),
            Self::Unix(r) => r.read(buf),
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.read_exact(buf),
            #[cfg(feature = "tls")]
            Self::Tls(r) => r.read_exact(buf),
            Self::Unix(r) => r.read_exact(buf),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_mut().write_all(buf),
            #[cfg(feature = "tls")]
            Self::Tls(r) => r.write_all(buf),
            Self::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_mut().flush(),
            #[cfg(feature = "tls")]
            Self::Tls(r) => r.flush(),
            Self::Unix(r) => r.get_mut().flush(),
        }
    }

    pub fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(r) => r.get_ref().shutdown(std::net::Shutdown::Both),
            #[cfg(feature = "tls")]
            Self::Tls(r) => r.shutdown(),
            Self::Unix(r) => r.get_ref().shutdown(std::net::Shutdown::Both),
        }
    }
}
