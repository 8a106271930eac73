//! Packet framing and transport for the MySQL wire protocol.
//!
//! Turns a reliable byte stream (TCP, TLS or Unix socket) into a
//! bidirectional sequence of MySQL packets: 16 MiB split/reassembly,
//! optional zlib/zstd stream compression, and the sequence-number state
//! machines of both framing layers. Handshake, command dispatch and
//! resultset handling live in the layers above.

pub mod auth;
mod buffer_pool;
pub mod constant;
pub mod error;
pub mod protocol;
pub mod sync;

pub use buffer_pool::{BufferPool, GLOBAL_BUFFER_POOL, PooledBuffer};
pub use constant::{CapabilityFlags, Compression};
pub use sync::{Conn, Stream};
