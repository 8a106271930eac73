pub mod packet;

pub use packet::{CompressedHeader, PacketHeader};
