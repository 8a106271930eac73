mod compress;
pub mod conn;
pub mod stream;

pub use conn::Conn;
pub use stream::Stream;
