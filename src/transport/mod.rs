//! Transport module - the byte stream the engine sends to and reads from.

mod tcp;

pub use tcp::TcpTransport;
