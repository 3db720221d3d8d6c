pub mod codec;
pub mod connection;
pub mod protocol;

pub use connection::Connection;
pub use protocol::Command;
