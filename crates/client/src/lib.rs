mod connection;
mod error;

pub use connection::{Client, ClientEvent};
pub use error::ClientError;
