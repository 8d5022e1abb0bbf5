pub mod apps;
pub mod auth;
pub mod message;
pub mod rooms;
pub mod streaming;
pub mod types;

pub use apps::*;
pub use auth::*;
pub use message::*;
pub use rooms::*;
pub use streaming::*;
pub use types::*;
