pub mod agent;
pub mod apps;
pub mod screen;

pub use agent::{StudentAgent, StudentConfig, StudentEvent};
pub use apps::{RunningApps, StaticApps};
pub use screen::{LocalScreenShare, ScreenShare};
