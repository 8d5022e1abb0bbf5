pub mod network;
pub mod viewer;

pub use network::{NetworkManager, TeacherCommand, TeacherEvent};
pub use viewer::{LoggingViewer, Viewer};
