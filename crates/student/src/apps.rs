use shared::protocol::ProcessInfo;

/// Local process/window enumeration boundary. The agent only needs a
/// point-in-time list of (process name, window title) pairs.
pub trait RunningApps: Send + Sync {
    fn snapshot(&self) -> Vec<ProcessInfo>;
}

/// Fixed list, for headless demos and tests.
pub struct StaticApps {
    apps: Vec<ProcessInfo>,
}

impl StaticApps {
    pub fn new(apps: Vec<ProcessInfo>) -> Self {
        Self { apps }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(process_name, main_window_title)| ProcessInfo {
                    process_name: process_name.to_string(),
                    main_window_title: main_window_title.to_string(),
                })
                .collect(),
        )
    }
}

impl RunningApps for StaticApps {
    fn snapshot(&self) -> Vec<ProcessInfo> {
        self.apps.clone()
    }
}
