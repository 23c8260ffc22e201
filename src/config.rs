//! Runtime settings shared by the controllers

use std::time::Duration;

/// Default interval between full resyncs of the operator config
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Settings resolved from the command line and environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Operand image; empty keeps the image from the DaemonSet manifest
    pub image_pull_spec: String,
    /// Release version stamped on the operand and reported as operator version
    pub release_version: String,
    pub resync_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_pull_spec: String::new(),
            release_version: String::new(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

impl Settings {
    pub fn new(image_pull_spec: impl Into<String>, release_version: impl Into<String>) -> Self {
        Self {
            image_pull_spec: image_pull_spec.into(),
            release_version: release_version.into(),
            ..Default::default()
        }
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }
}
