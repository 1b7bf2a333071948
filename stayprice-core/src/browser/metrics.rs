use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub sessions_created: u64,
    pub creation_failures: u64,
    pub rotations: u64,
    pub connection_losses: u64,
    pub searches_run: u64,
}

impl SessionMetrics {
    pub fn record_session_created(&mut self) {
        self.sessions_created = self.sessions_created.saturating_add(1);
    }

    pub fn record_creation_failure(&mut self) {
        self.creation_failures = self.creation_failures.saturating_add(1);
    }

    pub fn record_rotation(&mut self) {
        self.rotations = self.rotations.saturating_add(1);
    }

    pub fn record_connection_loss(&mut self) {
        self.connection_losses = self.connection_losses.saturating_add(1);
    }

    pub fn record_search(&mut self) {
        self.searches_run = self.searches_run.saturating_add(1);
    }

    pub fn searches_per_session(&self) -> f64 {
        if self.sessions_created == 0 {
            0.0
        } else {
            self.searches_run as f64 / self.sessions_created as f64
        }
    }
}
