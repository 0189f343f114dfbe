// Poll task kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a poll task samples. `Stats` and `Logs` target one container; the rest are host-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollKind {
    System,
    Status,
    Metrics,
    Stats,
    Logs,
}

impl PollKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PollKind::System => "system",
            PollKind::Status => "status",
            PollKind::Metrics => "metrics",
            PollKind::Stats => "stats",
            PollKind::Logs => "logs",
        }
    }
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
