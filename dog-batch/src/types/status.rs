use serde::{Deserialize, Serialize};

/// Persisted process status of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProcessStatus {
    /// Running normally (no status entry stored)
    #[default]
    None,
    /// Cancelled; the next pass deletes every batch
    Cancelled,
    /// Paused until explicitly resumed
    PausedNoTimeout,
    /// Paused; health checks resume it after half an interval
    PausedWithTimeout,
}

impl ProcessStatus {
    /// Stored integer code, `None` for the absent entry
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::Cancelled => Some(1),
            Self::PausedNoTimeout => Some(2),
            Self::PausedWithTimeout => Some(3),
        }
    }

    /// Parse a stored integer code; unknown codes read as `None`
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Cancelled,
            2 => Self::PausedNoTimeout,
            3 => Self::PausedWithTimeout,
            _ => Self::None,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::PausedNoTimeout | Self::PausedWithTimeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the drain loop must stop
    pub fn halts_processing(&self) -> bool {
        self.is_paused() || self.is_cancelled()
    }
}
