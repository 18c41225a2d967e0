use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::warn;

/// Reports resident memory of the current process
pub trait MemoryProbe: Send + Sync {
    /// Bytes in use, `None` when unknown
    fn used_bytes(&self) -> Option<u64>;

    /// Ceiling to use when none is configured
    fn total_bytes(&self) -> Option<u64>;
}

/// Memory probe backed by `sysinfo`
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = %e, "Cannot resolve current pid, memory checks disabled");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn used_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }

    fn total_bytes(&self) -> Option<u64> {
        let mut system = self.system.lock();
        system.refresh_memory();
        match system.total_memory() {
            0 => None,
            total => Some(total),
        }
    }
}

/// Probe returning fixed figures
#[derive(Debug, Default)]
pub struct FixedProbe {
    pub used: Option<u64>,
    pub total: Option<u64>,
}

impl MemoryProbe for FixedProbe {
    fn used_bytes(&self) -> Option<u64> {
        self.used
    }

    fn total_bytes(&self) -> Option<u64> {
        self.total
    }
}

/// Whether usage has reached `threshold` of the ceiling.
///
/// Unknown usage or ceiling never counts as exceeded.
pub fn memory_exceeded(
    probe: &dyn MemoryProbe,
    ceiling: Option<u64>,
    threshold: f64,
) -> bool {
    let Some(limit) = ceiling.or_else(|| probe.total_bytes()) else {
        return false;
    };
    let Some(used) = probe.used_bytes() else {
        return false;
    };
    used as f64 >= limit as f64 * threshold
}
