//! Runtime configuration for [`super::scheduler`], read once by
//! [`super::scheduler::Scheduler::init`] and never mutated afterward.

/// Tunables for starting the scheduler. Unset fields fall back to the
/// defaults documented on each field.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads to spawn. `None` resolves to
    /// [`std::thread::available_parallelism`].
    pub worker_count: Option<usize>,
    /// Stack size for pooled fibers, in bytes. Defaults to 64 KiB,
    /// matching the original's hardcoded size.
    pub fiber_stack_size: usize,
    /// Whether a disabled backup worker thread is spawned at `init` time,
    /// ready to be toggled on later via `Scheduler::enable_backup_worker`.
    pub enable_backup_worker: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            fiber_stack_size: 64 * 1024,
            enable_backup_worker: false,
        }
    }
}

impl RuntimeConfig {
    /// Resolves `worker_count`, falling back to available parallelism.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Reads `JOBS_WORKER_COUNT` / `JOBS_FIBER_STACK_KB` / `JOBS_BACKUP_WORKER`
    /// over the defaults, for local experimentation and benchmarking.
    /// Not a supported protocol surface; production callers should
    /// construct [`RuntimeConfig`] directly.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("JOBS_WORKER_COUNT") {
            if let Ok(n) = v.parse() {
                cfg.worker_count = Some(n);
            }
        }
        if let Ok(v) = std::env::var("JOBS_FIBER_STACK_KB") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.fiber_stack_size = n * 1024;
            }
        }
        if let Ok(v) = std::env::var("JOBS_BACKUP_WORKER") {
            cfg.enable_backup_worker = matches!(v.as_str(), "1" | "true" | "yes");
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_leaves_worker_count_unset_and_picks_64kb_stacks() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.worker_count.is_none());
        assert_eq!(cfg.fiber_stack_size, 64 * 1024);
        assert!(!cfg.enable_backup_worker);
        assert!(cfg.resolved_worker_count() >= 1);
    }
}
