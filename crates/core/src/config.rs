// crates/core/src/config.rs
//! Registry configuration, resolved from the environment.

/// Default cap on registered tasks.
pub const DEFAULT_MAX_TASKS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Upper bound on registered tasks; completed tasks are evicted first.
    pub max_tasks: usize,
    /// Jobs allowed to run at once. 0 means one per available core.
    pub num_threads: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            num_threads: 0,
        }
    }
}

impl RegistryConfig {
    /// Read `METAFILE_MAX_TASKS` and `METAFILE_NUM_THREADS`, falling back to
    /// the defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_tasks: lookup("METAFILE_MAX_TASKS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_tasks),
            num_threads: lookup("METAFILE_NUM_THREADS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.num_threads),
        }
    }

    /// Effective worker pool size.
    pub fn worker_threads(&self) -> usize {
        if self.num_threads > 0 {
            return self.num_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RegistryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.max_tasks, 256);
    }

    #[test]
    fn test_reads_overrides() {
        let config = RegistryConfig::from_lookup(lookup(&[
            ("METAFILE_MAX_TASKS", "16"),
            ("METAFILE_NUM_THREADS", " 3 "),
        ]));
        assert_eq!(config.max_tasks, 16);
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.worker_threads(), 3);
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = RegistryConfig::from_lookup(lookup(&[
            ("METAFILE_MAX_TASKS", "0"),
            ("METAFILE_NUM_THREADS", "many"),
        ]));
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn test_auto_worker_threads_is_positive() {
        assert!(RegistryConfig::default().worker_threads() >= 1);
    }
}
