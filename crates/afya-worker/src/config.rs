//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs processed at the same time
    pub max_concurrent_jobs: usize,
    /// Maximum jobs waiting for a slot before `submit` rejects
    pub max_queued_jobs: usize,
    /// Frames sampled per video
    pub max_frames: usize,
    /// Base directory for job-scoped scratch directories
    pub work_dir: PathBuf,
    /// Timeout for a single FFmpeg invocation
    pub ffmpeg_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How long a finished job stays pollable
    pub job_ttl: Duration,
    /// How often finished jobs older than `job_ttl` are swept
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_queued_jobs: 64,
            max_frames: 5,
            work_dir: std::env::temp_dir().join("afya"),
            ffmpeg_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
            job_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source. Zero counts and durations are
    /// ignored in favour of the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let count = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
        };
        let secs = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|&n| n > 0)
                .map(Duration::from_secs)
        };

        Self {
            max_concurrent_jobs: count("WORKER_MAX_JOBS").unwrap_or(defaults.max_concurrent_jobs),
            max_queued_jobs: count("WORKER_MAX_QUEUED").unwrap_or(defaults.max_queued_jobs),
            max_frames: count("WORKER_MAX_FRAMES").unwrap_or(defaults.max_frames),
            work_dir: lookup("WORKER_WORK_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_timeout: secs("FFMPEG_TIMEOUT_SECS").unwrap_or(defaults.ffmpeg_timeout),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(defaults.shutdown_timeout),
            job_ttl: secs("WORKER_JOB_TTL_SECS").unwrap_or(defaults.job_ttl),
            sweep_interval: secs("WORKER_SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.max_queued_jobs, 64);
        assert_eq!(config.max_frames, 5);
        assert_eq!(config.ffmpeg_timeout, Duration::from_secs(300));
        assert_eq!(config.job_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("WORKER_MAX_JOBS", "2"),
            ("WORKER_MAX_QUEUED", "10"),
            ("WORKER_WORK_DIR", "/srv/afya"),
            ("WORKER_JOB_TTL_SECS", "120"),
            ("WORKER_SWEEP_INTERVAL_SECS", "5"),
        ]);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.max_queued_jobs, 10);
        assert_eq!(config.work_dir, PathBuf::from("/srv/afya"));
        assert_eq!(config.job_ttl, Duration::from_secs(120));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_and_garbage_fall_back_to_defaults() {
        let config = from_pairs(&[
            ("WORKER_MAX_JOBS", "0"),
            ("WORKER_MAX_QUEUED", "0"),
            ("WORKER_MAX_FRAMES", "lots"),
            ("WORKER_JOB_TTL_SECS", "0"),
            ("FFMPEG_TIMEOUT_SECS", "-3"),
        ]);
        let defaults = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, defaults.max_concurrent_jobs);
        assert_eq!(config.max_queued_jobs, defaults.max_queued_jobs);
        assert_eq!(config.max_frames, defaults.max_frames);
        assert_eq!(config.job_ttl, defaults.job_ttl);
        assert_eq!(config.ffmpeg_timeout, defaults.ffmpeg_timeout);
    }
}
