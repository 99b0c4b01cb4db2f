use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::llm::{HOSTED_TIMEOUT_CAP_SECS, LOCAL_TIMEOUT_CAP_SECS};
use crate::settings::DEFAULT_CONFIG_PATH;

/// Worst case of the default fallback chain (three hosted providers, then the
/// local one) plus a minute for extraction and transformation
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3 * HOSTED_TIMEOUT_CAP_SECS + LOCAL_TIMEOUT_CAP_SECS + 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub ai_config_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker tasks (W)
    pub workers: usize,
    /// Bounded submission queue capacity (Q)
    pub queue_capacity: usize,
    pub job_ttl: Duration,
    pub sweep_interval: Duration,
    /// Overall deadline for one job's pipeline run
    pub job_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            job_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Flat view of the environment as seen through the `config` crate
#[derive(Debug, Deserialize)]
struct EnvSettings {
    host: String,
    port: u16,
    allowed_origins: String,
    import_workers: usize,
    import_queue_capacity: usize,
    import_job_ttl_secs: u64,
    import_sweep_interval_secs: u64,
    import_job_timeout_secs: u64,
    import_max_upload_bytes: usize,
    ai_config_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings: EnvSettings = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3000)?
            .set_default("allowed_origins", "http://localhost:3000,http://localhost:5173")?
            .set_default("import_workers", 4)?
            .set_default("import_queue_capacity", 64)?
            .set_default("import_job_ttl_secs", 3600)?
            .set_default("import_sweep_interval_secs", 60)?
            .set_default("import_job_timeout_secs", DEFAULT_JOB_TIMEOUT_SECS)?
            .set_default("import_max_upload_bytes", 50 * 1024 * 1024)?
            .set_default("ai_config_path", DEFAULT_CONFIG_PATH)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: EnvSettings) -> Result<Self> {
        if settings.import_workers == 0 {
            anyhow::bail!("IMPORT_WORKERS must be at least 1");
        }
        if settings.import_queue_capacity == 0 {
            anyhow::bail!("IMPORT_QUEUE_CAPACITY must be at least 1");
        }

        Ok(Self {
            server: ServerConfig {
                port: settings.port,
                host: settings.host,
                cors_allowed_origins: settings
                    .allowed_origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            pipeline: PipelineConfig {
                workers: settings.import_workers,
                queue_capacity: settings.import_queue_capacity,
                job_ttl: Duration::from_secs(settings.import_job_ttl_secs),
                sweep_interval: Duration::from_secs(settings.import_sweep_interval_secs.max(1)),
                job_timeout: Duration::from_secs(settings.import_job_timeout_secs.max(1)),
                max_upload_bytes: settings.import_max_upload_bytes,
            },
            ai_config_path: PathBuf::from(settings.ai_config_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EnvSettings {
        EnvSettings {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: "http://a.test, ,http://b.test".to_string(),
            import_workers: 2,
            import_queue_capacity: 8,
            import_job_ttl_secs: 120,
            import_sweep_interval_secs: 0,
            import_job_timeout_secs: 30,
            import_max_upload_bytes: 1024,
            ai_config_path: "ai.json".to_string(),
        }
    }

    #[test]
    fn test_from_settings() {
        let config = Config::from_settings(settings()).unwrap();
        assert_eq!(config.server.cors_allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.pipeline.job_ttl, Duration::from_secs(120));
        assert_eq!(config.pipeline.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.ai_config_path, PathBuf::from("ai.json"));
    }

    #[test]
    fn test_default_job_timeout_outlasts_fallback_chain() {
        let huge = 10_000_000;
        let chain = crate::llm::hosted_timeout(huge) * 3 + crate::llm::local_timeout(huge);
        assert!(PipelineConfig::default().job_timeout > chain);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut s = settings();
        s.import_workers = 0;
        assert!(Config::from_settings(s).is_err());
    }
}
