//! Pipeline configuration
//!
//! Loaded from the environment (and an optional `.env` file) with typed defaults.
//! Unparsable numeric values fall back to their defaults; an unparsable rendition
//! table or dependency policy is a hard error, since silently guessing either one
//! would change what the pipeline accepts.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::models::VariantSpec;

/// What a call site does when an external dependency cannot give an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Proceed as if the dependency had approved; every bypass is logged
    FailOpen,
    /// Refuse to proceed
    #[default]
    FailClosed,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "fail_open" | "fail-open" | "open" => Ok(FailurePolicy::FailOpen),
            "fail_closed" | "fail-closed" | "closed" => Ok(FailurePolicy::FailClosed),
            other => Err(format!("Invalid failure policy: {}", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailOpen => f.write_str("fail_open"),
            FailurePolicy::FailClosed => f.write_str("fail_closed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: String,

    // Input limits
    pub max_file_size_bytes: usize,
    pub max_dimension: u32,
    pub max_pixels: u64,

    // Rendition table
    pub variants: Vec<VariantSpec>,

    // Concurrency governor
    pub worker_slots: usize,
    pub engine_cache_max_bytes: usize,
    pub cache_sweep_interval_secs: u64,
    pub slot_acquire_timeout_secs: u64,
    pub decode_timeout_secs: u64,
    pub variant_timeout_secs: u64,

    // Malware scanning
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_timeout_secs: u64,
    pub malware_scan_policy: FailurePolicy,

    // Upload job queue
    pub upload_queue_size: usize,
    pub upload_queue_max_concurrent: usize,
    pub upload_queue_max_retries: u32,
}

const UPLOAD_QUEUE_SIZE: usize = 1000;
const UPLOAD_QUEUE_MAX_CONCURRENT: usize = 8;
const UPLOAD_QUEUE_MAX_RETRIES: u32 = 3;
const CLAMAV_PORT: u16 = 3310;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * BYTES_PER_MB,
            max_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            max_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            variants: VariantSpec::parse_list(DEFAULT_VARIANTS).unwrap_or_default(),
            worker_slots: DEFAULT_WORKER_SLOTS,
            engine_cache_max_bytes: DEFAULT_CACHE_MAX_MB * BYTES_PER_MB,
            cache_sweep_interval_secs: DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            slot_acquire_timeout_secs: DEFAULT_SLOT_WAIT_SECS,
            decode_timeout_secs: DEFAULT_DECODE_TIMEOUT_SECS,
            variant_timeout_secs: DEFAULT_VARIANT_TIMEOUT_SECS,
            clamav_host: "localhost".to_string(),
            clamav_port: CLAMAV_PORT,
            clamav_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            malware_scan_policy: FailurePolicy::FailClosed,
            upload_queue_size: UPLOAD_QUEUE_SIZE,
            upload_queue_max_concurrent: UPLOAD_QUEUE_MAX_CONCURRENT,
            upload_queue_max_retries: UPLOAD_QUEUE_MAX_RETRIES,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let variants_str = env::var("IMAGE_VARIANTS").unwrap_or_else(|_| DEFAULT_VARIANTS.to_string());
        let variants = VariantSpec::parse_list(&variants_str)
            .map_err(|e| anyhow::anyhow!("IMAGE_VARIANTS: {}", e))?;

        let malware_scan_policy = match env::var("MALWARE_SCAN_UNAVAILABLE_POLICY") {
            Ok(raw) => FailurePolicy::parse(&raw)
                .map_err(|e| anyhow::anyhow!("MALWARE_SCAN_UNAVAILABLE_POLICY: {}", e))?,
            Err(_) => FailurePolicy::FailClosed,
        };

        let config = Self {
            environment,
            max_file_size_bytes: env_or("MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB) * BYTES_PER_MB,
            max_dimension: env_or("MAX_IMAGE_DIMENSION", DEFAULT_MAX_IMAGE_DIMENSION),
            max_pixels: env_or("MAX_IMAGE_PIXELS", DEFAULT_MAX_IMAGE_PIXELS),
            variants,
            worker_slots: env_or("IMAGE_WORKER_SLOTS", DEFAULT_WORKER_SLOTS),
            engine_cache_max_bytes: env_or("IMAGE_CACHE_MAX_MB", DEFAULT_CACHE_MAX_MB) * BYTES_PER_MB,
            cache_sweep_interval_secs: env_or(
                "IMAGE_CACHE_SWEEP_INTERVAL_SECS",
                DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            ),
            slot_acquire_timeout_secs: env_or("IMAGE_SLOT_WAIT_SECS", DEFAULT_SLOT_WAIT_SECS),
            decode_timeout_secs: env_or("IMAGE_DECODE_TIMEOUT_SECS", DEFAULT_DECODE_TIMEOUT_SECS),
            variant_timeout_secs: env_or("IMAGE_VARIANT_TIMEOUT_SECS", DEFAULT_VARIANT_TIMEOUT_SECS),
            clamav_host: env::var("CLAMAV_HOST").unwrap_or_else(|_| "localhost".to_string()),
            clamav_port: env_or("CLAMAV_PORT", CLAMAV_PORT),
            clamav_timeout_secs: env_or("CLAMAV_TIMEOUT_SECS", DEFAULT_SCAN_TIMEOUT_SECS),
            malware_scan_policy,
            upload_queue_size: env_or("UPLOAD_QUEUE_SIZE", UPLOAD_QUEUE_SIZE).max(1),
            upload_queue_max_concurrent: env_or("UPLOAD_QUEUE_MAX_CONCURRENT", UPLOAD_QUEUE_MAX_CONCURRENT)
                .max(1),
            upload_queue_max_retries: env_or("UPLOAD_QUEUE_MAX_RETRIES", UPLOAD_QUEUE_MAX_RETRIES),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size_bytes == 0 {
            anyhow::bail!("MAX_FILE_SIZE_MB must be greater than 0");
        }
        if self.max_dimension == 0 {
            anyhow::bail!("MAX_IMAGE_DIMENSION must be greater than 0");
        }
        if self.max_pixels == 0 {
            anyhow::bail!("MAX_IMAGE_PIXELS must be greater than 0");
        }
        if self.worker_slots == 0 {
            anyhow::bail!("IMAGE_WORKER_SLOTS must be greater than 0");
        }
        if self.slot_acquire_timeout_secs == 0
            || self.decode_timeout_secs == 0
            || self.variant_timeout_secs == 0
            || self.clamav_timeout_secs == 0
        {
            anyhow::bail!("Stage timeouts must be greater than 0 seconds");
        }
        if self.variants.is_empty() {
            anyhow::bail!("IMAGE_VARIANTS must define at least one rendition");
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.variants {
            if !seen.insert(spec.name.as_str()) {
                anyhow::bail!("IMAGE_VARIANTS: duplicate rendition name '{}'", spec.name);
            }
            if spec.max_dimension == 0 {
                anyhow::bail!("IMAGE_VARIANTS: '{}' has max_dimension 0", spec.name);
            }
            if !(1..=100).contains(&spec.quality) {
                anyhow::bail!(
                    "IMAGE_VARIANTS: '{}' quality must be between 1 and 100",
                    spec.name
                );
            }
        }

        if self.is_production() && self.malware_scan_policy == FailurePolicy::FailOpen {
            anyhow::bail!(
                "MALWARE_SCAN_UNAVAILABLE_POLICY cannot be fail_open in production"
            );
        }

        Ok(())
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn slot_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.slot_acquire_timeout_secs)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    pub fn variant_timeout(&self) -> Duration {
        Duration::from_secs(self.variant_timeout_secs)
    }

    pub fn clamav_timeout(&self) -> Duration {
        Duration::from_secs(self.clamav_timeout_secs)
    }
}
