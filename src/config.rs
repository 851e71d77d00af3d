use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::{FeedError, FeedResult};
use crate::types::config::{ManagerConfig, MAX_REPAIR_LOG_CAPACITY};

pub const CONFIG_PATH_ENV: &str = "FEEDWATCH_CONFIG";
pub const AUTO_REPAIR_ENV: &str = "FEEDWATCH_AUTO_REPAIR";
pub const CONNECT_TIMEOUT_ENV: &str = "FEEDWATCH_CONNECT_TIMEOUT_MS";

pub fn feedwatch_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".feedwatch")
}

pub fn default_config_path() -> PathBuf {
    feedwatch_data_dir().join("feeds.json")
}

/// `FEEDWATCH_CONFIG` if set, otherwise `~/.feedwatch/feeds.json`.
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Read a (possibly partial) config file over the defaults. A missing file
/// yields the defaults.
pub fn load_config(path: &Path) -> FeedResult<ManagerConfig> {
    let config = if path.exists() {
        let text = fs::read_to_string(path)?;
        let patch: Value = serde_json::from_str(&text)?;
        let config = merged(&ManagerConfig::default(), &patch)?;
        info!(path = %path.display(), endpoints = config.endpoints.len(), "Loaded feed config");
        config
    } else {
        debug!(path = %path.display(), "No feed config file, using defaults");
        ManagerConfig::default()
    };
    validate(&config)?;
    Ok(config)
}

/// Merge a JSON patch into `config` and validate the result.
pub fn apply_patch(config: &ManagerConfig, patch_json: &str) -> FeedResult<ManagerConfig> {
    let patch: Value = serde_json::from_str(patch_json)?;
    let updated = merged(config, &patch)?;
    validate(&updated)?;
    Ok(updated)
}

pub fn apply_env_overrides(config: &mut ManagerConfig) -> FeedResult<()> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

fn apply_overrides<F>(config: &mut ManagerConfig, lookup: F) -> FeedResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(AUTO_REPAIR_ENV) {
        config.auto_repair = parse_flag(&raw).ok_or_else(|| {
            FeedError::Config(format!("{AUTO_REPAIR_ENV} must be true/false/1/0, got {raw:?}"))
        })?;
    }
    if let Some(raw) = lookup(CONNECT_TIMEOUT_ENV) {
        config.connect_timeout_ms = raw.trim().parse().map_err(|_| {
            FeedError::Config(format!("{CONNECT_TIMEOUT_ENV} must be milliseconds, got {raw:?}"))
        })?;
    }
    Ok(())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn merged(base: &ManagerConfig, patch: &Value) -> FeedResult<ManagerConfig> {
    if !patch.is_object() {
        return Err(FeedError::Config(
            "config must be a JSON object".to_string(),
        ));
    }
    let mut current = serde_json::to_value(base)?;
    merge_json(&mut current, patch);
    Ok(serde_json::from_value(current)?)
}

fn merge_json(base: &mut Value, patch: &Value) {
    if let (Value::Object(base_map), Value::Object(patch_map)) = (base, patch) {
        for (key, value) in patch_map {
            let nested = value.is_object() && base_map.get(key).is_some_and(Value::is_object);
            if nested {
                if let Some(existing) = base_map.get_mut(key) {
                    merge_json(existing, value);
                }
            } else {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}

pub fn validate(config: &ManagerConfig) -> FeedResult<()> {
    if config.endpoints.is_empty() {
        return Err(FeedError::Config(
            "at least one endpoint is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        let invalid = |reason: String| FeedError::InvalidEndpoint {
            id: endpoint.id.clone(),
            reason,
        };
        if endpoint.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }
        if !seen.insert(endpoint.id.as_str()) {
            return Err(FeedError::DuplicateEndpoint(endpoint.id.clone()));
        }
        let url = Url::parse(&endpoint.address).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
    }

    let backoff = &config.backoff;
    if backoff.max_attempts == 0 {
        return Err(FeedError::Config("backoff.maxAttempts must be positive".to_string()));
    }
    if backoff.base_delay_ms == 0 || backoff.base_delay_ms > backoff.max_delay_ms {
        return Err(FeedError::Config(
            "backoff.baseDelayMs must be positive and at most maxDelayMs".to_string(),
        ));
    }

    let intervals = [
        ("healthIntervalMs", config.health_interval_ms),
        ("staleSweepIntervalMs", config.stale_sweep_interval_ms),
        ("staleAfterMs", config.stale_after_ms),
        ("autoRepairIntervalMs", config.auto_repair_interval_ms),
        ("optimizeIntervalMs", config.optimize_interval_ms),
        ("connectTimeoutMs", config.connect_timeout_ms),
    ];
    if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
        return Err(FeedError::Config(format!("{name} must be positive")));
    }

    if config.repair_log_capacity == 0 || config.repair_log_capacity > MAX_REPAIR_LOG_CAPACITY {
        return Err(FeedError::Config(format!(
            "repairLogCapacity must be between 1 and {MAX_REPAIR_LOG_CAPACITY}"
        )));
    }
    if !(0.0..=1.0).contains(&config.failure_log_sample_rate) {
        return Err(FeedError::Config(
            "failureLogSampleRate must be within [0, 1]".to_string(),
        ));
    }
    if config.latency_floor_ms.is_nan() || config.latency_floor_ms < 0.0 {
        return Err(FeedError::Config("latencyFloorMs must be non-negative".to_string()));
    }
    Ok(())
}
