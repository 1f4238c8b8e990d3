use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

pub const DEFAULT_HOSTED_ENGINE_CONF: &str = "/etc/ovirt-hosted-engine/hosted-engine.conf";
const INTERNAL_DOMAIN: &str = "internal";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RutilConfig {
    pub engine: EngineSection,
    pub refresh: RefreshSection,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSection {
    pub url: Option<String>,
    pub username: Option<String>,
    pub insecure: bool,
    pub hosted_engine_conf: PathBuf,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            insecure: false,
            hosted_engine_conf: PathBuf::from(DEFAULT_HOSTED_ENGINE_CONF),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshSection {
    pub vm_status_ms: u64,
    pub host_stats_ms: u64,
    pub inventory_ms: u64,
    pub events_ms: u64,
    #[serde(alias = "timeout_ms")]
    pub call_timeout_ms: u64,
    pub input_tick_ms: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            vm_status_ms: 1_000,
            host_stats_ms: 1_000,
            inventory_ms: 10_000,
            events_ms: 5_000,
            call_timeout_ms: 4_000,
            input_tick_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSection {
    #[serde(alias = "ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

/// Poll intervals, timeouts and cache lifetime shared by every screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub vm_status: Duration,
    pub host_stats: Duration,
    pub inventory: Duration,
    pub events: Duration,
    pub call_timeout: Duration,
    pub input_tick: Duration,
    pub cache_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&RutilConfig::default())
    }
}

impl Settings {
    pub fn from_config(config: &RutilConfig) -> Self {
        let refresh = &config.refresh;
        Self {
            vm_status: Duration::from_millis(refresh.vm_status_ms.max(100)),
            host_stats: Duration::from_millis(refresh.host_stats_ms.max(100)),
            inventory: Duration::from_millis(refresh.inventory_ms.max(100)),
            events: Duration::from_millis(refresh.events_ms.max(100)),
            call_timeout: Duration::from_millis(refresh.call_timeout_ms.max(100)),
            input_tick: Duration::from_millis(refresh.input_tick_ms.clamp(10, 1_000)),
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
        }
    }
}

impl RutilConfig {
    /// Loads the first config file found; no file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_path(),
        };
        let Some(path) = path else {
            return Ok((Self::default(), None));
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let parsed = Self::parse(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok((parsed, Some(path)))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("RUTIL_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("rutil.yaml"),
        PathBuf::from("rutil.yml"),
        PathBuf::from(".rutil.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/rutil/config.yaml"),
            PathBuf::from(&home).join(".config/rutil/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Reads the `fqdn=` entry of a hosted-engine config file.
pub fn hosted_engine_fqdn(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    parse_fqdn(&raw)
}

fn parse_fqdn(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("fqdn="))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

pub fn engine_url_for_fqdn(fqdn: &str) -> String {
    format!("https://{fqdn}/ovirt-engine/api")
}

/// Appends the internal profile when the login has no `@domain`.
pub fn normalize_username(username: &str) -> String {
    let username = username.trim();
    if username.contains('@') {
        username.to_string()
    } else {
        format!("{username}@{INTERNAL_DOMAIN}")
    }
}

#[cfg(test)]
mod tests {
    use super::{
        RutilConfig, Settings, engine_url_for_fqdn, normalize_username, parse_fqdn,
    };
    use tokio::time::Duration;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = RutilConfig::parse(
            "engine:\n  url: https://engine.lab/ovirt-engine/api\nrefresh:\n  events_ms: 2500\n",
        )
        .unwrap();
        assert_eq!(
            config.engine.url.as_deref(),
            Some("https://engine.lab/ovirt-engine/api")
        );
        assert_eq!(config.refresh.events_ms, 2_500);
        assert_eq!(config.refresh.vm_status_ms, 1_000);
        assert_eq!(config.cache.ttl_secs, 30);

        let settings = Settings::from_config(&config);
        assert_eq!(settings.events, Duration::from_millis(2_500));
        assert_eq!(settings.input_tick, Duration::from_millis(50));
    }

    #[test]
    fn empty_file_is_default_config() {
        assert_eq!(RutilConfig::parse("  \n").unwrap(), RutilConfig::default());
    }

    #[test]
    fn unknown_shape_is_an_error() {
        assert!(RutilConfig::parse("refresh: fast").is_err());
    }

    #[test]
    fn fqdn_is_read_from_hosted_engine_conf() {
        let raw = "# generated\nvm_disk_id=abc\nfqdn=engine.lab.local\nhost_id=1\n";
        assert_eq!(parse_fqdn(raw).as_deref(), Some("engine.lab.local"));
        assert_eq!(parse_fqdn("#fqdn=old\nfqdn=\n"), None);
        assert_eq!(
            engine_url_for_fqdn("engine.lab.local"),
            "https://engine.lab.local/ovirt-engine/api"
        );
    }

    #[test]
    fn username_gets_internal_domain() {
        assert_eq!(normalize_username("admin"), "admin@internal");
        assert_eq!(normalize_username(" ops@corp.ldap "), "ops@corp.ldap");
    }
}
