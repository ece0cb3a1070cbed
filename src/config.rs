//! Harness configuration
//!
//! One [`HarnessConfig`] is built at process start and shared by reference;
//! nothing in the crate keeps process-wide mutable settings.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vm_e2e::config::{HarnessConfig, Timeouts};
//!
//! let config = HarnessConfig::new()
//!     .k8s_distro("kind")
//!     .nginx_host("127.0.0.1")
//!     .timeouts(Timeouts::default().polling_interval(Duration::from_secs(10)));
//!
//! assert_eq!(config.retries().unwrap(), 60);
//! assert_eq!(config.vmselect_host("tenant"), "vmselect-tenant.127.0.0.1.nip.io");
//! ```

use crate::wait::retry_budget;
use reqwest::Url;
use std::time::Duration;

/// Error type for configuration problems
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("polling interval must be greater than zero")]
    ZeroInterval,

    #[error("invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Wait durations used across the harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for a resource to become ready
    pub resource_wait: Duration,
    /// Interval between polls of a resource
    pub polling_interval: Duration,
    /// Interval between polls of long-running load-test jobs
    pub job_polling_interval: Duration,
    /// Deadline for long-running load-test jobs
    pub job_max_duration: Duration,
    /// Deadline for a chaos experiment to recover
    pub chaos_max_duration: Duration,
    /// Interval between polls of an external export job
    pub export_poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            resource_wait: Duration::from_secs(10 * 60),
            polling_interval: Duration::from_secs(30),
            job_polling_interval: Duration::from_secs(60),
            job_max_duration: Duration::from_secs(60 * 60),
            chaos_max_duration: Duration::from_secs(30 * 60),
            export_poll_interval: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    pub fn resource_wait(mut self, timeout: Duration) -> Self {
        self.resource_wait = timeout;
        self
    }

    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn job_polling_interval(mut self, interval: Duration) -> Self {
        self.job_polling_interval = interval;
        self
    }

    pub fn job_max_duration(mut self, timeout: Duration) -> Self {
        self.job_max_duration = timeout;
        self
    }

    pub fn chaos_max_duration(mut self, timeout: Duration) -> Self {
        self.chaos_max_duration = timeout;
        self
    }

    pub fn export_poll_interval(mut self, interval: Duration) -> Self {
        self.export_poll_interval = interval;
        self
    }
}

/// Configuration shared by every harness component
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub timeouts: Timeouts,

    /// Kubernetes distribution name (e.g. "kind", "gke")
    pub k8s_distro: Option<String>,

    /// Directory test reports are written to
    pub report_location: String,

    /// Public ingress address of the ingress controller, once discovered
    pub nginx_host: Option<String>,

    /// Overwatch VMSingle URL
    pub vmsingle_url: Option<Url>,

    /// Default VMSelect URL
    pub vmselect_url: Option<Url>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            k8s_distro: None,
            report_location: "/tmp/allure-results".to_string(),
            nginx_host: None,
            vmsingle_url: None,
            vmselect_url: None,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `E2E_*` environment variables on top of defaults
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `E2E_REPORT` | `report_location` |
    /// | `E2E_K8S_DISTRO` | `k8s_distro` |
    /// | `E2E_NGINX_HOST` | `nginx_host` |
    /// | `E2E_VMSINGLE_URL` | `vmsingle_url` |
    /// | `E2E_VMSELECT_URL` | `vmselect_url` |
    /// | `E2E_RESOURCE_WAIT_SECS` | `timeouts.resource_wait` |
    /// | `E2E_POLLING_INTERVAL_SECS` | `timeouts.polling_interval` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(report) = lookup("E2E_REPORT") {
            config.report_location = report;
        }
        config.k8s_distro = lookup("E2E_K8S_DISTRO").filter(|d| !d.is_empty());
        config.nginx_host = lookup("E2E_NGINX_HOST").filter(|h| !h.is_empty());

        if let Some(url) = lookup("E2E_VMSINGLE_URL") {
            config = config.vmsingle_url(&url)?;
        }
        if let Some(url) = lookup("E2E_VMSELECT_URL") {
            config = config.vmselect_url(&url)?;
        }
        if let Some(secs) = lookup("E2E_RESOURCE_WAIT_SECS") {
            config.timeouts.resource_wait = parse_secs("E2E_RESOURCE_WAIT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("E2E_POLLING_INTERVAL_SECS") {
            config.timeouts.polling_interval = parse_secs("E2E_POLLING_INTERVAL_SECS", &secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn k8s_distro(mut self, distro: impl Into<String>) -> Self {
        self.k8s_distro = Some(distro.into());
        self
    }

    pub fn report_location(mut self, path: impl Into<String>) -> Self {
        self.report_location = path.into();
        self
    }

    pub fn nginx_host(mut self, host: impl Into<String>) -> Self {
        self.nginx_host = Some(host.into());
        self
    }

    /// Set the overwatch VMSingle URL; must parse and carry a host
    pub fn vmsingle_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.vmsingle_url = Some(parse_url("vmsingle_url", url)?);
        Ok(self)
    }

    /// Set the default VMSelect URL; must parse and carry a host
    pub fn vmselect_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.vmselect_url = Some(parse_url("vmselect_url", url)?);
        Ok(self)
    }

    /// Reject configurations the waiters cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        for interval in [
            t.polling_interval,
            t.job_polling_interval,
            t.export_poll_interval,
        ] {
            if interval.is_zero() {
                return Err(ConfigError::ZeroInterval);
            }
        }
        Ok(())
    }

    /// Whether the cluster is a local kind cluster
    pub fn is_kind(&self) -> bool {
        self.k8s_distro.as_deref() == Some("kind")
    }

    /// Poll budget for resource waits
    pub fn retries(&self) -> Result<u32, ConfigError> {
        retry_budget(self.timeouts.resource_wait, self.timeouts.polling_interval)
    }

    /// Poll budget for long-running load-test jobs
    pub fn job_retries(&self) -> Result<u32, ConfigError> {
        retry_budget(
            self.timeouts.job_max_duration,
            self.timeouts.job_polling_interval,
        )
    }

    /// Host of the VMSingle ingress, namespaced unless `namespace` is empty
    pub fn vmsingle_host(&self, namespace: &str) -> String {
        self.component_host("vmsingle", namespace)
    }

    /// Host of the VMSelect ingress, namespaced unless `namespace` is empty
    pub fn vmselect_host(&self, namespace: &str) -> String {
        self.component_host("vmselect", namespace)
    }

    fn component_host(&self, component: &str, namespace: &str) -> String {
        let nginx = self.nginx_host.as_deref().unwrap_or("127.0.0.1");
        if namespace.is_empty() {
            format!("{component}.{nginx}.nip.io")
        } else {
            format!("{component}-{namespace}.{nginx}.nip.io")
        }
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_budgets() {
        let config = HarnessConfig::new();
        assert_eq!(config.retries().unwrap(), 20);
        assert_eq!(config.job_retries().unwrap(), 60);
        assert_eq!(config.timeouts.chaos_max_duration, Duration::from_secs(1800));
        assert_eq!(config.report_location, "/tmp/allure-results");
    }

    #[test]
    fn test_builder() {
        let config = HarnessConfig::new()
            .k8s_distro("kind")
            .report_location("/tmp/reports")
            .nginx_host("10.0.0.1")
            .vmsingle_url("http://vmsingle.10.0.0.1.nip.io")
            .unwrap();

        assert!(config.is_kind());
        assert_eq!(config.report_location, "/tmp/reports");
        assert_eq!(
            config.vmsingle_url.as_ref().and_then(|u| u.host_str()),
            Some("vmsingle.10.0.0.1.nip.io")
        );
    }

    #[test]
    fn test_component_hosts() {
        let config = HarnessConfig::new().nginx_host("203.0.113.42");
        assert_eq!(config.vmsingle_host(""), "vmsingle.203.0.113.42.nip.io");
        assert_eq!(
            config.vmselect_host("monitoring"),
            "vmselect-monitoring.203.0.113.42.nip.io"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = HarnessConfig::new().vmselect_url("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { field: "vmselect_url", .. }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = HarnessConfig::new()
            .timeouts(Timeouts::default().polling_interval(Duration::ZERO));
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
        assert_eq!(config.retries(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("E2E_REPORT", "/out"),
            ("E2E_K8S_DISTRO", "kind"),
            ("E2E_VMSINGLE_URL", "http://vmsingle.1.2.3.4.nip.io"),
            ("E2E_RESOURCE_WAIT_SECS", "120"),
            ("E2E_POLLING_INTERVAL_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let config =
            HarnessConfig::from_lookup(|var| env.get(var).map(|v| v.to_string())).unwrap();

        assert_eq!(config.report_location, "/out");
        assert!(config.is_kind());
        assert_eq!(config.timeouts.resource_wait, Duration::from_secs(120));
        assert_eq!(config.retries().unwrap(), 24);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = HarnessConfig::from_lookup(|var| {
            (var == "E2E_POLLING_INTERVAL_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));

        let err = HarnessConfig::from_lookup(|var| {
            (var == "E2E_POLLING_INTERVAL_SECS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroInterval);
    }
}
