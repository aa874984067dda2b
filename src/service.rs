//! Conversion service facade.
//!
//! `ConvertService` is the single entry point both protocol adapters call.
//! It owns the capability, the batch orchestrator and the immutable
//! [`ServiceInstance`] used for uptime reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchOrchestrator, BatchRequest, BatchResult};
use crate::convert::{convert_bounded, ConversionLimits, ConversionRequest, ConversionResult, Converter, ConverterInfo};
use crate::types::{Config, Environment, Error, Result};
use crate::validation::{validate_batch_size, validate_html};

/// Feature entry reported by `info` when `CONVERTER_ENABLE_CACHE` is set.
pub const CACHE_FEATURE: &str = "Cache enabled by configuration";

/// Identity and start time of this process. Constructed once in `main`.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, version: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            environment,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.name.clone(),
            config.server.version.clone(),
            config.server.environment,
        )
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Process memory snapshot in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub resident: u64,
    pub virtual_size: u64,
}

impl MemoryInfo {
    /// Best-effort read of the current process's memory usage.
    /// Returns `None` where the platform does not expose it.
    pub fn snapshot() -> Option<Self> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        Self::parse_proc_status(&status)
    }

    fn parse_proc_status(status: &str) -> Option<Self> {
        let field = |name: &str| -> Option<u64> {
            let line = status.lines().find(|l| l.starts_with(name))?;
            let kb: u64 = line[name.len()..].trim().trim_end_matches("kB").trim().parse().ok()?;
            Some(kb * 1024)
        };
        Some(Self {
            resident: field("VmRSS:")?,
            virtual_size: field("VmSize:")?,
        })
    }
}

/// Health report for `GET /health` and `HealthCheck`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// Human-readable uptime, e.g. `1h 30m 5s`.
    pub uptime: String,
    pub uptime_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryInfo>,
}

/// Shared service facade. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConvertService {
    converter: Arc<dyn Converter>,
    batch: BatchOrchestrator,
    limits: ConversionLimits,
    max_batch_size: usize,
    enable_cache: bool,
    instance: Arc<ServiceInstance>,
}

impl ConvertService {
    pub fn new(converter: Arc<dyn Converter>, config: &Config, instance: ServiceInstance) -> Self {
        let limits = ConversionLimits::from(&config.converter);
        let batch = BatchOrchestrator::new(
            Arc::clone(&converter),
            limits.clone(),
            config.converter.batch_concurrency,
        );
        Self {
            converter,
            batch,
            limits,
            max_batch_size: config.converter.max_batch_size,
            enable_cache: config.converter.enable_cache,
            instance: Arc::new(instance),
        }
    }

    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// Convert a single document.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult> {
        validate_html(&request.html)?;
        let input_size = request.html.len();
        let result = convert_bounded(Arc::clone(&self.converter), request, &self.limits).await?;
        tracing::debug!(
            input_size,
            output_size = result.stats.output_size,
            "conversion_completed"
        );
        Ok(result)
    }

    /// Convert 1..=max_batch_size documents with per-item failure isolation.
    pub async fn convert_batch(&self, request: BatchRequest) -> Result<BatchResult> {
        validate_batch_size(request.items.len(), self.max_batch_size)?;
        self.batch.run_batch(request.items).await
    }

    /// Reserved operation; always reports not implemented.
    pub async fn convert_from_url(&self, url: &str) -> Result<ConversionResult> {
        tracing::debug!(url, "convert_from_url_rejected");
        Err(Error::not_implemented("conversion from URL is not supported"))
    }

    pub fn health(&self) -> HealthStatus {
        let uptime = Duration::from_secs(self.instance.uptime().as_secs());
        HealthStatus {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: self.instance.version.clone(),
            uptime: humantime::format_duration(uptime).to_string(),
            uptime_seconds: uptime.as_secs(),
            memory: MemoryInfo::snapshot(),
        }
    }

    /// Converter capabilities plus the features switched on by configuration.
    pub fn info(&self) -> ConverterInfo {
        let mut info = self.converter.info();
        if self.enable_cache {
            info.features.push(CACHE_FEATURE.to_string());
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::HtmlConverter;
    use pretty_assertions::assert_eq;

    fn service() -> ConvertService {
        let config = Config::default();
        ConvertService::new(
            Arc::new(HtmlConverter::new()),
            &config,
            ServiceInstance::from_config(&config),
        )
    }

    #[tokio::test]
    async fn test_convert_reports_byte_sizes() {
        let html = "<h1>Hello World</h1>";
        let result = service().convert(ConversionRequest::new(html)).await.unwrap();
        assert_eq!(result.stats.input_size, html.len());
        assert_eq!(result.stats.output_size, result.markdown.len());
    }

    #[tokio::test]
    async fn test_deeply_nested_document_converts_on_blocking_pool() {
        let depth = 50_000;
        let html = format!("{}x{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let result = service().convert(ConversionRequest::new(html)).await.unwrap();
        assert_eq!(result.markdown, "x");
        assert!(!result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_convert_rejects_empty_input() {
        let err = service().convert(ConversionRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_batch_bounds() {
        let svc = service();

        let err = svc.convert_batch(BatchRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let items = |n: usize| BatchRequest {
            items: (0..n).map(|_| ConversionRequest::new("<p>x</p>")).collect(),
        };
        assert!(svc.convert_batch(items(101)).await.is_err());
        let ok = svc.convert_batch(items(100)).await.unwrap();
        assert_eq!(ok.summary.total, 100);
    }

    #[tokio::test]
    async fn test_convert_from_url_is_not_implemented() {
        let err = service().convert_from_url("https://example.com").await.unwrap_err();
        assert_eq!(err.to_envelope_code(), 501);
    }

    #[test]
    fn test_health() {
        let health = service().health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, Config::default().server.version);
    }

    #[test]
    fn test_info_lists_plugins() {
        let info = service().info();
        assert!(info.supported_plugins.contains(&"table".to_string()));
    }

    #[test]
    fn test_info_reports_cache_flag() {
        assert!(!service().info().features.iter().any(|f| f == CACHE_FEATURE));

        let mut config = Config::default();
        config.converter.enable_cache = true;
        let svc = ConvertService::new(
            Arc::new(HtmlConverter::new()),
            &config,
            ServiceInstance::from_config(&config),
        );
        let features = svc.info().features;
        assert_eq!(features.last().map(String::as_str), Some(CACHE_FEATURE));
        assert_eq!(features.len(), HtmlConverter::new().info().features.len() + 1);
    }

    #[test]
    fn test_parse_proc_status() {
        let status = "Name:\thtml2md\nVmSize:\t  20000 kB\nVmRSS:\t   5000 kB\n";
        let mem = MemoryInfo::parse_proc_status(status).unwrap();
        assert_eq!(mem.resident, 5000 * 1024);
        assert_eq!(mem.virtual_size, 20000 * 1024);
        assert!(MemoryInfo::parse_proc_status("Name:\tx\n").is_none());
    }
}
