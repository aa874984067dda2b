//! Batch conversion orchestration.
//!
//! Applies the conversion capability to an ordered list of requests with
//! per-item failure isolation. Items run concurrently (bounded), but every
//! result carries the 0-based position of its request and the result list is
//! returned in input order. Counters are computed by a single pass over the
//! collected results, never shared between in-flight items.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::convert::{convert_bounded, ConversionLimits, ConversionRequest, ConversionResult, Converter};
use crate::types::{Error, Result};

/// Wire shape of a batch call on both protocols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub items: Vec<ConversionRequest>,
}

/// Outcome of one batch item. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position of the request in the input sequence.
    pub index: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn succeeded(index: usize, result: ConversionResult) -> Self {
        Self {
            index,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(index: usize, error: &Error) -> Self {
        Self {
            index,
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate counts and timing for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    #[serde(with = "humantime_serde")]
    pub total_time: Duration,
    #[serde(with = "humantime_serde")]
    pub average_time: Duration,
}

impl BatchSummary {
    /// Reduce item results into a summary. `results` must be non-empty.
    fn from_results(results: &[BatchItemResult], total_time: Duration) -> Self {
        let total = results.len();
        let success = results.iter().filter(|r| r.success).count();
        let divisor = u32::try_from(total.max(1)).unwrap_or(u32::MAX);
        Self {
            total,
            success,
            failed: total - success,
            total_time,
            average_time: total_time / divisor,
        }
    }
}

/// Results in input order plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<BatchItemResult>,
    pub summary: BatchSummary,
}

/// Runs batches of conversions against a shared capability.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    converter: Arc<dyn Converter>,
    limits: ConversionLimits,
    concurrency: usize,
}

impl BatchOrchestrator {
    pub fn new(converter: Arc<dyn Converter>, limits: ConversionLimits, concurrency: usize) -> Self {
        Self {
            converter,
            limits,
            concurrency: concurrency.max(1),
        }
    }

    /// Convert every item, isolating failures per item.
    ///
    /// Fails only when `items` is empty; that case should already have been
    /// rejected by request validation.
    pub async fn run_batch(&self, items: Vec<ConversionRequest>) -> Result<BatchResult> {
        if items.is_empty() {
            return Err(Error::validation("batch contains no items"));
        }

        let batch_id = uuid::Uuid::new_v4();
        let total = items.len();
        tracing::debug!(%batch_id, total, concurrency = self.concurrency, "batch_started");

        let started = Instant::now();
        // `buffered` yields in submission order regardless of completion order.
        let results: Vec<BatchItemResult> = stream::iter(items.into_iter().enumerate())
            .map(|(index, request)| {
                let converter = Arc::clone(&self.converter);
                let limits = &self.limits;
                async move {
                    match convert_bounded(converter, request, limits).await {
                        Ok(result) => BatchItemResult::succeeded(index, result),
                        Err(err) => {
                            tracing::debug!(%batch_id, index, error = %err, "batch_item_failed");
                            BatchItemResult::failed(index, &err)
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;
        let total_time = started.elapsed();

        let summary = BatchSummary::from_results(&results, total_time);
        tracing::info!(
            %batch_id,
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            total_time_ms = u64::try_from(total_time.as_millis()).unwrap_or(u64::MAX),
            "batch_completed"
        );

        Ok(BatchResult { results, summary })
    }
}
