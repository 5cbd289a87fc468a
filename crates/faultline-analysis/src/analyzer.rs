//! Orchestration façade for one analysis call.
//!
//! `Analyzer::analyze` runs the full pipeline over one event batch:
//! dedup by event identity, Stage A outage detection, chain resolution
//! through the topology oracle, tree construction, Stage B post-order
//! scoring, prompt rendering and the optional result sink. The analyzer
//! holds no per-call state and is safe to share across concurrent
//! requests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use faultline_core::config::{AnalyzerConfig, PromptOptions};
use faultline_core::model::{AlarmEvent, AnalysisResult};
use faultline_core::{Error, Result};
use faultline_topology::TopologyOracle;

use crate::outage::detect_app_outages;
use crate::prompt::render_prompt;
use crate::scorer;
use crate::tree::AlarmTree;

/// Optional persistence seam for analysis verdicts
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save(&self, window_id: &str, result: &AnalysisResult) -> Result<()>;
}

/// Sink for deployments that only serve results over the API
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl ResultSink for NoopSink {
    async fn save(&self, _window_id: &str, _result: &AnalysisResult) -> Result<()> {
        Ok(())
    }
}

/// Running statistics across analysis calls
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AnalyzerStats {
    pub invocations: u64,
    pub candidates_emitted: u64,
    pub outages_emitted: u64,
    pub failures: u64,
    pub avg_processing_ms: f64,
}

/// Root-cause analyzer façade
pub struct Analyzer {
    oracle: Arc<dyn TopologyOracle>,
    sink: Option<Arc<dyn ResultSink>>,
    config: AnalyzerConfig,
    prompt: PromptOptions,
    stats: Arc<RwLock<AnalyzerStats>>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Build an analyzer; refuses malformed configuration
    pub fn new(
        oracle: Arc<dyn TopologyOracle>,
        sink: Option<Arc<dyn ResultSink>>,
        config: AnalyzerConfig,
        prompt: PromptOptions,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            oracle,
            sink,
            config,
            prompt,
            stats: Arc::new(RwLock::new(AnalyzerStats::default())),
        })
    }

    /// Effective analyzer configuration
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Effective prompt options
    pub fn prompt_options(&self) -> &PromptOptions {
        &self.prompt
    }

    /// Statistics snapshot
    pub async fn stats(&self) -> AnalyzerStats {
        self.stats.read().await.clone()
    }

    /// Analyze one alarm batch. The result is fully deterministic for a
    /// given batch: repeated calls produce byte-identical output.
    pub async fn analyze(
        &self,
        window_id: &str,
        events: &[AlarmEvent],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let start = Instant::now();
        let outcome = self.run(window_id, events, cancel).await;
        let elapsed_ms = start.elapsed().as_millis() as f64;

        let mut stats = self.stats.write().await;
        stats.invocations += 1;
        match &outcome {
            Ok(result) => {
                stats.candidates_emitted += result.candidates.len() as u64;
                stats.outages_emitted += result.app_outages.len() as u64;
            }
            Err(_) => stats.failures += 1,
        }
        let total = stats.avg_processing_ms * (stats.invocations - 1) as f64 + elapsed_ms;
        stats.avg_processing_ms = total / stats.invocations as f64;

        outcome
    }

    async fn run(
        &self,
        window_id: &str,
        events: &[AlarmEvent],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        if events.is_empty() {
            return Err(Error::EmptyBatch);
        }

        info!(
            window_id = %window_id,
            events = events.len(),
            "analysis started"
        );

        // dedup by event identity, last write wins; unique events are then
        // processed in ascending id order so output never depends on batch
        // order
        let mut unique: BTreeMap<String, AlarmEvent> = BTreeMap::new();
        for event in events {
            unique.insert(event.event_id(), event.clone());
        }
        let batch: Vec<AlarmEvent> = unique.values().cloned().collect();

        let app_outages = detect_app_outages(
            self.oracle.as_ref(),
            &batch,
            self.config.app_outage_threshold,
            cancel,
        )
        .await?;

        let mut tree = AlarmTree::new();
        for (event_id, event) in &unique {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let chain = self.oracle.resolve_event(event).await?;
            if chain.is_empty() {
                debug!(event = %event_id, "empty chain, skipping event");
                continue;
            }
            tree.insert_chain(&chain, event, event_id);
        }

        let (candidates, paths) = scorer::evaluate(&mut tree, &self.config);

        let explained: BTreeSet<&str> = candidates
            .iter()
            .flat_map(|c| c.explained.iter().map(String::as_str))
            .collect();
        let unexplained_events: Vec<AlarmEvent> = unique
            .iter()
            .filter(|(id, _)| !explained.contains(id.as_str()))
            .map(|(_, event)| event.clone())
            .collect();

        let mut result = AnalysisResult {
            app_outages,
            candidates,
            paths,
            unexplained_events,
            prompt: String::new(),
        };
        result.prompt = render_prompt(&result, &self.prompt);

        if let Some(sink) = &self.sink {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            sink.save(window_id, &result).await.map_err(|e| match e {
                Error::PersistFailed(_) => e,
                other => Error::persist(other.to_string()),
            })?;
        }

        info!(
            window_id = %window_id,
            outages = result.app_outages.len(),
            candidates = result.candidates.len(),
            unexplained = result.unexplained_events.len(),
            "analysis completed"
        );
        if !result.unexplained_events.is_empty() {
            warn!(
                window_id = %window_id,
                unexplained = result.unexplained_events.len(),
                "events left unexplained by all candidates"
            );
        }

        Ok(result)
    }
}
