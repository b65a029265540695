//! Bounded enrichment job queue and worker pool.
//!
//! One pass discovers at most `batch_size` pending records, feeds them
//! through a bounded channel to `workers` tasks, and waits for the pool to
//! drain. Each record is embedded, then scored; both writes are single
//! set-once statements, so a record is always in a well-defined state:
//! untouched, embedded, or scored. A failure at either step is recorded
//! against the record (attempt count, error, next attempt time) and never
//! surfaces to the writer that appended it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_config::EnrichmentConfig;
use tally_core::entities::AuditRecord;
use tally_core::identity::CallerContext;
use tally_db::repos::{EnrichmentScope, ScoreUpdate};
use tally_db::service::TallyService;
use tally_embeddings::{Embedder, check_dimension};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::alert::{AlertSink, AnomalyAlert, TracingAlertSink};
use crate::error::EnrichError;
use crate::scorer::{Classification, HeuristicScorer, Scorer};

/// Tuning knobs for a pipeline, usually taken from [`EnrichmentConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub batch_size: u32,
    pub queue_capacity: usize,
    pub workers: usize,
    pub anomaly_threshold: f64,
    pub call_timeout: Duration,
}

impl From<&EnrichmentConfig> for PipelineSettings {
    fn from(cfg: &EnrichmentConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            queue_capacity: cfg.queue_capacity.max(1),
            workers: cfg.workers.max(1),
            anomaly_threshold: cfg.anomaly_threshold,
            call_timeout: Duration::from_millis(cfg.call_timeout_ms),
        }
    }
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Scored { anomaly: bool },
    /// Another worker (or an earlier pass) got there first.
    AlreadyScored,
    Failed { retryable: bool },
}

/// Totals for one or more passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub discovered: u64,
    pub embedded: u64,
    pub scored: u64,
    pub anomalies: u64,
    pub already_scored: u64,
    pub failed: u64,
    pub cancelled: bool,
}

impl RunReport {
    fn absorb(&mut self, other: &Self) {
        self.discovered += other.discovered;
        self.embedded += other.embedded;
        self.scored += other.scored;
        self.anomalies += other.anomalies;
        self.already_scored += other.already_scored;
        self.failed += other.failed;
        self.cancelled |= other.cancelled;
    }
}

/// Per-record side effects a worker reports upward.
#[derive(Debug, Default)]
struct Tally {
    embedded: bool,
}

/// Enrichment worker pool bound to one trail.
///
/// Cheap to clone; every clone shares the service, models, and sink.
#[derive(Clone)]
pub struct EnrichmentPipeline {
    service: Arc<TallyService>,
    embedder: Arc<dyn Embedder>,
    scorer: Arc<dyn Scorer>,
    alerts: Arc<dyn AlertSink>,
    settings: PipelineSettings,
    worker: CallerContext,
}

impl EnrichmentPipeline {
    /// Pipeline with the heuristic scorer, `tracing` alerts, and settings
    /// from the service's configuration.
    #[must_use]
    pub fn new(service: Arc<TallyService>, embedder: Arc<dyn Embedder>) -> Self {
        let settings = PipelineSettings::from(&service.config().enrichment);
        Self {
            service,
            embedder,
            scorer: Arc::new(HeuristicScorer),
            alerts: Arc::new(TracingAlertSink),
            settings,
            worker: CallerContext::system(),
        }
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    #[must_use]
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one bounded pass over `scope`.
    ///
    /// Cancelling stops discovery and lets each worker finish (or drop) its
    /// current record; queued records simply stay pending.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Database`] if discovery fails. Per-record
    /// failures are recorded and counted, not returned.
    pub async fn run_once(
        &self,
        scope: &EnrichmentScope,
        cancel: &CancellationToken,
    ) -> Result<RunReport, EnrichError> {
        let pending = self
            .service
            .pending_enrichment(&self.worker, scope, self.settings.batch_size)
            .await?;
        let mut report = RunReport {
            discovered: pending.len() as u64,
            ..RunReport::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }
        tracing::info!(scope = ?scope, records = pending.len(), "enrichment pass started");

        let (tx, rx) = mpsc::channel::<AuditRecord>(self.settings.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let workers = self.settings.workers.min(pending.len());
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let pipeline = self.clone();
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                pipeline.worker_loop(worker_id, &rx, &cancel).await
            }));
        }

        for record in pending {
            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                res = tx.send(record) => res.is_ok(),
            };
            if !sent {
                break;
            }
        }
        drop(tx);

        for handle in handles {
            match handle.await {
                Ok(partial) => report.absorb(&partial),
                Err(e) => tracing::error!(error = %e, "enrichment worker panicked"),
            }
        }
        report.cancelled = cancel.is_cancelled();

        tracing::info!(
            scored = report.scored,
            anomalies = report.anomalies,
            failed = report.failed,
            cancelled = report.cancelled,
            "enrichment pass finished"
        );
        Ok(report)
    }

    /// Run passes until cancelled, sleeping `idle` whenever a pass finds
    /// nothing to do.
    ///
    /// # Errors
    ///
    /// Returns the first discovery error.
    pub async fn run_until_cancelled(
        &self,
        scope: &EnrichmentScope,
        idle: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunReport, EnrichError> {
        let mut total = RunReport::default();
        while !cancel.is_cancelled() {
            let pass = self.run_once(scope, cancel).await?;
            total.absorb(&pass);
            if pass.discovered == 0 {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(idle) => {}
                }
            }
        }
        total.cancelled = true;
        Ok(total)
    }

    /// Enrich a single record. Failures are recorded against the record.
    ///
    /// # Errors
    ///
    /// Returns `EnrichError::Database` only if the failure itself cannot be
    /// recorded.
    pub async fn process(&self, record: &AuditRecord) -> Result<JobOutcome, EnrichError> {
        let mut tally = Tally::default();
        self.process_counted(record, &mut tally).await
    }

    async fn worker_loop(
        &self,
        worker_id: usize,
        rx: &Mutex<mpsc::Receiver<AuditRecord>>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport::default();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                job = async { rx.lock().await.recv().await } => job,
            };
            let Some(record) = next else { break };

            let mut tally = Tally::default();
            let outcome = self.process_counted(&record, &mut tally).await;
            if tally.embedded {
                report.embedded += 1;
            }
            match outcome {
                Ok(JobOutcome::Scored { anomaly }) => {
                    report.scored += 1;
                    report.anomalies += u64::from(anomaly);
                }
                Ok(JobOutcome::AlreadyScored) => report.already_scored += 1,
                Ok(JobOutcome::Failed { .. }) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(worker_id, record_id = %record.id, error = %e, "could not record enrichment failure");
                }
            }
        }
        tracing::debug!(worker_id, scored = report.scored, "enrichment worker stopped");
        report
    }

    async fn process_counted(&self, record: &AuditRecord, tally: &mut Tally) -> Result<JobOutcome, EnrichError> {
        match self.enrich(record, tally).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let retryable = e.is_retryable();
                let message = e.to_string();
                self.service
                    .record_enrichment_failure(&self.worker, &record.id, &message)
                    .await?;
                Ok(JobOutcome::Failed { retryable })
            }
        }
    }

    async fn enrich(&self, record: &AuditRecord, tally: &mut Tally) -> Result<JobOutcome, EnrichError> {
        let already_embedded = record
            .enrichment
            .as_ref()
            .is_some_and(|e| e.embedded_at.is_some());
        let embedding = if already_embedded {
            self.service
                .get_embedding(&self.worker, &record.id)
                .await?
                .ok_or_else(|| EnrichError::Malformed(format!("record {} lost its embedding", record.id)))?
        } else {
            let vector = self.embed(record).await?;
            if self
                .service
                .store_embedding(&self.worker, &record.id, &vector)
                .await?
            {
                tally.embedded = true;
                vector
            } else {
                // Lost the race to another worker; score what was stored.
                self.service
                    .get_embedding(&self.worker, &record.id)
                    .await?
                    .unwrap_or(vector)
            }
        };

        let classification = self.classify(record, embedding).await?;
        if !(0.0..=1.0).contains(&classification.anomaly_score) {
            return Err(EnrichError::Malformed(format!(
                "anomaly score {} outside [0, 1]",
                classification.anomaly_score
            )));
        }

        let is_anomaly = classification.anomaly_score > self.settings.anomaly_threshold;
        let update = ScoreUpdate {
            anomaly_score: classification.anomaly_score,
            is_anomaly,
            category: classification.category.clone(),
            risk_level: classification.risk_level,
            tags: classification.tags,
        };
        if !self.service.store_scores(&self.worker, &record.id, &update).await? {
            return Ok(JobOutcome::AlreadyScored);
        }

        tracing::debug!(
            record_id = %record.id,
            anomaly_score = update.anomaly_score,
            is_anomaly,
            "record scored"
        );
        if is_anomaly {
            self.alerts.anomaly_detected(&AnomalyAlert {
                record_id: record.id.clone(),
                tenant_id: record.tenant_id.clone(),
                event_type: record.event_type.clone(),
                anomaly_score: update.anomaly_score,
                risk_level: update.risk_level,
                category: update.category,
            });
        }
        Ok(JobOutcome::Scored { anomaly: is_anomaly })
    }

    async fn embed(&self, record: &AuditRecord) -> Result<Vec<f32>, EnrichError> {
        let embedder = Arc::clone(&self.embedder);
        let text = record.embedding_text();
        let vector = self
            .bounded(move || embedder.embed_single(&text).map_err(EnrichError::from))
            .await?;
        check_dimension(self.embedder.dimension(), &vector)?;
        Ok(vector)
    }

    async fn classify(
        &self,
        record: &AuditRecord,
        embedding: Vec<f32>,
    ) -> Result<Classification, EnrichError> {
        let scorer = Arc::clone(&self.scorer);
        let record = record.clone();
        self.bounded(move || scorer.score(&record, &embedding)).await
    }

    /// Run a blocking model call on the blocking pool under the call timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, EnrichError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, EnrichError> + Send + 'static,
    {
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(EnrichError::Unavailable(format!("model call aborted: {join}"))),
            Err(_) => Err(EnrichError::Timeout(limit)),
        }
    }
}
