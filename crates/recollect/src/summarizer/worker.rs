//! Background summary dispatch
//!
//! Jobs are spawned on a tokio runtime and never block the caller. Finished
//! summaries come back over a channel and are applied by whoever owns the
//! memory store, on its own thread, via [`SummaryDispatcher::drain`].

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::summarizer::provider::Summarizer;
use crate::summarizer::types::{SummarizerError, SummaryJob, SummaryOutcome};

/// Spawns summarization jobs and collects their outcomes
pub struct SummaryDispatcher {
    summarizer: Arc<dyn Summarizer>,
    handle: Handle,
    prompt_template: String,
    tx: mpsc::UnboundedSender<SummaryOutcome>,
    rx: mpsc::UnboundedReceiver<SummaryOutcome>,
    in_flight: usize,
}

impl SummaryDispatcher {
    pub fn new(summarizer: Arc<dyn Summarizer>, handle: Handle, prompt_template: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            summarizer,
            handle,
            prompt_template: prompt_template.to_string(),
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Start a job in the background
    pub fn dispatch(&mut self, job: SummaryJob) {
        let summarizer = Arc::clone(&self.summarizer);
        let tx = self.tx.clone();
        let request = job.to_request(&self.prompt_template);

        debug!(
            agent = %job.agent,
            entry_id = %job.entry_id,
            batch_hash = job.batch_hash,
            provider = summarizer.name(),
            "Dispatching summary job"
        );

        self.in_flight += 1;
        self.handle.spawn(async move {
            let result = match summarizer.summarize(&request).await {
                Ok(text) if text.trim().is_empty() => Err(SummarizerError::EmptyResponse),
                Ok(text) => Ok(text.trim().to_string()),
                Err(e) => Err(e),
            };

            let outcome = SummaryOutcome {
                agent: job.agent,
                entry_id: job.entry_id,
                batch_hash: job.batch_hash,
                result,
            };

            if tx.send(outcome).is_err() {
                warn!("Summary dispatcher dropped before job finished");
            }
        });
    }

    pub fn dispatch_all(&mut self, jobs: impl IntoIterator<Item = SummaryJob>) {
        for job in jobs {
            self.dispatch(job);
        }
    }

    /// Collect every outcome that is ready without waiting
    pub fn drain(&mut self) -> Vec<SummaryOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            outcomes.push(outcome);
        }
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    /// Wait for the next outcome
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_outcome(&mut self) -> Option<SummaryOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let outcome = self.rx.recv().await;
        if outcome.is_some() {
            self.in_flight -= 1;
        }
        outcome
    }

    /// Jobs dispatched whose outcome has not been collected yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn provider_name(&self) -> &'static str {
        self.summarizer.name()
    }
}

impl std::fmt::Debug for SummaryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryDispatcher")
            .field("provider", &self.summarizer.name())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
