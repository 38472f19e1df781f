use crate::configuration::Settings;
use crate::domain::Cutoff;
use crate::pipeline::{PipelineOptions, PurgePipeline, PurgeSummary};
use crate::store::TableStore;
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Application {
    pipeline: PurgePipeline,
    retention_days: u32,
}

impl Application {
    pub fn build(settings: Settings) -> Result<Self, anyhow::Error> {
        settings.validate().context("Invalid purge configuration")?;
        let client = settings
            .store
            .client()
            .context("Failed to build the table store client")?;

        Ok(Self::with_store(Arc::new(client), &settings))
    }

    /// Builds the application around an existing store client.
    pub fn with_store(store: Arc<dyn TableStore>, settings: &Settings) -> Self {
        let pipeline = PurgePipeline::new(
            store,
            settings.store.table_name.clone(),
            settings.purge.sentinel_row_key.clone(),
            PipelineOptions::from(&settings.purge),
        );

        Self {
            pipeline,
            retention_days: settings.purge.retention_days,
        }
    }

    pub fn cutoff(&self) -> Cutoff {
        Cutoff::today(self.retention_days)
    }

    /// Runs one purge with today's cutoff, cancelling on Ctrl-C.
    pub async fn run_until_stopped(self) -> Result<PurgeSummary, anyhow::Error> {
        let cancel = CancellationToken::new();
        let signal_listener = tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

        let summary = self.run(self.cutoff(), cancel).await;
        signal_listener.abort();
        summary
    }

    pub async fn run(
        &self,
        cutoff: Cutoff,
        cancel: CancellationToken,
    ) -> Result<PurgeSummary, anyhow::Error> {
        self.pipeline
            .run(cutoff, cancel)
            .await
            .context("Failed to discover partitions eligible for purging")
    }
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error.message = %e, "Failed to listen for the shutdown signal");
        return;
    }
    tracing::warn!("Shutdown signal received, stopping once in-flight store calls finish");
    cancel.cancel();
}
