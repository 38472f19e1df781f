use anyhow::Context;
use tablepurge::configuration::get_configuration;
use tablepurge::startup::Application;
use tablepurge::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let configuration = get_configuration().context("Failed to read configuration")?;

    let subscriber = get_subscriber(&configuration.telemetry, std::io::stdout);
    init_subscriber(subscriber);

    let application = Application::build(configuration)?;
    let summary = application.run_until_stopped().await?;

    if !summary.failures.is_empty() {
        anyhow::bail!(
            "{} of {} eligible partitions failed to purge",
            summary.failures.len(),
            summary.eligible_partition_count
        );
    }
    if summary.cancelled {
        anyhow::bail!(
            "Purge run was cancelled with {} partitions left untouched",
            summary.skipped_partitions
        );
    }
    Ok(())
}
