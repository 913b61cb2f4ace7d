use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::services::storage::StorageService;
use crate::tasks::processing;

const IDLE_POLL: Duration = Duration::from_secs(5);
const BETWEEN_DOCUMENTS: Duration = Duration::from_secs(3);
const STUCK_SWEEP: Duration = Duration::from_secs(60);

pub(crate) async fn run(state: AppState) -> Result<()> {
    let storage = state
        .storage()
        .cloned()
        .context("Worker requires object storage; set S3_ACCESS_KEY and S3_SECRET_KEY")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = vec![
        tokio::spawn(queue_worker(state.clone(), storage, shutdown_rx.clone())),
        tokio::spawn(stuck_sweep_loop(state.clone(), shutdown_rx.clone())),
    ];
    tracing::info!("Queue worker started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

/// One document at a time; a run in flight is finished before shutdown is honored.
async fn queue_worker(state: AppState, storage: StorageService, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let pause = match processing::process_next(&state, &storage).await {
            Ok(true) => BETWEEN_DOCUMENTS,
            Ok(false) => IDLE_POLL,
            Err(err) => {
                tracing::error!(error = %err, "Failed to process queued PDF");
                IDLE_POLL
            }
        };

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(pause) => {}
        }
    }
}

async fn stuck_sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(STUCK_SWEEP);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match processing::report_stuck(&state).await {
                    Ok(0) => {}
                    Ok(count) => tracing::warn!(count, "Stuck queue items found"),
                    Err(err) => tracing::error!(error = %err, "Stuck queue sweep failed"),
                }
            }
        }
    }
}
