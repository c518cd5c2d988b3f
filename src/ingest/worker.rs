//! Background task turning ingested emails into todos.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::Ingestor;

/// Spawns the worker on the current tokio runtime.
///
/// The worker drains the queue whenever [`Ingestor::receive`] nudges it, and
/// at least every `poll` so failed jobs get retried once their retry delay has
/// passed. Each sweep first requeues jobs abandoned by a worker that stopped
/// making progress, in this process or another.
pub fn spawn(ingestor: Arc<Ingestor>, poll: Duration) -> JoinHandle<()> {
    tokio::spawn(run(ingestor, poll))
}

async fn run(ingestor: Arc<Ingestor>, poll: Duration) {
    log::info!("Ingest worker: started, polling every {:?}", poll);

    let wakeup = ingestor.wakeup();
    loop {
        match ingestor.requeue_stale().await {
            Ok(0) => {}
            Ok(n) => log::info!("Ingest worker: requeued {} stale job(s)", n),
            Err(e) => log::error!("Ingest worker: could not requeue stale jobs: {}", e),
        }

        match ingestor.drain().await {
            Ok(0) => {}
            Ok(n) => log::debug!("Ingest worker: processed {} job(s)", n),
            Err(e) => log::error!("Ingest worker: could not claim jobs: {}", e),
        }

        tokio::select! {
            _ = wakeup.notified() => {
                log::debug!("Ingest worker: woken by new email");
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
}
