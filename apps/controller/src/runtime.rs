//! Background loop that drains due work items.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use devicelock_core::scheduler::DispatchReport;

use crate::context::ServiceContext;

/// Floor on the loop's sleep so a failing pass cannot spin.
const MIN_WAIT: Duration = Duration::from_secs(1);

/// Runs every work item that is due right now.
pub async fn run_pending_work(context: &ServiceContext) -> devicelock_core::Result<DispatchReport> {
    let report = context.dispatcher.run_due(context.clock.now()).await?;
    if report != DispatchReport::default() {
        info!(
            "[WorkLoop] Ran due work: {} succeeded, {} retried, {} failed, {} escalated",
            report.succeeded, report.retried, report.failed, report.escalated
        );
    }
    Ok(report)
}

/// Time until the next pending item is due, bounded by the poll interval.
async fn next_wait(context: &ServiceContext) -> Duration {
    let poll = context.config.poll_interval;
    let pending = match context.queue.list_pending().await {
        Ok(items) => items,
        Err(err) => {
            warn!("[WorkLoop] Could not list pending work: {}", err);
            return poll;
        }
    };
    let now = context.clock.now();
    pending
        .iter()
        .map(|item| {
            (item.run_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
        .min()
        .map(|until_due| until_due.min(poll))
        .unwrap_or(poll)
        .max(MIN_WAIT)
}

/// Spawns the work loop unless one is already running. The loop wakes when the
/// scheduler arms new work or the next item falls due.
pub async fn start_work_loop(context: Arc<ServiceContext>) {
    let mut guard = context.work_loop.lock().await;
    if let Some(handle) = guard.as_ref() {
        if !handle.is_finished() {
            return;
        }
        guard.take();
    }

    let wake = context.scheduler.wake_handle();
    let loop_context = Arc::clone(&context);
    let handle = tokio::spawn(async move {
        info!("[WorkLoop] Started");
        loop {
            if let Err(err) = run_pending_work(&loop_context).await {
                warn!("[WorkLoop] Dispatch pass failed: {}", err);
            }
            let wait = next_wait(&loop_context).await;
            debug!("[WorkLoop] Sleeping for up to {}s", wait.as_secs());
            tokio::select! {
                _ = wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    });
    *guard = Some(handle);
}

pub async fn stop_work_loop(context: &ServiceContext) {
    let mut guard = context.work_loop.lock().await;
    if let Some(handle) = guard.take() {
        handle.abort();
        info!("[WorkLoop] Stopped");
    }
}
