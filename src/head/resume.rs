/*!
 * Batch Resume Task
 *
 * Background task requeueing unfinished batches. The first pass runs after a
 * grace delay so peers have time to connect, then on a fixed interval.
 */

use super::HeadNode;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Control messages for the resume task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeCommand {
    /// Run a pass now
    Trigger,
    Shutdown,
}

/// Handle to the resume background task
pub struct ResumeTask {
    command_tx: mpsc::UnboundedSender<ResumeCommand>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ResumeTask {
    pub fn spawn(head: HeadNode) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_resume_loop(head, command_rx));

        Self {
            command_tx,
            handle: Some(handle),
        }
    }

    /// Run a resume pass without waiting for the next tick
    pub fn trigger(&self) {
        let _ = self.command_tx.send(ResumeCommand::Trigger);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task, waiting for an in-flight pass to finish
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(ResumeCommand::Shutdown);

        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(()) => info!("batch resume task stopped"),
                Err(err) => warn!(error = %err, "batch resume task shutdown error"),
            }
        }
    }
}

impl Drop for ResumeTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.command_tx.send(ResumeCommand::Shutdown);
        }
    }
}

async fn run_pass(head: &HeadNode) {
    match head.resume_unfinished_batches().await {
        Ok(0) => debug!("no unfinished batches"),
        Ok(count) => info!(count, "batch resume pass complete"),
        Err(err) => warn!(error = %err, "batch resume pass failed"),
    }
}

async fn run_resume_loop(head: HeadNode, mut command_rx: mpsc::UnboundedReceiver<ResumeCommand>) {
    let cancel = head.cancellation_token();
    let delay = head.config().batch_resume_delay;
    let period = head.config().requeue_interval;

    info!(?delay, ?period, "batch resume task started");

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        cmd = command_rx.recv() => match cmd {
            Some(ResumeCommand::Trigger) => {}
            Some(ResumeCommand::Shutdown) | None => return,
        },
        _ = cancel.cancelled() => return,
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => run_pass(&head).await,

            cmd = command_rx.recv() => match cmd {
                Some(ResumeCommand::Trigger) => run_pass(&head).await,
                Some(ResumeCommand::Shutdown) | None => {
                    info!("batch resume task shutting down");
                    break;
                }
            },

            _ = cancel.cancelled() => break,
        }
    }
}
