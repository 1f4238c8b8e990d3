use crate::error::SourceError;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::{Duration, Instant};
use tracing::debug;

pub const SPINNER: [char; 4] = ['|', '/', '-', '\\'];
pub const SPINNER_STEP: Duration = Duration::from_millis(100);

/// A slow fetch running on its own tokio task.
///
/// The result travels over a oneshot channel, so `poll` can hand it out at
/// most once: a finished task is consumed by the call that observes it.
#[derive(Debug)]
pub struct BusyTask<T> {
    label: String,
    started_at: Instant,
    receiver: oneshot::Receiver<Result<T, SourceError>>,
}

#[derive(Debug)]
pub enum TaskPoll<T> {
    Pending(BusyTask<T>),
    Done(Result<T, SourceError>),
}

impl<T: Send + 'static> BusyTask<T> {
    pub fn spawn<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = Result<T, SourceError>> + Send + 'static,
    {
        let label = label.into();
        let (sender, receiver) = oneshot::channel();
        let task_label = label.clone();
        tokio::spawn(async move {
            let result = work.await;
            if sender.send(result).is_err() {
                debug!(task = %task_label, "background result discarded");
            }
        });

        Self {
            label,
            started_at: Instant::now(),
            receiver,
        }
    }
}

impl<T> BusyTask<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn poll(mut self) -> TaskPoll<T> {
        match self.receiver.try_recv() {
            Ok(result) => TaskPoll::Done(result),
            Err(TryRecvError::Empty) => TaskPoll::Pending(self),
            Err(TryRecvError::Closed) => TaskPoll::Done(Err(SourceError::WorkerLost)),
        }
    }

    pub fn spinner(&self, now: Instant) -> char {
        spinner_frame(now.saturating_duration_since(self.started_at))
    }
}

pub fn spinner_frame(elapsed: Duration) -> char {
    let step = (elapsed.as_millis() / SPINNER_STEP.as_millis()) as usize;
    SPINNER[step % SPINNER.len()]
}

/// Polls the task held in `slot`, leaving it in place while still pending.
pub fn poll_slot<T>(slot: &mut Option<BusyTask<T>>) -> Option<Result<T, SourceError>> {
    let task = slot.take()?;
    match task.poll() {
        TaskPoll::Pending(task) => {
            *slot = Some(task);
            None
        }
        TaskPoll::Done(result) => Some(result),
    }
}
