use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;
use tokio::sync::mpsc;
use tracing::error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single designated thread that runs every externally observable callback.
///
/// Callbacks run one at a time in posting order, so consumers never see
/// concurrent reentry. The thread exits once every handle has been dropped
/// and the queue is drained.
#[derive(Clone)]
pub struct DeliveryContext {
    jobs: mpsc::UnboundedSender<Job>,
}

impl DeliveryContext {
    pub fn new(thread_name: &str) -> std::io::Result<Self> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                while let Some(job) = queue.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("delivery callback panicked");
                    }
                }
            })?;
        Ok(Self { jobs })
    }

    /// Queues `callback` for the delivery thread. Returns `false` if the
    /// thread is gone and the callback was dropped.
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.jobs.send(Box::new(callback)).is_ok()
    }
}
