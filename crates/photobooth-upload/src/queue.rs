use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use photobooth_types::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{upload_error, StorageUploader, UploadTask};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub uploaded: u64,
    pub failed: u64,
    pub pending: u64,
}

#[derive(Default)]
struct Counters {
    uploaded: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
}

/// Unbounded in-memory FIFO drained by a single background worker.
///
/// Upload failures are logged and counted, never retried; local files are
/// left untouched whatever the outcome.
pub struct UploadQueue {
    sender: Mutex<Option<Sender<UploadTask>>>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UploadQueue {
    pub fn start(uploader: Arc<dyn StorageUploader>, poll_timeout: Duration) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());

        let worker = {
            let running = Arc::clone(&running);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("upload-worker".into())
                .spawn(move || {
                    process_queue(receiver, uploader, running, counters, poll_timeout)
                })
                .map_err(|err| upload_error(format!("failed to spawn upload worker: {err}")))?
        };

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            running,
            counters,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue `path` for upload without waiting on the worker.
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> Result<()> {
        let task = UploadTask::new(path.into());
        let sender = self
            .sender
            .lock()
            .map_err(|_| upload_error("upload queue lock poisoned"))?;
        let Some(sender) = sender.as_ref() else {
            return Err(upload_error(format!(
                "upload queue stopped; {} stays local",
                task.path.display()
            )));
        };
        self.counters.pending.fetch_add(1, Ordering::AcqRel);
        sender.send(task).map_err(|err| {
            self.counters.pending.fetch_sub(1, Ordering::AcqRel);
            upload_error(format!(
                "upload worker gone; {} stays local",
                err.0.path.display()
            ))
        })
    }

    pub fn stats(&self) -> UploadStats {
        UploadStats {
            uploaded: self.counters.uploaded.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
            pending: self.counters.pending.load(Ordering::Acquire),
        }
    }

    /// Poll until nothing is pending or `timeout` elapses. Returns `true` when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.counters.pending.load(Ordering::Acquire) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stop accepting work, let the worker finish its current upload and join it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Upload worker panicked during shutdown");
            }
            info!("Upload queue stopped");
        }
    }
}

fn process_queue(
    receiver: Receiver<UploadTask>,
    uploader: Arc<dyn StorageUploader>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    poll_timeout: Duration,
) {
    while running.load(Ordering::Acquire) {
        match receiver.recv_timeout(poll_timeout) {
            Ok(task) => {
                upload_one(uploader.as_ref(), &task, &counters);
                counters.pending.fetch_sub(1, Ordering::AcqRel);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let abandoned = receiver.try_iter().count() as u64;
    if abandoned > 0 {
        counters.pending.fetch_sub(abandoned, Ordering::AcqRel);
        warn!("{abandoned} queued upload(s) dropped at shutdown; local files kept");
    }
}

fn upload_one(uploader: &dyn StorageUploader, task: &UploadTask, counters: &Counters) {
    debug!(
        "Uploading {} (task {}, queued at {})",
        task.path.display(),
        task.id,
        task.enqueued_at.to_rfc3339()
    );
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| uploader.upload(&task.path)));
    let latency_ms = task.queued_for().num_milliseconds();
    match outcome {
        Ok(Ok(file)) => {
            counters.uploaded.fetch_add(1, Ordering::AcqRel);
            info!("Uploaded {} (task {}) {latency_ms} ms after queueing", file.name, task.id);
            info!("View at: {}", file.url);
        }
        Ok(Err(err)) => {
            counters.failed.fetch_add(1, Ordering::AcqRel);
            warn!(
                "Failed to upload {} after {latency_ms} ms: {err}",
                task.path.display()
            );
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::AcqRel);
            error!("Uploader panicked on {}", task.path.display());
        }
    }
}
