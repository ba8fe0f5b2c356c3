//! ワーカープール
//!
//! 固定数のワーカーが共有キューからジョブを取り出し、ドライバーを実行する。
//! キューは無制限で、`enqueue` はブロックしない。

use crate::driver::Driver;
use crate::error::{BuildError, BuildResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// ドライバー1回分の実行単位
pub struct Job {
    label: String,
    driver: Box<dyn Driver>,
    done: oneshot::Sender<BuildResult<()>>,
}

impl Job {
    /// ジョブと完了通知の受信側を作成
    pub fn new(
        label: impl Into<String>,
        driver: Box<dyn Driver>,
    ) -> (Self, oneshot::Receiver<BuildResult<()>>) {
        let (done, receiver) = oneshot::channel();
        let job = Self {
            label: label.into(),
            driver,
            done,
        };
        (job, receiver)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

pub struct Dispatcher {
    num_workers: usize,
    sender: mpsc::UnboundedSender<Job>,
    receiver: JobQueue,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// ワーカー数を指定して作成（0 はエラー）
    pub fn new(num_workers: usize, cancel: CancellationToken) -> BuildResult<Self> {
        if num_workers == 0 {
            return Err(BuildError::InvalidConfig(
                "Number of workers must be greater than zero".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        Ok(Self {
            num_workers,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            started: AtomicBool::new(false),
            cancel,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// ワーカーを起動（2回目以降は何もしない）
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(workers = self.num_workers, "Starting dispatcher");
        for id in 0..self.num_workers {
            tokio::spawn(worker(id, self.receiver.clone(), self.cancel.clone()));
        }
    }

    /// ジョブをキューに追加
    pub fn enqueue(&self, job: Job) -> BuildResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::DispatcherClosed);
        }
        self.sender
            .send(job)
            .map_err(|_| BuildError::DispatcherClosed)
    }

    /// ワーカーを停止
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn worker(id: usize, queue: JobQueue, cancel: CancellationToken) {
    loop {
        let job = {
            let mut receiver = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = receiver.recv() => job,
            }
        };

        let Some(job) = job else {
            debug!(worker = id, "Worker stopped");
            break;
        };

        debug!(worker = id, job = %job.label, driver = job.driver.name(), "Running job");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BuildError::Cancelled),
            result = job.driver.run(cancel.clone()) => result,
        };

        if job.done.send(result).is_err() {
            warn!(worker = id, job = %job.label, "Job result receiver dropped");
        }
    }
}
