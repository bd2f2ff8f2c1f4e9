use crate::cache::CacheKey;
use crate::error::SynthesisError;
use crate::registry::{BackendRegistry, HealthState, LoadCounters};
use crate::request::{Priority, SynthesisRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use voxmux_speech::{BackendError, BackendResult, SharedBackend, SynthesizedAudio};

pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(2000);

/// One unit of backend work
#[derive(Debug, Clone)]
pub struct QueueTask {
    pub id: Uuid,
    pub request: SynthesisRequest,
    pub cache_key: CacheKey,
    pub attempt: u32,
    pub enqueued_at: Instant,
    cancel: CancellationToken,
}

impl QueueTask {
    pub fn new(request: SynthesisRequest, cache_key: CacheKey, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            cache_key,
            attempt,
            enqueued_at: Instant::now(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.request.priority()
    }
}

type ResultSender = oneshot::Sender<BackendResult<SynthesizedAudio>>;

struct Waiting {
    task: QueueTask,
    tx: ResultSender,
    started: Option<oneshot::Sender<()>>,
}

/// Per-backend queue and dispatcher
struct Lane {
    backend: SharedBackend,
    max_concurrency: usize,
    capacity: usize,
    grace: Duration,
    load: Arc<LoadCounters>,
    health: Arc<HealthState>,
    waiting: Mutex<VecDeque<Waiting>>,
}

impl Lane {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Waiting>> {
        // Counters are only touched under this lock and stay consistent on panic
        self.waiting.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn admit(self: &Arc<Self>, job: Waiting) -> Result<(), SynthesisError> {
        let mut waiting = self.lock();
        if self.load.in_flight() < self.max_concurrency {
            self.load.start();
            log::trace!("Dispatching task {} on '{}'", job.task.id, self.name());
            self.spawn(job);
            return Ok(());
        }
        if waiting.len() >= self.capacity {
            self.load.reject();
            log::debug!("Queue for '{}' is full ({})", self.name(), self.capacity);
            return Err(SynthesisError::QueueFull {
                backend: self.name().to_string(),
            });
        }

        let position = match job.task.priority() {
            Priority::High => waiting
                .iter()
                .position(|w| w.task.priority() == Priority::Normal)
                .unwrap_or(waiting.len()),
            Priority::Normal => waiting.len(),
        };
        log::trace!(
            "Queued task {} on '{}' at position {position}",
            job.task.id,
            self.name()
        );
        waiting.insert(position, job);
        self.load.enqueued();
        Ok(())
    }

    /// Withdraw a waiting task, or signal a dispatched one
    fn cancel(&self, id: Uuid, token: &CancellationToken) {
        let removed = {
            let mut waiting = self.lock();
            match waiting.iter().position(|w| w.task.id == id) {
                Some(index) => {
                    let job = waiting.remove(index);
                    self.load.dequeued();
                    self.load.cancel();
                    job
                }
                None => None,
            }
        };

        match removed {
            Some(job) => {
                log::debug!("Removed queued task {id} from '{}'", self.name());
                let _ = job.tx.send(Err(BackendError::Cancelled));
            }
            None => token.cancel(),
        }
    }

    /// Release a slot and start the next waiting task, if any
    fn complete(self: &Arc<Self>) {
        let mut waiting = self.lock();
        self.load.finish();
        if let Some(next) = waiting.pop_front() {
            self.load.dequeued();
            self.load.start();
            log::trace!("Dispatching queued task {} on '{}'", next.task.id, self.name());
            self.spawn(next);
        }
    }

    fn spawn(self: &Arc<Self>, mut job: Waiting) {
        if let Some(started) = job.started.take() {
            let _ = started.send(());
        }
        let lane = Arc::clone(self);
        tokio::spawn(async move {
            let slot = SlotGuard(Arc::clone(&lane));
            lane.run(job).await;
            drop(slot);
        });
    }

    async fn run(&self, job: Waiting) {
        let Waiting { task, tx, .. } = job;
        let token = task.cancel.clone();
        let options = task.request.options();

        let call = self.backend.synthesize(
            task.request.text(),
            task.request.voice_id(),
            &options,
            token.clone(),
        );
        tokio::pin!(call);

        let finished = tokio::select! {
            result = &mut call => Some(result),
            _ = token.cancelled() => None,
        };

        let result = match finished {
            Some(Ok(audio)) if audio.is_empty() => Err(BackendError::synthesis(
                "backend returned empty audio",
                self.name(),
            )),
            Some(result) => result,
            None => {
                if tokio::time::timeout(self.grace, &mut call).await.is_err() {
                    log::warn!(
                        "Backend '{}' ignored cancellation of task {} for {:?}",
                        self.name(),
                        task.id,
                        self.grace
                    );
                    // The slot stays held until the call actually returns
                    let _ = call.await;
                }
                Err(BackendError::Cancelled)
            }
        };

        match &result {
            Ok(_) => self.health.record_success(),
            Err(e) if e.is_cancellation() || token.is_cancelled() => self.load.cancel(),
            Err(e) if e.is_request_rejection() => {
                log::debug!("Backend '{}' rejected task {}: {e}", self.name(), task.id);
            }
            Err(e) => {
                log::warn!("Backend '{}' failed task {}: {e}", self.name(), task.id);
                self.health.record_failure();
            }
        }

        let result = if token.is_cancelled() {
            Err(BackendError::Cancelled)
        } else {
            result
        };
        let _ = tx.send(result);
    }
}

/// Returns the slot on every exit path of a dispatched task, including panics
struct SlotGuard(Arc<Lane>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// Caller's side of an admitted task
///
/// Dropping an unfinished handle cancels the task.
pub struct TaskHandle {
    id: Uuid,
    cancel: CancellationToken,
    started: Option<oneshot::Receiver<()>>,
    rx: oneshot::Receiver<BackendResult<SynthesizedAudio>>,
    lane: Arc<Lane>,
    finished: bool,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend(&self) -> &str {
        self.lane.name()
    }

    /// Wait until the task leaves the queue; `false` if it never will
    pub async fn dispatched(&mut self) -> bool {
        match self.started.take() {
            Some(started) => started.await.is_ok(),
            None => true,
        }
    }

    /// Wait for the backend's result
    pub async fn wait(&mut self) -> BackendResult<SynthesizedAudio> {
        let result = match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Other(
                "task ended without a result".to_string(),
                self.lane.name().to_string(),
            )),
        };
        self.finished = true;
        result
    }

    pub fn cancel(&self) {
        self.lane.cancel(self.id, &self.cancel);
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel();
        }
    }
}

/// Bounded admission and dispatch, one lane per registered backend
pub struct ConcurrencyScheduler {
    lanes: HashMap<String, Arc<Lane>>,
}

impl ConcurrencyScheduler {
    pub fn new(registry: &BackendRegistry, grace: Duration) -> Self {
        let lanes = registry
            .entries()
            .iter()
            .map(|entry| {
                let lane = Lane {
                    backend: Arc::clone(&entry.backend),
                    max_concurrency: entry.settings.max_concurrency.max(1),
                    capacity: entry.settings.queue_capacity,
                    grace,
                    load: Arc::clone(&entry.load),
                    health: Arc::clone(&entry.health),
                    waiting: Mutex::new(VecDeque::new()),
                };
                (entry.name().to_string(), Arc::new(lane))
            })
            .collect();
        Self { lanes }
    }

    /// Admit `task` on `backend`: dispatch now, queue, or reject with `QueueFull`
    pub fn enqueue(&self, backend: &str, task: QueueTask) -> Result<TaskHandle, SynthesisError> {
        let lane = self
            .lanes
            .get(backend)
            .ok_or(SynthesisError::NoBackendAvailable)?;

        let (tx, rx) = oneshot::channel();
        let (started_tx, started_rx) = oneshot::channel();
        let handle = TaskHandle {
            id: task.id,
            cancel: task.cancel.clone(),
            started: Some(started_rx),
            rx,
            lane: Arc::clone(lane),
            finished: false,
        };
        let job = Waiting {
            task,
            tx,
            started: Some(started_tx),
        };
        match lane.admit(job) {
            Ok(()) => Ok(handle),
            Err(e) => {
                let mut handle = handle;
                handle.finished = true;
                Err(e)
            }
        }
    }

    /// Number of tasks waiting on `backend`
    pub fn queue_len(&self, backend: &str) -> usize {
        self.lanes.get(backend).map(|l| l.lock().len()).unwrap_or(0)
    }
}
