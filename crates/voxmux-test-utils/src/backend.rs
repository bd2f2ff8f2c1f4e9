use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use voxmux_speech::{
    AudioFormat, BackendError, BackendResult, HealthStatus, QualityTier, SynthesisOptions,
    SynthesizedAudio, TTSBackend, VoiceInfo,
};

/// Scripted outcome of `synthesize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    Fail,
    /// Fail the next `n` calls, then succeed
    FailTimes(usize),
    /// Succeed with zero audio bytes
    EmptyAudio,
}

/// Backend fake implementing the full capability contract
///
/// Audio is `"<name>|<voice>|<text>"` so tests can tell which backend answered.
#[derive(Debug)]
pub struct MockBackend {
    pub name: String,
    behavior: Mutex<MockBehavior>,
    healthy: AtomicBool,
    init_fails: bool,
    honor_cancel: bool,
    delay: Option<Duration>,
    formats: Vec<AudioFormat>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behavior: Mutex::new(MockBehavior::Succeed),
            healthy: AtomicBool::new(true),
            init_fails: false,
            honor_cancel: true,
            delay: None,
            formats: vec![AudioFormat::Wav],
            gate: None,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Formats advertised and produced; anything else is rejected
    pub fn with_formats(mut self, formats: Vec<AudioFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Hold every call until `release` hands out a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Keep running after the cancellation signal fires
    pub fn ignoring_cancellation(mut self) -> Self {
        self.honor_cancel = false;
        self
    }

    pub fn with_init_failure(mut self) -> Self {
        self.init_fails = true;
        self
    }

    pub fn unhealthy(self) -> Self {
        self.set_healthy(false);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut guard) = self.behavior.lock() {
            *guard = behavior;
        }
    }

    /// Let `n` gated calls proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Number of `synthesize` invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that returned (any outcome)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of calls that returned `Cancelled`
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Texts in the order the backend started them
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Wait until at least `n` calls have started, up to one second
    pub async fn wait_for_calls(&self, n: usize) -> bool {
        for _ in 0..200 {
            if self.calls() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Wait until at least `n` calls have returned, up to one second
    pub async fn wait_for_completed(&self, n: usize) -> bool {
        for _ in 0..200 {
            if self.completed() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn next_outcome(&self) -> MockBehavior {
        let Ok(mut guard) = self.behavior.lock() else {
            return MockBehavior::Fail;
        };
        match *guard {
            MockBehavior::FailTimes(0) => MockBehavior::Succeed,
            MockBehavior::FailTimes(n) => {
                *guard = MockBehavior::FailTimes(n - 1);
                MockBehavior::Fail
            }
            ref other => other.clone(),
        }
    }

    async fn wait_turn(&self, cancel: &CancellationToken) -> BackendResult<()> {
        let work = async {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
        };

        if self.honor_cancel {
            tokio::select! {
                _ = work => Ok(()),
                _ = cancel.cancelled() => Err(BackendError::Cancelled),
            }
        } else {
            work.await;
            Ok(())
        }
    }

    async fn run(
        &self,
        text: &str,
        voice_id: &str,
        options: &SynthesisOptions,
        cancel: &CancellationToken,
    ) -> BackendResult<SynthesizedAudio> {
        if !self.formats.contains(&options.format) {
            return Err(BackendError::FormatNotSupported(
                options.format,
                self.name.clone(),
            ));
        }
        self.wait_turn(cancel).await?;
        match self.next_outcome() {
            MockBehavior::Succeed | MockBehavior::FailTimes(_) => {
                let audio = format!("{}|{}|{}", self.name, voice_id, text).into_bytes();
                Ok(SynthesizedAudio::new(audio, 100, 22050))
            }
            MockBehavior::EmptyAudio => Ok(SynthesizedAudio::new(Vec::new(), 0, 22050)),
            MockBehavior::Fail => Err(BackendError::synthesis("scripted failure", &self.name)),
        }
    }
}

#[async_trait]
impl TTSBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> BackendResult<()> {
        if self.init_fails {
            return Err(BackendError::InitializationFailed(
                "scripted init failure".to_string(),
                self.name.clone(),
            ));
        }
        Ok(())
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        options: &SynthesisOptions,
        cancel: CancellationToken,
    ) -> BackendResult<SynthesizedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }

        let result = self.run(text, voice_id, options, &cancel).await;

        if matches!(result, Err(BackendError::Cancelled)) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn list_voices(&self) -> BackendResult<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo {
            id: "v1".to_string(),
            name: format!("{} voice", self.name),
            language: "en-US".to_string(),
            gender: "female".to_string(),
            backend: self.name.clone(),
            quality: QualityTier::Medium,
        }])
    }

    async fn health_check(&self) -> HealthStatus {
        if self.healthy.load(Ordering::SeqCst) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy(format!("{} marked unhealthy", self.name))
        }
    }

    fn supported_formats(&self) -> Vec<AudioFormat> {
        self.formats.clone()
    }
}
