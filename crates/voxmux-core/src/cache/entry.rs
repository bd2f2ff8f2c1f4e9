use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use voxmux_speech::{AudioFormat, AudioMetadata, SynthesizedAudio};

/// A cached synthesis result. Replaced wholesale, never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub audio: SynthesizedAudio,
    /// Backend that produced the audio
    pub backend: String,
    pub format: AudioFormat,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry created at `now` that lives for `ttl`
    pub fn new(
        audio: SynthesizedAudio,
        backend: impl Into<String>,
        format: AudioFormat,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            audio,
            backend: backend.into(),
            format,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn metadata(&self) -> &AudioMetadata {
        &self.audio.metadata
    }

    pub fn size_bytes(&self) -> usize {
        self.audio.audio.len()
    }

    /// An entry is expired from its `expires_at` instant onwards
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
