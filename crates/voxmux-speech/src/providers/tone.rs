//! Tone reference backend
//!
//! Renders a sine tone whose pitch is derived from the voice id and whose
//! length grows with the text. Output is a 16-bit mono WAV, so the whole
//! pipeline can be exercised without a speech engine.

use crate::error::{BackendError, BackendResult};
use crate::provider::TTSBackend;
use crate::types::{
    AudioFormat, HealthStatus, QualityTier, SynthesisOptions, SynthesizedAudio, VoiceInfo,
};
use async_trait::async_trait;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;

const DEFAULT_SAMPLE_RATE: u32 = 22050;
const MS_PER_CHAR: u64 = 60;
const MAX_DURATION_MS: u64 = 30_000;
const VOICES: [(&str, &str, f32); 3] = [
    ("low", "Low Tone", 220.0),
    ("mid", "Mid Tone", 440.0),
    ("high", "High Tone", 880.0),
];

/// Sine tone backend
#[derive(Debug, Clone)]
pub struct ToneBackend {
    name: String,
    sample_rate: u32,
}

impl ToneBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn frequency_for(voice_id: &str) -> f32 {
        if let Some((_, _, freq)) = VOICES.iter().find(|(id, _, _)| *id == voice_id) {
            return *freq;
        }
        // Unknown voices still get a stable pitch.
        let seed: u32 = voice_id.bytes().map(u32::from).sum();
        200.0 + (seed % 600) as f32
    }

    fn render(
        &self,
        text: &str,
        voice_id: &str,
        sample_rate: u32,
    ) -> BackendResult<SynthesizedAudio> {
        let duration_ms =
            (text.chars().count() as u64 * MS_PER_CHAR).clamp(MS_PER_CHAR, MAX_DURATION_MS);
        let total_samples = (u64::from(sample_rate) * duration_ms / 1000) as usize;
        let frequency = Self::frequency_for(voice_id);

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + total_samples * 2));
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| BackendError::synthesis(e.to_string(), self.name.clone()))?;
        for i in 0..total_samples {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * frequency * 2.0 * std::f32::consts::PI).sin() * 0.3;
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .map_err(|e| BackendError::synthesis(e.to_string(), self.name.clone()))?;
        }
        writer
            .finalize()
            .map_err(|e| BackendError::synthesis(e.to_string(), self.name.clone()))?;

        Ok(SynthesizedAudio::new(cursor.into_inner(), duration_ms, sample_rate))
    }
}

#[async_trait]
impl TTSBackend for ToneBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> BackendResult<()> {
        log::debug!("Tone backend '{}' ready at {} Hz", self.name, self.sample_rate);
        Ok(())
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        options: &SynthesisOptions,
        cancel: CancellationToken,
    ) -> BackendResult<SynthesizedAudio> {
        if options.format != AudioFormat::Wav {
            return Err(BackendError::FormatNotSupported(
                options.format,
                self.name.clone(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let sample_rate = options.sample_rate.unwrap_or(self.sample_rate);
        self.render(text, voice_id, sample_rate)
    }

    async fn list_voices(&self) -> BackendResult<Vec<VoiceInfo>> {
        Ok(VOICES
            .iter()
            .map(|(id, name, _)| VoiceInfo {
                id: id.to_string(),
                name: name.to_string(),
                language: "und".to_string(),
                gender: "neutral".to_string(),
                backend: self.name.clone(),
                quality: QualityTier::Low,
            })
            .collect())
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}
