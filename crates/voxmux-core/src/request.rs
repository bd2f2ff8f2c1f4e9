use crate::error::SynthesisError;
use serde::{Deserialize, Serialize};
use voxmux_speech::{AudioFormat, QualityTier, SynthesisOptions};

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 48000;

/// Queue priority of a request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Bounds enforced on inbound requests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLimits {
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_max_text_chars() -> usize {
    1000
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
        }
    }
}

/// A single text-to-speech request. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    text: String,
    voice_id: String,
    backend_hint: Option<String>,
    quality: QualityTier,
    format: AudioFormat,
    sample_rate: Option<u32>,
    priority: Priority,
}

impl SynthesisRequest {
    /// Create a request; surrounding whitespace is trimmed from `text`
    pub fn new(text: impl AsRef<str>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.as_ref().trim().to_string(),
            voice_id: voice_id.into(),
            backend_hint: None,
            quality: QualityTier::default(),
            format: AudioFormat::default(),
            sample_rate: None,
            priority: Priority::default(),
        }
    }

    pub fn with_backend_hint(mut self, backend: impl Into<String>) -> Self {
        self.backend_hint = Some(backend.into());
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn backend_hint(&self) -> Option<&str> {
        self.backend_hint.as_deref()
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Options forwarded to the backend
    pub fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            quality: self.quality,
            format: self.format,
            sample_rate: self.sample_rate,
        }
    }

    /// Check the request against `limits`
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), SynthesisError> {
        if self.text.is_empty() {
            return Err(SynthesisError::Validation(
                "text cannot be empty or only whitespace".to_string(),
            ));
        }
        let chars = self.text.chars().count();
        if chars > limits.max_text_chars {
            return Err(SynthesisError::Validation(format!(
                "text is {chars} characters, maximum is {}",
                limits.max_text_chars
            )));
        }
        if self.voice_id.trim().is_empty() {
            return Err(SynthesisError::Validation(
                "voice id cannot be empty".to_string(),
            ));
        }
        if let Some(hint) = &self.backend_hint {
            if hint.trim().is_empty() {
                return Err(SynthesisError::Validation(
                    "backend hint cannot be empty".to_string(),
                ));
            }
        }
        if let Some(rate) = self.sample_rate {
            if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
                return Err(SynthesisError::Validation(format!(
                    "sample rate {rate} Hz outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_trimmed() {
        let request = SynthesisRequest::new("  Hello  ", "v1");
        assert_eq!(request.text(), "Hello");
    }

    #[test]
    fn test_whitespace_only_text_is_rejected() {
        let request = SynthesisRequest::new("   ", "v1");
        assert!(matches!(
            request.validate(&RequestLimits::default()),
            Err(SynthesisError::Validation(_))
        ));
    }

    #[test]
    fn test_oversized_text_is_rejected() {
        let limits = RequestLimits { max_text_chars: 5 };
        assert!(SynthesisRequest::new("Hello", "v1").validate(&limits).is_ok());
        assert!(SynthesisRequest::new("Hello!", "v1").validate(&limits).is_err());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let limits = RequestLimits { max_text_chars: 2 };
        assert!(SynthesisRequest::new("你好", "v1").validate(&limits).is_ok());
    }

    #[test]
    fn test_sample_rate_bounds() {
        let limits = RequestLimits::default();
        let ok = SynthesisRequest::new("Hi", "v1").with_sample_rate(22050);
        let low = SynthesisRequest::new("Hi", "v1").with_sample_rate(4000);
        let high = SynthesisRequest::new("Hi", "v1").with_sample_rate(96000);
        assert!(ok.validate(&limits).is_ok());
        assert!(low.validate(&limits).is_err());
        assert!(high.validate(&limits).is_err());
    }

    #[test]
    fn test_options_carry_request_fields() {
        let request = SynthesisRequest::new("Hi", "v1")
            .with_quality(QualityTier::High)
            .with_format(AudioFormat::Mp3)
            .with_sample_rate(16000);
        let options = request.options();
        assert_eq!(options.quality, QualityTier::High);
        assert_eq!(options.format, AudioFormat::Mp3);
        assert_eq!(options.sample_rate, Some(16000));
    }
}
