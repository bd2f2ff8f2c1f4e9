use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Audio container format requested from a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
    Flac,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "ogg" => Ok(AudioFormat::Ogg),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(format!(
                "unknown audio format '{other}', expected one of: wav, mp3, ogg, flac"
            )),
        }
    }
}

/// Quality tier of a synthesis request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "fast" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(format!(
                "unknown quality tier '{other}', expected one of: low, medium, high"
            )),
        }
    }
}

/// Voice exposed by a backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Voice identifier passed back to `synthesize`
    pub id: String,
    /// Human readable name
    pub name: String,
    /// BCP-47 language tag
    pub language: String,
    pub gender: String,
    /// Name of the backend serving this voice
    pub backend: String,
    #[serde(default)]
    pub quality: QualityTier,
}

/// Per-call synthesis options handed to a backend
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynthesisOptions {
    pub quality: QualityTier,
    pub format: AudioFormat,
    /// Requested sample rate in Hz; `None` lets the backend pick its native rate
    pub sample_rate: Option<u32>,
}

/// Metadata describing a synthesized clip
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub size_bytes: usize,
}

/// Encoded audio returned by a backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Encoded audio bytes in the requested format
    pub audio: Bytes,
    pub metadata: AudioMetadata,
}

impl SynthesizedAudio {
    /// Wrap encoded bytes, deriving `size_bytes` from the payload
    pub fn new(audio: impl Into<Bytes>, duration_ms: u64, sample_rate: u32) -> Self {
        let audio = audio.into();
        let metadata = AudioMetadata {
            duration_ms,
            sample_rate,
            size_bytes: audio.len(),
        };
        Self { audio, metadata }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

impl Serialize for SynthesizedAudio {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SynthesizedAudio", 2)?;

        // Serialize audio as base64
        let encoded =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.audio);

        state.serialize_field("audio", &encoded)?;
        state.serialize_field("metadata", &self.metadata)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for SynthesizedAudio {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct SynthesizedAudioHelper {
            audio: String,
            metadata: AudioMetadata,
        }

        let helper = SynthesizedAudioHelper::deserialize(deserializer)?;

        let bytes =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &helper.audio)
                .map_err(serde::de::Error::custom)?;

        if bytes.len() != helper.metadata.size_bytes {
            return Err(serde::de::Error::custom(format!(
                "audio payload is {} bytes but metadata declares {}",
                bytes.len(),
                helper.metadata.size_bytes
            )));
        }

        Ok(SynthesizedAudio {
            audio: Bytes::from(bytes),
            metadata: helper.metadata,
        })
    }
}

/// Result of a backend health probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_audio_serialization() {
        let audio = SynthesizedAudio::new(vec![0u8, 1, 2, 255], 120, 22050);

        let json = serde_json::to_string(&audio).unwrap();
        let deserialized: SynthesizedAudio = serde_json::from_str(&json).unwrap();

        assert_eq!(audio, deserialized);
        assert_eq!(deserialized.metadata.size_bytes, 4);
    }

    #[test]
    fn test_synthesized_audio_rejects_truncated_payload() {
        let json = r#"{"audio":"AAEC","metadata":{"duration_ms":1,"sample_rate":8000,"size_bytes":10}}"#;
        let result: Result<SynthesizedAudio, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_quality_tier_parsing() {
        assert_eq!("HIGH".parse::<QualityTier>().unwrap(), QualityTier::High);
        assert_eq!("fast".parse::<QualityTier>().unwrap(), QualityTier::Low);
        assert!("ultra".parse::<QualityTier>().is_err());
        assert_eq!(QualityTier::default(), QualityTier::Medium);
    }

    #[test]
    fn test_audio_format_round_trips_through_display() {
        for format in [
            AudioFormat::Wav,
            AudioFormat::Mp3,
            AudioFormat::Ogg,
            AudioFormat::Flac,
        ] {
            assert_eq!(format.to_string().parse::<AudioFormat>().unwrap(), format);
        }
    }
}
