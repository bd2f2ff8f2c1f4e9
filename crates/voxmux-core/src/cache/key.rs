use crate::request::SynthesisRequest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use voxmux_speech::{AudioFormat, QualityTier};

/// Backend component of the key when the request carries no hint
pub const AUTO_BACKEND: &str = "auto";

/// Sample-rate component of the key when the request leaves it to the backend
pub const NATIVE_RATE: &str = "native";

/// Content address of a synthesis result
///
/// Hex-encoded SHA-256 over length-prefixed fields, so `("ab", "c")` and
/// `("a", "bc")` never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key at the backend's native sample rate
    pub fn compute(
        text: &str,
        voice_id: &str,
        backend: &str,
        quality: QualityTier,
        format: AudioFormat,
    ) -> Self {
        Self::compute_at_rate(text, voice_id, backend, quality, format, None)
    }

    pub fn compute_at_rate(
        text: &str,
        voice_id: &str,
        backend: &str,
        quality: QualityTier,
        format: AudioFormat,
        sample_rate: Option<u32>,
    ) -> Self {
        let rate = sample_rate.map(|hz| hz.to_string());
        let rate = rate.as_deref().unwrap_or(NATIVE_RATE);

        let mut hasher = Sha256::new();
        for field in [text, voice_id, backend, quality.as_str(), format.as_str(), rate] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }

    /// Key for `request`, using its backend hint or [`AUTO_BACKEND`]
    pub fn for_request(request: &SynthesisRequest) -> Self {
        Self::compute_at_rate(
            request.text(),
            request.voice_id(),
            request.backend_hint().unwrap_or(AUTO_BACKEND),
            request.quality(),
            request.format(),
            request.sample_rate(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a key previously produced by [`CacheKey::compute`]
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()))
            .then(|| CacheKey(s.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_requests_share_a_key() {
        let a = SynthesisRequest::new("Hello", "v1");
        let b = SynthesisRequest::new("Hello", "v1");
        assert_eq!(CacheKey::for_request(&a), CacheKey::for_request(&b));
    }

    #[test]
    fn test_every_field_changes_the_key() {
        let base = CacheKey::compute("Hello", "v1", "edge", QualityTier::Medium, AudioFormat::Wav);
        let variants = [
            CacheKey::compute("Hello!", "v1", "edge", QualityTier::Medium, AudioFormat::Wav),
            CacheKey::compute("Hello", "v2", "edge", QualityTier::Medium, AudioFormat::Wav),
            CacheKey::compute("Hello", "v1", "piper", QualityTier::Medium, AudioFormat::Wav),
            CacheKey::compute("Hello", "v1", "edge", QualityTier::High, AudioFormat::Wav),
            CacheKey::compute("Hello", "v1", "edge", QualityTier::Medium, AudioFormat::Mp3),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = CacheKey::compute("ab", "c", "edge", QualityTier::Medium, AudioFormat::Wav);
        let b = CacheKey::compute("a", "bc", "edge", QualityTier::Medium, AudioFormat::Wav);
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_hint_uses_auto() {
        let request = SynthesisRequest::new("Hello", "v1");
        let expected =
            CacheKey::compute("Hello", "v1", AUTO_BACKEND, QualityTier::Medium, AudioFormat::Wav);
        assert_eq!(CacheKey::for_request(&request), expected);

        let hinted = request.with_backend_hint("edge");
        assert_ne!(CacheKey::for_request(&hinted), expected);
    }

    #[test]
    fn test_sample_rate_changes_the_key() {
        let request = SynthesisRequest::new("Hello", "v1");
        let native = CacheKey::for_request(&request);
        let low = CacheKey::for_request(&request.clone().with_sample_rate(16_000));
        let high = CacheKey::for_request(&request.with_sample_rate(44_100));

        assert_ne!(native, low);
        assert_ne!(native, high);
        assert_ne!(low, high);
        assert_eq!(
            low,
            CacheKey::compute_at_rate(
                "Hello",
                "v1",
                AUTO_BACKEND,
                QualityTier::Medium,
                AudioFormat::Wav,
                Some(16_000)
            )
        );
    }

    #[test]
    fn test_parse_accepts_only_digests() {
        let key = CacheKey::compute("Hello", "v1", "auto", QualityTier::Low, AudioFormat::Wav);
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(CacheKey::parse(key.as_str()), Some(key));
        assert_eq!(CacheKey::parse("../etc/passwd"), None);
        assert_eq!(CacheKey::parse(&"A".repeat(64)), None);
    }
}
