use crate::config::RoutingConfig;
use crate::error::SynthesisError;
use crate::registry::{BackendDescriptor, RegistrySnapshot};
use crate::request::SynthesisRequest;
use std::cmp::Ordering;
use voxmux_speech::AudioFormat;

/// Chooses a backend for a request from a registry snapshot
///
/// Selection is a pure function of the routing table, the request, the
/// snapshot and the backends already tried.
#[derive(Clone, Debug, Default)]
pub struct BackendSelector {
    routing: RoutingConfig,
}

impl BackendSelector {
    pub fn new(routing: RoutingConfig) -> Self {
        Self { routing }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Name of the backend to try next, skipping those in `excluded`
    ///
    /// Only backends producing the requested format are candidates.
    pub fn select(
        &self,
        request: &SynthesisRequest,
        snapshot: &RegistrySnapshot,
        excluded: &[String],
    ) -> Result<String, SynthesisError> {
        let format = request.format();
        Self::check_format(format, snapshot)?;

        if let Some(hint) = request.backend_hint() {
            if let Some(backend) = usable(snapshot, excluded, hint, format) {
                return Ok(backend.name.clone());
            }
            log::debug!("Backend hint '{hint}' not usable, falling back to routing order");
        }

        let mut best: Option<&BackendDescriptor> = None;
        for name in self.routing.order_for(request.quality()) {
            let Some(candidate) = usable(snapshot, excluded, name, format) else {
                continue;
            };
            // Strictly lower load only, so earlier entries win ties
            best = match best {
                Some(current) if compare_load(candidate, current) != Ordering::Less => {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }

        best.map(|b| b.name.clone())
            .ok_or(SynthesisError::NoBackendAvailable)
    }

    /// Reject a format no registered backend produces, whatever its state
    pub fn check_format(
        format: AudioFormat,
        snapshot: &RegistrySnapshot,
    ) -> Result<(), SynthesisError> {
        if snapshot.backends.iter().any(|b| b.supports(format)) {
            Ok(())
        } else {
            Err(SynthesisError::Validation(format!(
                "no registered backend produces {format} audio"
            )))
        }
    }
}

/// Enabled, healthy, producing `format` and not yet tried
fn usable<'a>(
    snapshot: &'a RegistrySnapshot,
    excluded: &[String],
    name: &str,
    format: AudioFormat,
) -> Option<&'a BackendDescriptor> {
    if excluded.iter().any(|e| e == name) {
        return None;
    }
    snapshot
        .get(name)
        .filter(|b| b.is_available() && b.supports(format))
}

/// Compare `queue_depth / max_concurrency` without floating point
fn compare_load(a: &BackendDescriptor, b: &BackendDescriptor) -> Ordering {
    let lhs = a.queue_depth as u128 * b.max_concurrency.max(1) as u128;
    let rhs = b.queue_depth as u128 * a.max_concurrency.max(1) as u128;
    lhs.cmp(&rhs)
}
