use std::fmt;

/// Lifecycle of a synthesis request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    Received,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Joining,
    Selecting,
    Queued,
    Dispatched,
    Synthesizing,
    CacheWrite,
    Complete,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Complete | RequestState::Failed)
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, CacheCheck)
                | (Received, Failed)
                | (CacheCheck, CacheHit)
                | (CacheCheck, CacheMiss)
                | (CacheHit, Complete)
                | (CacheMiss, Joining)
                // Followers finish straight from the shared result
                | (Joining, Selecting)
                | (Joining, Complete)
                | (Joining, Failed)
                | (Selecting, Queued)
                | (Selecting, Failed)
                | (Queued, Dispatched)
                | (Queued, Selecting)
                | (Queued, Failed)
                | (Dispatched, Synthesizing)
                | (Dispatched, Failed)
                | (Synthesizing, CacheWrite)
                | (Synthesizing, Selecting)
                | (Synthesizing, Failed)
                | (CacheWrite, Complete)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Validates and traces the transitions of one request
#[derive(Debug)]
pub(crate) struct RequestTracker {
    label: String,
    state: RequestState,
}

impl RequestTracker {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self::resume(label, RequestState::Received)
    }

    /// Pick up a request already in `state`
    pub(crate) fn resume(label: impl Into<String>, state: RequestState) -> Self {
        Self {
            label: label.into(),
            state,
        }
    }

    pub(crate) fn state(&self) -> RequestState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: RequestState) {
        if !self.state.can_transition_to(next) {
            log::warn!(
                "[{}] unexpected transition {} -> {}",
                self.label,
                self.state,
                next
            );
            debug_assert!(false, "invalid transition {} -> {}", self.state, next);
        }
        log::trace!("[{}] {} -> {}", self.label, self.state, next);
        self.state = next;
    }

    /// Move to `Failed` unless already terminal
    pub(crate) fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(RequestState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequestState::*;
    use super::*;

    #[test]
    fn test_cache_hit_path() {
        let mut tracker = RequestTracker::new("req");
        for next in [CacheCheck, CacheHit, Complete] {
            tracker.advance(next);
        }
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn test_synthesis_path_with_retry() {
        let mut tracker = RequestTracker::new("req");
        for next in [
            CacheCheck,
            CacheMiss,
            Joining,
            Selecting,
            Queued,
            Dispatched,
            Synthesizing,
            Selecting,
            Queued,
            Dispatched,
            Synthesizing,
            CacheWrite,
            Complete,
        ] {
            tracker.advance(next);
        }
        assert_eq!(tracker.state(), Complete);
    }

    #[test]
    fn test_failed_is_reachable_from_work_states() {
        for state in [Selecting, Queued, Dispatched, Synthesizing] {
            assert!(state.can_transition_to(Failed), "{state}");
        }
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for next in [Received, CacheCheck, Selecting, Complete, Failed] {
            assert!(!Complete.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_cache_write_never_fails() {
        assert!(!CacheWrite.can_transition_to(Failed));
    }

    #[test]
    fn test_fail_is_idempotent() {
        let mut tracker = RequestTracker::resume("req", Selecting);
        tracker.fail();
        tracker.fail();
        assert_eq!(tracker.state(), Failed);
    }
}
