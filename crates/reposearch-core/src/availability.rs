//! Availability flag for remote backends.
//!
//! Written when a request fails with a connection-class error or when a
//! ping succeeds; read only by `ping`, which reports the recovery.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

#[derive(Debug)]
pub struct Availability {
    available: AtomicBool,
}

impl Availability {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Flag the backend as unreachable. Returns true when it was available.
    pub fn mark_unavailable(&self, backend: &str, reason: &str) -> bool {
        let was_available = self.available.swap(false, Ordering::AcqRel);
        if was_available {
            warn!(backend, reason, "Search backend became unavailable");
        }
        was_available
    }

    /// Flag the backend as reachable. Returns true when this restores it.
    pub fn mark_available(&self) -> bool {
        !self.available.swap(true, Ordering::AcqRel)
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_and_restore() {
        let flag = Availability::new();
        assert!(flag.is_available());
        assert!(!flag.mark_available());

        assert!(flag.mark_unavailable("elastic", "connection refused"));
        assert!(!flag.mark_unavailable("elastic", "connection refused"));
        assert!(!flag.is_available());

        assert!(flag.mark_available());
        assert!(flag.is_available());
        assert!(!flag.mark_available());
    }
}
