//! Host capability probe.

/// Reports whether the host exposes HID-style device access.
///
/// Implementations must be side-effect free and must not fail.
pub trait CapabilityProbe: Send + Sync {
    /// Returns true if HID devices can be requested and opened.
    fn is_available(&self) -> bool;
}

/// A capability probe with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCapability(pub bool);

impl StaticCapability {
    /// HID access is available.
    pub const AVAILABLE: Self = Self(true);

    /// HID access is not available.
    pub const UNAVAILABLE: Self = Self(false);
}

impl CapabilityProbe for StaticCapability {
    fn is_available(&self) -> bool {
        self.0
    }
}

impl<F> CapabilityProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_available(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_static_capability() {
        assert!(StaticCapability::AVAILABLE.is_available());
        assert!(!StaticCapability::UNAVAILABLE.is_available());
    }

    #[test]
    fn test_closure_capability_follows_host_state() {
        let flag = Arc::new(AtomicBool::new(false));
        let probe = {
            let flag = Arc::clone(&flag);
            move || flag.load(Ordering::SeqCst)
        };

        assert!(!probe.is_available());
        flag.store(true, Ordering::SeqCst);
        assert!(probe.is_available());
    }
}
