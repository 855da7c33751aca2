use std::collections::HashSet;
use std::sync::Mutex;

use super::error::ClientError;

/// Per-session busy flags: at most one request in flight per action.
#[derive(Debug, Default)]
pub struct ActionGuard {
    in_flight: Mutex<HashSet<&'static str>>,
}

impl ActionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `action` busy until the returned token is dropped.
    pub fn begin(&self, action: &'static str) -> Result<InFlight<'_>, ClientError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(action) {
            return Err(ClientError::Busy(action));
        }
        Ok(InFlight { guard: self, action })
    }

    pub fn is_busy(&self, action: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(action)
    }
}

#[derive(Debug)]
pub struct InFlight<'a> {
    guard: &'a ActionGuard,
    action: &'static str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_rejected_until_release() {
        let guard = ActionGuard::new();
        let first = guard.begin("ship").unwrap();
        assert!(guard.is_busy("ship"));
        assert!(matches!(guard.begin("ship"), Err(ClientError::Busy("ship"))));
        assert!(guard.begin("cancel").is_ok());
        drop(first);
        assert!(!guard.is_busy("ship"));
        assert!(guard.begin("ship").is_ok());
    }
}
