//! Snoop subscription state shared between a producer and the router
//!
//! A driver, external driver or remote connection registers what it
//! snoops by sending `getProperties`; the router reads this state when
//! fanning out def/set/message/delProperty traffic. Vector-level
//! subscriptions may carry a timer so lost subscriptions are
//! re-established.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SnoopTimer {
    timeout: Duration,
    last_heard: Instant,
}

/// One producer's snoop subscriptions: everything, whole devices, or
/// single vectors.
#[derive(Debug, Default)]
pub(crate) struct SnoopState {
    all: AtomicBool,
    devices: Mutex<HashSet<String>>,
    vectors: Mutex<HashMap<(String, String), Option<SnoopTimer>>>,
}

impl SnoopState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all traffic.
    pub(crate) fn set_all(&self) {
        self.all.store(true, Ordering::Relaxed);
    }

    /// Subscribe to one device.
    pub(crate) fn add_device(&self, device: &str) {
        self.devices
            .lock()
            .expect("snoop devices lock")
            .insert(device.to_string());
    }

    /// Subscribe to one vector, re-requesting every `timeout` unless
    /// traffic for it is heard.
    pub(crate) fn add_vector(&self, device: &str, name: &str, timeout: Option<Duration>) {
        self.vectors
            .lock()
            .expect("snoop vectors lock")
            .insert(
                (device.to_string(), name.to_string()),
                timeout.map(|timeout| SnoopTimer {
                    timeout,
                    last_heard: Instant::now(),
                }),
            );
    }

    /// Record a subscription learned from a `getProperties` element
    /// this producer emitted.
    pub(crate) fn record_get_properties(&self, device: Option<&str>, name: Option<&str>) {
        match (device, name) {
            (None, _) => self.set_all(),
            (Some(device), None) => self.add_device(device),
            (Some(device), Some(name)) => {
                // do not clobber an existing timer
                let mut vectors = self.vectors.lock().expect("snoop vectors lock");
                vectors
                    .entry((device.to_string(), name.to_string()))
                    .or_insert(None);
            }
        }
    }

    /// Does this producer want the element for `(device, name)`?
    pub(crate) fn matches(&self, device: Option<&str>, name: Option<&str>) -> bool {
        if self.all.load(Ordering::Relaxed) {
            return true;
        }
        let Some(device) = device else {
            return false;
        };
        if self
            .devices
            .lock()
            .expect("snoop devices lock")
            .contains(device)
        {
            return true;
        }
        let Some(name) = name else {
            return false;
        };
        self.vectors
            .lock()
            .expect("snoop vectors lock")
            .contains_key(&(device.to_string(), name.to_string()))
    }

    /// Reset the timer for `(device, name)` because traffic arrived.
    pub(crate) fn note_heard(&self, device: &str, name: &str) {
        if let Some(Some(timer)) = self
            .vectors
            .lock()
            .expect("snoop vectors lock")
            .get_mut(&(device.to_string(), name.to_string()))
        {
            timer.last_heard = Instant::now();
        }
    }

    /// Timed subscriptions whose window expired; their timers restart
    /// so at most one re-request goes out per window.
    pub(crate) fn due(&self) -> Vec<(String, String)> {
        let mut expired = Vec::new();
        let mut vectors = self.vectors.lock().expect("snoop vectors lock");
        for (key, timer) in vectors.iter_mut() {
            if let Some(timer) = timer {
                if timer.last_heard.elapsed() > timer.timeout {
                    timer.last_heard = Instant::now();
                    expired.push(key.clone());
                }
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_levels() {
        let state = SnoopState::new();
        assert!(!state.matches(Some("Thermostat"), Some("temperaturevector")));

        state.add_vector("Thermostat", "temperaturevector", None);
        assert!(state.matches(Some("Thermostat"), Some("temperaturevector")));
        assert!(!state.matches(Some("Thermostat"), Some("othervector")));
        assert!(!state.matches(Some("Thermostat"), None));

        state.add_device("Dome");
        assert!(state.matches(Some("Dome"), None));
        assert!(state.matches(Some("Dome"), Some("anything")));

        state.set_all();
        assert!(state.matches(None, None));
    }

    #[test]
    fn test_due_respects_window() {
        let state = SnoopState::new();
        state.add_vector("A", "v", Some(Duration::from_millis(10)));
        assert!(state.due().is_empty(), "window has not elapsed yet");
        std::thread::sleep(Duration::from_millis(20));
        let due = state.due();
        assert_eq!(due, vec![("A".to_string(), "v".to_string())]);
        assert!(state.due().is_empty(), "timer restarted after firing");
    }

    #[test]
    fn test_note_heard_defers_expiry() {
        let state = SnoopState::new();
        state.add_vector("A", "v", Some(Duration::from_millis(30)));
        std::thread::sleep(Duration::from_millis(20));
        state.note_heard("A", "v");
        std::thread::sleep(Duration::from_millis(20));
        assert!(state.due().is_empty(), "heard traffic reset the window");
    }

    #[test]
    fn test_record_get_properties_keeps_timer() {
        let state = SnoopState::new();
        state.add_vector("A", "v", Some(Duration::from_millis(5)));
        state.record_get_properties(Some("A"), Some("v"));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(state.due().len(), 1, "re-recording must not drop the timer");
    }
}
