//! Hand-rolled fakes for the four collaborator traits, used throughout this
//! crate's own test modules and reusable by a host application's
//! integration tests behind the `test-util` feature.
//!
//! None of these are mocks generated by a macro -- each is a small, explicit
//! stand-in so the scenario being tested (a fast-forwarded retry, a seeded
//! cache hit, a programmed dispatcher failure) reads directly in the test
//! body rather than behind `expect()` call chains.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::cache::{Cache, CacheError};
use crate::clock::Clock;
use crate::dispatcher::{DispatchError, ServiceDispatcher};
use crate::flags::{FlagContext, FlagEvaluator};

// ---------------------------------------------------------------------------
// FakeClock
// ---------------------------------------------------------------------------

/// A `Clock` that never advances on its own. `sleep` records the requested
/// duration and advances `now()` by exactly that much, so retry-interval
/// assertions can compare against `sleeps()` without real wall-clock delay.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every duration slept so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Move `now()` forward without going through `sleep` (e.g. to simulate
    /// time passing during a dispatch call).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

// ---------------------------------------------------------------------------
// FakeCache
// ---------------------------------------------------------------------------

/// An in-memory `Cache`. TTLs are recorded but never expire entries --
/// the engine does no expiration bookkeeping of its own (§4.2), so tests
/// that care about expiry exercise the backend directly, not this fake.
pub struct FakeCache {
    entries: DashMap<String, Value>,
    fail_gets_for: Mutex<Vec<String>>,
}

impl FakeCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            fail_gets_for: Mutex::new(Vec::new()),
        }
    }

    /// Pre-populate an entry as if a prior `put` had succeeded.
    pub fn seed(&self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    /// Make the next `get(key)` return `Err` instead of a hit/miss, to
    /// exercise the "Get errors are treated as misses" rule (§4.2).
    pub fn fail_next_get(&self, key: &str) {
        self.fail_gets_for.lock().unwrap().push(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl Default for FakeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for FakeCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut failing = self.fail_gets_for.lock().unwrap();
        if let Some(pos) = failing.iter().position(|k| k == key) {
            failing.remove(pos);
            return Err(CacheError("simulated backend failure".to_string()));
        }
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, value: Value, _ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeDispatcher
// ---------------------------------------------------------------------------

enum Scripted {
    Success(Value),
    Failure(DispatchError),
}

struct ScriptedEntry {
    response: Scripted,
    delay: Duration,
}

/// A `ServiceDispatcher` driven by a queue of scripted responses, consumed
/// in order regardless of which `(service, action)` pair is invoked --
/// sufficient for the single-service scenarios this engine's own tests
/// exercise. `call_count` lets a test assert the dispatcher was never
/// reached (e.g. a skipped or cache-hit step).
pub struct FakeDispatcher {
    responses: Mutex<VecDeque<ScriptedEntry>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_success(&self, value: Value) {
        self.responses.lock().unwrap().push_back(ScriptedEntry {
            response: Scripted::Success(value),
            delay: Duration::ZERO,
        });
    }

    pub fn push_failure(&self, error: DispatchError) {
        self.responses.lock().unwrap().push_back(ScriptedEntry {
            response: Scripted::Failure(error),
            delay: Duration::ZERO,
        });
    }

    /// Like `push_success`, but `invoke` sleeps `delay` (via `tokio::time`,
    /// independent of any injected `Clock`) before returning -- used to
    /// simulate a slow downstream call racing a workflow-level timeout under
    /// `#[tokio::test(start_paused = true)]`.
    pub fn push_success_after(&self, delay: Duration, value: Value) {
        self.responses.lock().unwrap().push_back(ScriptedEntry {
            response: Scripted::Success(value),
            delay,
        });
    }

    /// Like `push_failure`, with an artificial delay before responding.
    pub fn push_failure_after(&self, delay: Duration, error: DispatchError) {
        self.responses.lock().unwrap().push_back(ScriptedEntry {
            response: Scripted::Failure(error),
            delay,
        });
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for FakeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDispatcher for FakeDispatcher {
    async fn invoke(
        &self,
        service: &str,
        action: &str,
        _input: Value,
        _deadline: Duration,
    ) -> Result<Value, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((service.to_string(), action.to_string()));

        let entry = self.responses.lock().unwrap().pop_front();
        match entry {
            Some(ScriptedEntry { response, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match response {
                    Scripted::Success(value) => Ok(value),
                    Scripted::Failure(error) => Err(error),
                }
            }
            None => Err(DispatchError::validation(
                "NO_SCRIPTED_RESPONSE",
                format!("FakeDispatcher has no scripted response for {service}.{action}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeFlagEvaluator
// ---------------------------------------------------------------------------

/// A `FlagEvaluator` returning a fixed boolean for every key, or a per-key
/// override.
pub struct FakeFlagEvaluator {
    default: bool,
    overrides: DashMap<String, bool>,
}

impl FakeFlagEvaluator {
    pub fn always(enabled: bool) -> Self {
        Self {
            default: enabled,
            overrides: DashMap::new(),
        }
    }

    pub fn set(&self, key: &str, enabled: bool) {
        self.overrides.insert(key.to_string(), enabled);
    }
}

impl FlagEvaluator for FakeFlagEvaluator {
    async fn enabled(&self, key: &str, _context: &FlagContext) -> bool {
        self.overrides.get(key).map(|v| *v).unwrap_or(self.default)
    }
}
