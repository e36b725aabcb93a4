//! Scripted call dispatcher for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::dispatch::{CallDispatcher, DispatchError};

/// One canned response.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Fail(DispatchError),
    /// Sleep, then succeed.
    Slow(Duration, Value),
    Panic,
}

/// Replays scripted replies per endpoint and records every call.
///
/// Scripted replies are consumed in order; once a script runs dry the
/// endpoint's default reply (if any) is used.
#[derive(Debug, Default)]
pub struct ScriptedDispatcher {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    defaults: HashMap<String, Reply>,
    calls: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply the same way every time.
    pub fn always(mut self, endpoint: impl Into<String>, reply: Reply) -> Self {
        self.defaults.insert(endpoint.into(), reply);
        self
    }

    /// Reply with `replies` in order.
    pub fn script(mut self, endpoint: impl Into<String>, replies: Vec<Reply>) -> Self {
        self.scripts
            .get_mut()
            .unwrap()
            .insert(endpoint.into(), replies.into());
        self
    }

    /// Every `(endpoint, payload)` seen, in call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .count()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self, endpoint: &str) -> Reply {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        scripted
            .or_else(|| self.defaults.get(endpoint).cloned())
            .unwrap_or_else(|| {
                Reply::Fail(DispatchError::Transport(format!(
                    "no scripted reply for {endpoint}"
                )))
            })
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CallDispatcher for ScriptedDispatcher {
    fn call<'a>(
        &'a self,
        endpoint: &'a str,
        payload: &'a Value,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Value, DispatchError>> {
        async move {
            self.calls
                .lock()
                .unwrap()
                .push((endpoint.to_string(), payload.clone()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            match self.next_reply(endpoint) {
                Reply::Ok(value) => Ok(value),
                Reply::Fail(err) => Err(err),
                Reply::Slow(delay, value) => {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                }
                Reply::Panic => panic!("scripted dispatcher panic"),
            }
        }
        .boxed()
    }
}
