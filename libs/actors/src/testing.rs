//! Test doubles for the local runtime seam
//!
//! [`RecordingRuntime`] implements [`LocalRuntime`] without running anything:
//! it records every create, dispatch and destroy so tests can assert on the
//! exact sequence the slave role produced.

use crate::local::{LocalRuntime, ReplySink, RuntimeError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One call observed by [`RecordingRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Created { uuid: String, type_name: String },
    Dispatched { uuid: String, behavior: String, payload: Bytes },
    Destroyed { uuid: String },
}

/// Move-only handle issued by [`RecordingRuntime`]
#[derive(Debug)]
pub struct RecordingHandle {
    id: u64,
    uuid: String,
}

/// Local runtime that only records what it is asked to do
pub struct RecordingRuntime {
    types: HashSet<String>,
    events: Mutex<Vec<RuntimeEvent>>,
    live: Mutex<HashSet<u64>>,
    pending: Mutex<HashMap<u64, usize>>,
    sinks: Mutex<HashMap<String, ReplySink>>,
    next_id: AtomicU64,
    fail_creates: AtomicBool,
}

impl RecordingRuntime {
    /// Runtime that knows the given actor type names
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            events: Mutex::new(Vec::new()),
            live: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fail_creates: AtomicBool::new(false),
        }
    }

    /// Make every following creation fail with an allocation error
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().clone()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Reply sink handed to the actor created for `uuid`
    pub fn reply_sink(&self, uuid: &str) -> Option<ReplySink> {
        self.sinks.lock().get(uuid).cloned()
    }

    /// Wait until at least `count` events were recorded
    pub async fn wait_for_events(&self, count: usize) -> Vec<RuntimeEvent> {
        eventually(|| self.events.lock().len() >= count).await;
        self.events()
    }
}

impl LocalRuntime for RecordingRuntime {
    type Handle = RecordingHandle;

    fn create_actor(
        &self,
        type_name: &str,
        replies: ReplySink,
    ) -> Result<RecordingHandle, RuntimeError> {
        if !self.types.contains(type_name) {
            return Err(RuntimeError::UnknownType {
                type_name: type_name.to_string(),
            });
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(RuntimeError::Allocation {
                message: "allocation refused".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let uuid = replies.uuid().to_string();
        self.live.lock().insert(id);
        self.sinks.lock().insert(uuid.clone(), replies);
        self.events.lock().push(RuntimeEvent::Created {
            uuid: uuid.clone(),
            type_name: type_name.to_string(),
        });
        Ok(RecordingHandle { id, uuid })
    }

    fn destroy_actor(&self, handle: RecordingHandle) {
        assert!(self.live.lock().remove(&handle.id), "actor handle released twice");
        self.pending.lock().remove(&handle.id);
        self.sinks.lock().remove(&handle.uuid);
        self.events
            .lock()
            .push(RuntimeEvent::Destroyed { uuid: handle.uuid });
    }

    fn dispatch(&self, handle: &RecordingHandle, behavior: &str, payload: Bytes) {
        *self.pending.lock().entry(handle.id).or_insert(0) += 1;
        self.events.lock().push(RuntimeEvent::Dispatched {
            uuid: handle.uuid.clone(),
            behavior: behavior.to_string(),
            payload,
        });
    }

    fn pending_message_count(&self, handle: &RecordingHandle) -> usize {
        self.pending.lock().get(&handle.id).copied().unwrap_or(0)
    }
}

/// Poll `condition` until it holds or two seconds pass; returns the final result
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Run `future` with a five second ceiling, panicking on expiry
pub async fn within<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(output) => output,
        Err(_) => panic!("operation timed out"),
    }
}
