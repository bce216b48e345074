//! Registry of in-flight operations
//!
//! Every accepted operation gets an [`OperationHandle`] holding its own
//! [`CancellationToken`]. Handles are grouped by [`OperationKey`]; several
//! handles may share a key when a client starts the same task twice before the
//! first run finishes. All bookkeeping happens under one lock so that
//! registration, removal and cancellation are atomic with respect to each
//! other. The build tool work itself never runs under that lock.

use gradle_tasks_core::{CancellationToken, OperationKey, OperationState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

struct HandleInner {
    id: u64,
    key: OperationKey,
    token: CancellationToken,
    state: AtomicU8,
}

/// Shared reference to one registered operation
#[derive(Clone)]
pub struct OperationHandle {
    inner: Arc<HandleInner>,
}

impl OperationHandle {
    fn new(id: u64, key: OperationKey) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                key,
                token: CancellationToken::new(),
                state: AtomicU8::new(OperationState::Pending.as_u8()),
            }),
        }
    }

    /// Process-unique id, used for logging and removal
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn key(&self) -> &OperationKey {
        &self.inner.key
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Move from `Pending` to a terminal state. Only the first call wins.
    fn resolve(&self, state: OperationState) -> bool {
        debug_assert!(state.is_terminal());
        self.inner
            .state
            .compare_exchange(
                OperationState::Pending.as_u8(),
                state.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("state", &self.state())
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish()
    }
}

/// Concurrency-safe table of pending operations
#[derive(Default)]
pub struct OperationRegistry {
    operations: Mutex<HashMap<OperationKey, Vec<OperationHandle>>>,
    next_id: AtomicU64,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending operation under `key` with a fresh token.
    ///
    /// Never fails. Existing handles under the same key are left untouched.
    pub fn register(&self, key: OperationKey) -> OperationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = OperationHandle::new(id, key.clone());
        self.operations
            .lock()
            .entry(key)
            .or_default()
            .push(handle.clone());
        tracing::debug!(operation_id = id, key = %handle.key(), "Registered operation");
        handle
    }

    /// Remove `handle`. Returns `false` if it was already gone.
    pub fn unregister(&self, handle: &OperationHandle) -> bool {
        let mut operations = self.operations.lock();
        Self::remove_locked(&mut operations, handle)
    }

    /// Record the terminal state of `handle` and remove it in one step.
    ///
    /// Returns `false` if the handle had already been resolved or removed;
    /// the recorded state is then left as it was.
    pub fn finish(&self, handle: &OperationHandle, state: OperationState) -> bool {
        let mut operations = self.operations.lock();
        let resolved = handle.resolve(state);
        let removed = Self::remove_locked(&mut operations, handle);
        resolved && removed
    }

    fn remove_locked(
        operations: &mut HashMap<OperationKey, Vec<OperationHandle>>,
        handle: &OperationHandle,
    ) -> bool {
        let Some(handles) = operations.get_mut(handle.key()) else {
            return false;
        };
        let before = handles.len();
        handles.retain(|h| h.id() != handle.id());
        let removed = handles.len() != before;
        if handles.is_empty() {
            operations.remove(handle.key());
        }
        removed
    }

    /// Signal every pending operation registered under `key`.
    ///
    /// Returns how many tokens were signalled; zero is not an error.
    pub fn cancel_by_key(&self, key: &OperationKey) -> usize {
        let operations = self.operations.lock();
        let Some(handles) = operations.get(key) else {
            tracing::debug!(key = %key, "No running operation to cancel");
            return 0;
        };
        for handle in handles {
            handle.token().signal();
        }
        tracing::info!(key = %key, count = handles.len(), "Cancellation requested");
        handles.len()
    }

    /// Signal every pending operation whose key satisfies `predicate`
    pub fn cancel_all<P>(&self, predicate: P) -> usize
    where
        P: Fn(&OperationKey) -> bool,
    {
        let operations = self.operations.lock();
        let mut count = 0;
        for (key, handles) in operations.iter() {
            if !predicate(key) {
                continue;
            }
            for handle in handles {
                handle.token().signal();
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(count, "Bulk cancellation requested");
        }
        count
    }

    /// Keys of all pending operations, one entry per handle.
    ///
    /// Diagnostics only: the registry may change as soon as this returns.
    pub fn snapshot(&self) -> Vec<OperationKey> {
        self.operations
            .lock()
            .iter()
            .flat_map(|(key, handles)| std::iter::repeat(key.clone()).take(handles.len()))
            .collect()
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.operations.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }
}
