//! In-process transport that never touches the network.
//!
//! Operations stay pending until the caller completes them, which makes the
//! transport useful for deterministic tests and for simulating restarts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use tokio::sync::mpsc;

use super::{
    Completion, OperationHandle, OperationId, Outcome, RequestDescriptor, StartError, Transport,
};
use crate::job::Phase;

type Responder = dyn Fn(&RequestDescriptor) -> Outcome + Send + Sync;

struct PendingOperation {
    phase: Phase,
    progress: Option<f64>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    started: Vec<(OperationId, RequestDescriptor)>,
    pending: HashMap<OperationId, PendingOperation>,
    cancelled: Vec<OperationId>,
    rejections: VecDeque<StartError>,
}

#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Mutex<Inner>>,
    responder: Option<(Arc<Responder>, mpsc::UnboundedSender<Completion>)>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that answers every request immediately with `responder`,
    /// delivering the outcomes on the returned channel.
    pub fn scripted<F>(responder: F) -> (Self, mpsc::UnboundedReceiver<Completion>)
    where
        F: Fn(&RequestDescriptor) -> Outcome + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::default(),
            responder: Some((Arc::new(responder), tx)),
        };
        (transport, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("In-memory transport lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Makes the next `start` call fail with `error`.
    pub fn reject_next_start(&self, error: StartError) {
        self.lock().rejections.push_back(error);
    }

    /// Drops an operation without delivering a completion, as if the
    /// system discarded it while the host was not running.
    pub fn forget(&self, id: &OperationId) {
        self.lock().pending.remove(id);
    }

    pub fn set_progress(&self, id: &OperationId, fraction: f64) {
        if let Some(op) = self.lock().pending.get_mut(id) {
            op.progress = Some(fraction.clamp(0.0, 1.0));
        }
    }

    /// Finishes a pending operation and returns the completion to feed to
    /// the job, or `None` if the operation is unknown or was cancelled.
    pub fn complete(&self, id: &OperationId, outcome: Outcome) -> Option<Completion> {
        self.lock()
            .pending
            .remove(id)
            .map(|_| (id.clone(), outcome))
    }

    /// Every request started so far, in order.
    pub fn started(&self) -> Vec<(OperationId, RequestDescriptor)> {
        self.lock().started.clone()
    }

    pub fn last_started(&self) -> Option<(OperationId, RequestDescriptor)> {
        self.lock().started.last().cloned()
    }

    pub fn cancelled(&self) -> Vec<OperationId> {
        self.lock().cancelled.clone()
    }

    /// Number of operations still awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

impl Transport for InMemoryTransport {
    fn start(&self, request: RequestDescriptor) -> Result<OperationId, StartError> {
        let id = {
            let mut inner = self.lock();
            if let Some(error) = inner.rejections.pop_front() {
                return Err(error);
            }

            inner.next_id += 1;
            let id = OperationId::new(format!("op-{}", inner.next_id));
            inner.pending.insert(
                id.clone(),
                PendingOperation {
                    phase: request.phase(),
                    progress: None,
                },
            );
            inner.started.push((id.clone(), request.clone()));
            id
        };

        if let Some((responder, tx)) = &self.responder {
            let outcome = responder(&request);
            if let Some(completion) = self.complete(&id, outcome) {
                // The receiver may already be gone when the host shut down.
                let _ = tx.send(completion);
            }
        }

        Ok(id)
    }

    fn lookup(&self, id: &OperationId) -> Option<OperationHandle> {
        self.lock().pending.get(id).map(|op| OperationHandle {
            id: id.clone(),
            phase: op.phase,
        })
    }

    fn cancel(&self, id: &OperationId) {
        let mut inner = self.lock();
        if inner.pending.remove(id).is_some() {
            inner.cancelled.push(id.clone());
        }
    }

    fn progress(&self, id: &OperationId) -> Option<f64> {
        self.lock().pending.get(id).and_then(|op| op.progress)
    }
}
