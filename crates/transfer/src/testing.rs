//! Test doubles shared by the state machine and driver tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use crate::machine::{PhaseFuture, PhaseTransport};
use crate::types::{PhaseAction, PhaseCall, SessionId, UploadSession, UploadTarget};

#[derive(Debug, thiserror::Error)]
#[error("remote rejected {0}")]
pub struct FakeError(pub PhaseAction);

/// Owned copy of a [`PhaseCall`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub action: PhaseAction,
    pub session_id: SessionId,
    pub path: String,
    pub offset: u64,
    pub payload: Option<Bytes>,
}

/// In-memory upload endpoint.
///
/// Acknowledges `offset + payload length` unless scripted replies are
/// queued, fails the n-th call of a given action on request, and panics
/// if a second call arrives while one is still pending.
pub struct FakeTransport {
    calls: Mutex<Vec<RecordedCall>>,
    replies: Mutex<VecDeque<Option<u64>>>,
    failures: Vec<(PhaseAction, usize)>,
    in_flight: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            failures: Vec::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues offsets returned by the next START/CONTINUE calls.
    pub fn with_offsets(self, offsets: Vec<u64>) -> Self {
        self.with_replies(offsets.into_iter().map(Some).collect())
    }

    /// Queues raw replies; `None` is a response without an offset.
    pub fn with_replies(self, replies: Vec<Option<u64>>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    /// Fails the `nth` (zero-based) call of `action`.
    pub fn fail_on(mut self, action: PhaseAction, nth: usize) -> Self {
        self.failures.push((action, nth));
        self
    }

    /// Flag raised while a call is pending.
    pub fn in_flight(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_flight)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, action: PhaseAction) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.action == action)
            .count()
    }
}

impl PhaseTransport for FakeTransport {
    type Error = FakeError;

    fn request<'a>(&'a self, call: PhaseCall<'a>) -> PhaseFuture<'a, FakeError> {
        Box::pin(async move {
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "phase call issued while another was in flight"
            );
            // Suspend so overlapping callers would be observed.
            tokio::task::yield_now().await;

            let nth = self.count(call.action);
            let len = call.payload.as_ref().map_or(0, |p| p.len() as u64);
            self.calls.lock().unwrap().push(RecordedCall {
                action: call.action,
                session_id: call.session_id,
                path: call.path.to_string(),
                offset: call.offset,
                payload: call.payload.clone(),
            });

            let result = if self.failures.contains(&(call.action, nth)) {
                Err(FakeError(call.action))
            } else {
                match call.action {
                    PhaseAction::Start | PhaseAction::Continue => {
                        let scripted = self.replies.lock().unwrap().pop_front();
                        Ok(scripted.unwrap_or(Some(call.offset + len)))
                    }
                    PhaseAction::Finish | PhaseAction::Cancel => Ok(None),
                }
            };

            self.in_flight.store(false, Ordering::SeqCst);
            result
        })
    }
}

/// Session uploading `/Docs/upload.bin`.
pub fn session(total_size: u64, chunk_size: u64) -> UploadSession {
    let target = UploadTarget::new("/sites/Team", "Docs", "upload.bin").unwrap();
    UploadSession::new(target, total_size, chunk_size)
}
