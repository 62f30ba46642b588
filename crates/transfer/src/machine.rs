//! Upload state machine.
//!
//! Decides which phase call a chunk turns into, issues it, and records
//! the offset the server acknowledged.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::UploadError;
use crate::types::{Phase, PhaseAction, PhaseCall, UploadSession};

/// Future returned by [`PhaseTransport::request`].
pub type PhaseFuture<'a, E> = Pin<Box<dyn Future<Output = Result<Option<u64>, E>> + Send + 'a>>;

/// Issues phase calls against the remote upload endpoint.
///
/// START and CONTINUE resolve to the byte offset the server now holds;
/// FINISH and CANCEL resolve to `None`.
pub trait PhaseTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn request<'a>(&'a self, call: PhaseCall<'a>) -> PhaseFuture<'a, Self::Error>;
}

/// Drives one [`UploadSession`] through START / CONTINUE / FINISH.
///
/// Every method takes `&mut self` and awaits its phase call before
/// returning, so at most one call per session is ever in flight.
#[derive(Debug)]
pub struct UploadMachine {
    session: UploadSession,
}

impl UploadMachine {
    pub fn new(session: UploadSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn into_session(self) -> UploadSession {
        self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Feeds one chunk of the source stream into the session.
    ///
    /// Returns the phase reached. A failed phase call, or a START /
    /// CONTINUE answered without an offset, triggers a best-effort CANCEL,
    /// leaves the session `Failed`, and hands back the original error.
    /// Chunks arriving after a terminal phase are ignored.
    pub async fn on_chunk<T>(
        &mut self,
        transport: &T,
        data: Bytes,
    ) -> Result<Phase, UploadError<T::Error>>
    where
        T: PhaseTransport + ?Sized,
    {
        let step = match self.session.phase() {
            Phase::NotStarted => self.start(transport, data).await,
            Phase::InProgress => self.advance(transport, data).await,
            phase => {
                debug!(session = %self.session.id(), ?phase, "chunk after terminal phase ignored");
                return Ok(phase);
            }
        };

        match step {
            Ok(()) => Ok(self.session.phase()),
            Err(e) => {
                warn!(session = %self.session.id(), error = %e, "phase call failed");
                self.fail(transport).await;
                Err(e)
            }
        }
    }

    /// Abandons the session after an error.
    ///
    /// Issues CANCEL unless the session already settled; a failing CANCEL
    /// is logged and otherwise ignored. The session ends `Failed`.
    pub async fn fail<T>(&mut self, transport: &T)
    where
        T: PhaseTransport + ?Sized,
    {
        if self.session.phase().is_terminal() {
            return;
        }
        if let Err(e) = self.send(transport, PhaseAction::Cancel, None).await {
            warn!(session = %self.session.id(), error = %e, "cancel failed, partial upload may remain");
        }
        self.session.set_phase(Phase::Failed);
    }

    /// Explicitly cancels the remote session.
    ///
    /// Ends `Cancelled` when the server accepted the CANCEL, `Failed`
    /// otherwise. No call is made once the session settled.
    pub async fn cancel<T>(&mut self, transport: &T) -> Result<(), T::Error>
    where
        T: PhaseTransport + ?Sized,
    {
        if self.session.phase().is_terminal() {
            return Ok(());
        }
        match self.send(transport, PhaseAction::Cancel, None).await {
            Ok(_) => {
                self.session.set_phase(Phase::Cancelled);
                Ok(())
            }
            Err(e) => {
                self.session.set_phase(Phase::Failed);
                Err(e)
            }
        }
    }

    async fn start<T>(&mut self, transport: &T, data: Bytes) -> Result<(), UploadError<T::Error>>
    where
        T: PhaseTransport + ?Sized,
    {
        let offset = self
            .send(transport, PhaseAction::Start, Some(data))
            .await
            .map_err(UploadError::Transport)?;
        self.acknowledge(PhaseAction::Start, offset)?;
        self.session.set_phase(Phase::InProgress);

        // START already carried the whole file.
        self.finish_if_complete(transport).await
    }

    async fn advance<T>(&mut self, transport: &T, data: Bytes) -> Result<(), UploadError<T::Error>>
    where
        T: PhaseTransport + ?Sized,
    {
        if self.session.next_chunk_is_last() {
            self.send(transport, PhaseAction::Finish, Some(data))
                .await
                .map_err(UploadError::Transport)?;
            self.session.set_phase(Phase::Finished);
            return Ok(());
        }

        let offset = self
            .send(transport, PhaseAction::Continue, Some(data))
            .await
            .map_err(UploadError::Transport)?;
        self.acknowledge(PhaseAction::Continue, offset)?;

        // A chunk larger than the hint can complete the file on CONTINUE.
        self.finish_if_complete(transport).await
    }

    /// Sends a body-less FINISH once the server holds every byte.
    async fn finish_if_complete<T>(&mut self, transport: &T) -> Result<(), UploadError<T::Error>>
    where
        T: PhaseTransport + ?Sized,
    {
        if self.session.acknowledged() < self.session.total_size() {
            return Ok(());
        }
        self.send(transport, PhaseAction::Finish, None)
            .await
            .map_err(UploadError::Transport)?;
        self.session.set_phase(Phase::Finished);
        Ok(())
    }

    async fn send<T>(
        &self,
        transport: &T,
        action: PhaseAction,
        payload: Option<Bytes>,
    ) -> Result<Option<u64>, T::Error>
    where
        T: PhaseTransport + ?Sized,
    {
        debug!(
            session = %self.session.id(),
            %action,
            offset = self.session.acknowledged(),
            bytes = payload.as_ref().map_or(0, Bytes::len),
            "phase call"
        );
        let call = PhaseCall {
            action,
            session_id: self.session.id(),
            path: self.session.target_path(),
            offset: self.session.acknowledged(),
            payload,
        };
        transport.request(call).await
    }

    fn acknowledge<E>(&mut self, action: PhaseAction, offset: Option<u64>) -> Result<(), UploadError<E>>
    where
        E: std::error::Error + 'static,
    {
        let current = self.session.acknowledged();
        let Some(offset) = offset else {
            return Err(UploadError::MissingOffset { action });
        };
        if offset < current {
            warn!(
                session = %self.session.id(),
                previous = current,
                offset,
                "server offset moved backwards"
            );
        }
        self.session.set_acknowledged(offset);
        Ok(())
    }
}
