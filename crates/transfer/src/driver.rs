//! Upload driver.
//!
//! Pulls chunks from a byte stream and feeds them to an
//! [`UploadMachine`]. The stream is not polled again until the phase
//! call for the previous chunk settled, which is what keeps one call in
//! flight and the offsets in stream order.

use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};

use crate::UploadError;
use crate::machine::{PhaseTransport, UploadMachine};
use crate::types::{Phase, UploadSession, UploadedFile};

/// Runs one upload session against a transport.
pub struct UploadDriver<'t, T: ?Sized> {
    transport: &'t T,
    machine: UploadMachine,
}

impl<'t, T> UploadDriver<'t, T>
where
    T: PhaseTransport + ?Sized,
{
    pub fn new(transport: &'t T, session: UploadSession) -> Self {
        Self {
            transport,
            machine: UploadMachine::new(session),
        }
    }

    pub fn session(&self) -> &UploadSession {
        self.machine.session()
    }

    /// Uploads everything `source` yields.
    ///
    /// Stops reading as soon as FINISH succeeded. A stream error or a
    /// failed phase call cancels the remote session and is returned as
    /// is. A stream that ends before FINISH was issued cancels the
    /// session and fails with [`UploadError::Truncated`].
    pub async fn run<S>(&mut self, mut source: S) -> Result<UploadedFile, UploadError<T::Error>>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let session = self.machine.session();
        info!(
            session = %session.id(),
            path = session.target_path(),
            total = session.total_size(),
            chunk_size = session.chunk_size(),
            "chunked upload started"
        );

        while let Some(item) = source.next().await {
            match item {
                Ok(data) => {
                    let phase = self.machine.on_chunk(self.transport, data).await?;
                    if phase == Phase::Finished {
                        let file = self.machine.session().uploaded_file();
                        info!(session = %self.machine.session().id(), path = %file.path, "chunked upload finished");
                        return Ok(file);
                    }
                }
                Err(e) => {
                    warn!(session = %self.machine.session().id(), error = %e, "source stream failed");
                    self.machine.fail(self.transport).await;
                    return Err(UploadError::Stream(e));
                }
            }
        }

        let acknowledged = self.machine.session().acknowledged();
        let total = self.machine.session().total_size();
        warn!(
            session = %self.machine.session().id(),
            acknowledged,
            total,
            "source stream ended before the upload finished"
        );
        if let Err(e) = self.machine.cancel(self.transport).await {
            warn!(session = %self.machine.session().id(), error = %e, "cancel failed, partial upload may remain");
        }
        Err(UploadError::Truncated {
            acknowledged,
            total,
        })
    }
}

/// Uploads `source` in a fresh driver and returns the finished file.
pub async fn drive_upload<T, S>(
    transport: &T,
    session: UploadSession,
    source: S,
) -> Result<UploadedFile, UploadError<T::Error>>
where
    T: PhaseTransport + ?Sized,
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    UploadDriver::new(transport, session).run(source).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use futures_util::stream;

    use super::*;
    use crate::testing::{FakeTransport, session};
    use crate::types::PhaseAction;

    fn chunks(sizes: &[usize]) -> Vec<io::Result<Bytes>> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| Ok(Bytes::from(vec![b'a' + i as u8; n])))
            .collect()
    }

    fn actions(transport: &FakeTransport) -> Vec<PhaseAction> {
        transport.calls().iter().map(|c| c.action).collect()
    }

    #[tokio::test]
    async fn uploads_three_chunks() {
        let transport = FakeTransport::new();
        let file = drive_upload(&transport, session(10, 4), stream::iter(chunks(&[4, 4, 2])))
            .await
            .unwrap();

        assert_eq!(
            actions(&transport),
            vec![PhaseAction::Start, PhaseAction::Continue, PhaseAction::Finish]
        );
        let calls = transport.calls();
        assert_eq!(calls[1].offset, 4);
        assert_eq!(calls[2].offset, 8);
        assert_eq!(file.name, "upload.bin");
        assert_eq!(file.path, "/Docs/upload.bin");
        assert_eq!(file.url, "/sites/Team/Docs/upload.bin");
    }

    #[tokio::test]
    async fn single_chunk_file() {
        let transport = FakeTransport::new();
        drive_upload(&transport, session(3, 4), stream::iter(chunks(&[3])))
            .await
            .unwrap();

        assert_eq!(actions(&transport), vec![PhaseAction::Start, PhaseAction::Finish]);
        assert!(transport.calls()[1].payload.is_none());
        assert_eq!(transport.count(PhaseAction::Continue), 0);
    }

    #[tokio::test]
    async fn stream_not_polled_while_call_in_flight() {
        let transport = FakeTransport::new();
        let flag = transport.in_flight();
        let source = stream::iter(chunks(&[4, 4, 4, 4, 4, 4, 1])).inspect(move |_| {
            assert!(!flag.load(Ordering::SeqCst), "stream polled during a phase call");
        });

        drive_upload(&transport, session(25, 4), source).await.unwrap();
        assert_eq!(transport.count(PhaseAction::Finish), 1);
    }

    #[tokio::test]
    async fn stops_reading_after_finish() {
        // The hint says the third chunk is the last one; the fourth is never sent.
        let transport = FakeTransport::new();
        drive_upload(&transport, session(10, 4), stream::iter(chunks(&[4, 4, 1, 1])))
            .await
            .unwrap();

        assert_eq!(transport.calls().len(), 3);
        assert_eq!(transport.calls()[2].payload.as_deref(), Some(&b"c"[..]));
    }

    #[tokio::test]
    async fn transport_failure_cancels_and_returns_original_error() {
        let transport = FakeTransport::new().fail_on(PhaseAction::Continue, 1);
        let err = drive_upload(&transport, session(100, 4), stream::iter(chunks(&[4, 4, 4, 4])))
            .await
            .unwrap_err();

        match err {
            UploadError::Transport(e) => assert_eq!(e.0, PhaseAction::Continue),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            actions(&transport),
            vec![
                PhaseAction::Start,
                PhaseAction::Continue,
                PhaseAction::Continue,
                PhaseAction::Cancel
            ]
        );
    }

    #[tokio::test]
    async fn finish_failure_cancels() {
        let transport = FakeTransport::new().fail_on(PhaseAction::Finish, 0);
        let mut driver = UploadDriver::new(&transport, session(6, 4));
        let err = driver
            .run(stream::iter(chunks(&[4, 2])))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transport(_)));
        assert_eq!(transport.count(PhaseAction::Cancel), 1);
        assert_eq!(driver.session().phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn stream_error_before_data_cancels() {
        let transport = FakeTransport::new();
        let source = stream::iter(vec![Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "disk went away",
        ))]);

        let mut driver = UploadDriver::new(&transport, session(10, 4));
        let err = driver.run(source).await.unwrap_err();

        match err {
            UploadError::Stream(e) => {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                assert_eq!(e.to_string(), "disk went away");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(actions(&transport), vec![PhaseAction::Cancel]);
        assert_eq!(driver.session().phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn stream_error_mid_upload_keeps_offset() {
        let transport = FakeTransport::new();
        let mut items = chunks(&[4]);
        items.push(Err(io::Error::other("read failed")));

        let mut driver = UploadDriver::new(&transport, session(10, 4));
        assert!(matches!(
            driver.run(stream::iter(items)).await,
            Err(UploadError::Stream(_))
        ));
        assert_eq!(driver.session().acknowledged(), 4);
        assert_eq!(actions(&transport), vec![PhaseAction::Start, PhaseAction::Cancel]);
    }

    #[tokio::test]
    async fn truncated_stream_cancels_session() {
        let transport = FakeTransport::new();
        let mut driver = UploadDriver::new(&transport, session(100, 4));
        let err = driver
            .run(stream::iter(chunks(&[4, 4])))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Truncated {
                acknowledged: 8,
                total: 100
            }
        ));
        assert_eq!(driver.session().phase(), Phase::Cancelled);
        assert_eq!(transport.calls().last().unwrap().action, PhaseAction::Cancel);
    }

    #[tokio::test]
    async fn empty_stream_is_truncated() {
        let transport = FakeTransport::new();
        let err = drive_upload(&transport, session(10, 4), stream::iter(chunks(&[])))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Truncated { acknowledged: 0, .. }));
        assert_eq!(actions(&transport), vec![PhaseAction::Cancel]);
    }

    #[tokio::test]
    async fn stream_ending_on_continue_that_completed_the_file_finishes() {
        let transport = FakeTransport::new();
        let mut driver = UploadDriver::new(&transport, session(10, 4));
        let file = driver.run(stream::iter(chunks(&[4, 6]))).await.unwrap();

        assert_eq!(
            actions(&transport),
            vec![PhaseAction::Start, PhaseAction::Continue, PhaseAction::Finish]
        );
        let finish = &transport.calls()[2];
        assert_eq!(finish.offset, 10);
        assert!(finish.payload.is_none());
        assert_eq!(transport.count(PhaseAction::Cancel), 0);
        assert_eq!(driver.session().phase(), Phase::Finished);
        assert_eq!(file.path, "/Docs/upload.bin");
    }

    #[tokio::test]
    async fn missing_offset_cancels_upload() {
        let transport = FakeTransport::new().with_replies(vec![Some(4), None]);
        let mut driver = UploadDriver::new(&transport, session(100, 4));
        let err = driver
            .run(stream::iter(chunks(&[4, 4, 4, 4])))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::MissingOffset {
                action: PhaseAction::Continue
            }
        ));
        assert_eq!(
            actions(&transport),
            vec![PhaseAction::Start, PhaseAction::Continue, PhaseAction::Cancel]
        );
        assert_eq!(driver.session().phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let a = FakeTransport::new();
        let b = FakeTransport::new();
        let (ra, rb) = tokio::join!(
            drive_upload(&a, session(8, 4), stream::iter(chunks(&[4, 4]))),
            drive_upload(&b, session(3, 4), stream::iter(chunks(&[3]))),
        );
        ra.unwrap();
        rb.unwrap();

        let ids_a: Vec<_> = a.calls().iter().map(|c| c.session_id).collect();
        assert!(ids_a.iter().all(|id| *id == ids_a[0]));
        assert_ne!(ids_a[0], b.calls()[0].session_id);
    }
}
