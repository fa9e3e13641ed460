use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;

use crate::SessionControl;
use crate::SessionEvent;
use crate::SessionId;

/// Triggers one emission of a POLL session
#[derive(Debug, Clone)]
pub struct Poller {
    tx: mpsc::Sender<()>,
}

impl Poller {
    pub(crate) fn new(tx: mpsc::Sender<()>) -> Self {
        Self { tx }
    }

    /// False once the session has closed
    pub async fn poll(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

/// Receiving end of one session.
///
/// Dropping the stream cancels the session; the worker notices at its next
/// scheduling point and releases its registry slot and feed registration.
pub struct SessionStream {
    id: SessionId,
    events: ReceiverStream<SessionEvent>,
    poller: Option<Poller>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl SessionStream {
    pub(crate) fn new(
        control: SessionControl,
        receiver: mpsc::Receiver<SessionEvent>,
        poller: Option<Poller>,
    ) -> Self {
        Self {
            id: control.id,
            events: ReceiverStream::new(receiver),
            poller,
            cancel: control.token(),
            _cancel_on_drop: control.token().drop_guard(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Cancelled once the session is told to stop, including by dropping this stream
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn poller(&self) -> Option<&Poller> {
        self.poller.as_ref()
    }

    /// Moves the poller out; the POLL session ends once every poller is dropped
    pub fn take_poller(&mut self) -> Option<Poller> {
        self.poller.take()
    }
}

impl Stream for SessionStream {
    type Item = SessionEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
