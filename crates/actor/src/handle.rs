use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::Instrument;

use crate::mailbox::Mailbox;
use crate::scheduler::run_actor;
use crate::{ActorDeadError, Message, Reply};

/// Handle to an actor.
///
/// Handles are cheap to clone. The actor stops once it is killed or the
/// last handle held outside of its own message handlers is dropped.
pub struct Actor<S> {
    mailbox: Arc<Mailbox<S>>,
}

impl<S: Send + 'static> Actor<S> {
    /// Spawns a new actor owning `state` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(state: S, label: Option<&str>) -> Self {
        let (mailbox, receivers) = Mailbox::new();
        let mailbox = Arc::new(mailbox);
        tokio::spawn(
            run_actor(Arc::downgrade(&mailbox), state, receivers)
                .instrument(debug_span!("actor", label = label)),
        );
        Self { mailbox }
    }

    #[inline]
    pub(crate) fn from_mailbox(mailbox: Arc<Mailbox<S>>) -> Self {
        Self { mailbox }
    }

    /// Sends a message without waiting for it to be handled.
    #[inline]
    pub fn send<M: Message<S>>(&self, msg: M) -> Result<(), ActorDeadError> {
        self.mailbox.post(Box::new(msg))
    }

    /// Sends a message built around a [`Reply`] and waits for the answer.
    ///
    /// Fails if the actor is dead, or if it dropped the reply unanswered.
    pub async fn ask<T, M, F>(&self, make_msg: F) -> Result<T, ActorDeadError>
    where
        F: FnOnce(Reply<T>) -> M,
        M: Message<S>,
    {
        let (tx, rx) = oneshot::channel();
        self.send(make_msg(Reply::new(tx)))?;
        rx.await.map_err(|_| ActorDeadError)
    }

    /// Asks the actor to stop.
    ///
    /// The message being handled right now, if any, still completes.
    /// Queued messages are dropped.
    #[inline]
    pub fn try_kill(&self) {
        self.mailbox.kill();
    }
}

impl<S> Clone for Actor<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}
