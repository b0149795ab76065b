use std::fmt::Debug;

use tokio::sync::{mpsc, watch};

use crate::{Actor, ActorDeadError};

/// A message that an actor with state `S` can handle.
pub trait Message<S>: Send + Debug + 'static {
    /// Handles the message with exclusive access to the actor's state.
    fn handle(self, state: &mut S, handle: &Actor<S>);
}

/// Object-safe shim so differently typed messages can share a queue.
pub(crate) trait Envelope<S>: Send + Debug {
    fn open(self: Box<Self>, state: &mut S, handle: &Actor<S>);
}

impl<S, M: Message<S>> Envelope<S> for M {
    #[inline]
    fn open(self: Box<Self>, state: &mut S, handle: &Actor<S>) {
        (*self).handle(state, handle)
    }
}

pub(crate) type BoxedEnvelope<S> = Box<dyn Envelope<S>>;

pub(crate) struct Mailbox<S> {
    msg_tx: mpsc::UnboundedSender<BoxedEnvelope<S>>,
    kill_tx: watch::Sender<bool>,
}

pub(crate) struct MailboxReceivers<S> {
    pub msg_rx: mpsc::UnboundedReceiver<BoxedEnvelope<S>>,
    pub kill_rx: watch::Receiver<bool>,
}

impl<S: Send + 'static> Mailbox<S> {
    pub fn new() -> (Self, MailboxReceivers<S>) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        (Mailbox { msg_tx, kill_tx }, MailboxReceivers { msg_rx, kill_rx })
    }

    #[inline]
    pub fn post(&self, envelope: BoxedEnvelope<S>) -> Result<(), ActorDeadError> {
        self.msg_tx.send(envelope).map_err(|_| ActorDeadError)
    }

    #[inline]
    pub fn kill(&self) {
        self.kill_tx.send(true).ok();
    }
}
