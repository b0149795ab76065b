use std::sync::Weak;

use tokio::select;

use crate::Actor;
use crate::mailbox::{Mailbox, MailboxReceivers};

pub(crate) async fn run_actor<S: Send + 'static>(
    mailbox: Weak<Mailbox<S>>,
    mut state: S,
    receivers: MailboxReceivers<S>,
) {
    let MailboxReceivers {
        mut msg_rx,
        mut kill_rx,
    } = receivers;

    debug!("started");
    loop {
        let envelope = select! {
            biased;

            _ = kill_rx.changed() => {
                debug!("killed");
                break;
            }
            envelope = msg_rx.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                envelope
            }
        };
        trace!("received message: {envelope:?}");

        // Upgrading only for the duration of one message keeps the actor
        // from holding itself alive.
        let Some(mailbox) = mailbox.upgrade() else {
            debug!("all handles dropped, discarding message");
            break;
        };
        let handle = Actor::from_mailbox(mailbox);
        trace_span!("handle").in_scope(|| envelope.open(&mut state, &handle));
    }
    debug!("stopped");
}
