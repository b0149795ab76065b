use std::fmt::{self, Debug};

use tokio::sync::oneshot;

/// The answering half of a request sent with [`crate::Actor::ask`].
///
/// Dropping a `Reply` without sending makes the asking side observe
/// [`crate::ActorDeadError`].
pub struct Reply<T>(oneshot::Sender<T>);

impl<T> Reply<T> {
    #[inline]
    pub(crate) fn new(tx: oneshot::Sender<T>) -> Self {
        Self(tx)
    }

    /// Sends the answer. The value is discarded if the asker went away.
    #[inline]
    pub fn send(self, value: T) {
        if self.0.send(value).is_err() {
            trace!("reply receiver has been dropped");
        }
    }

    /// Returns `true` if the asker is no longer waiting.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl<T> Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("closed", &self.0.is_closed())
            .finish()
    }
}
