//! A lightweight actor runtime on top of tokio.
//!
//! An actor owns its state exclusively and mutates it only while handling
//! a message, one message at a time. Work that takes a while (network
//! calls, child processes) is spawned as a separate task that reports
//! back by sending another message, so the actor itself never blocks.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod mailbox;
mod reply;
mod scheduler;

pub use error::ActorDeadError;
pub use handle::Actor;
pub use mailbox::Message;
pub use reply::Reply;
