//! Provider-neutral protocol between the chat agent and LLM backends.
//!
//! The agent only ever talks to a model through the types in this crate,
//! so the same conversation can be replayed against any backend that
//! implements [`ModelProvider`].
//!
//! Nothing here performs I/O. Types are plain data, and the traits are
//! the contract a backend must honour. Conveniences built on top of
//! them belong to the crates that need them.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
