//! Realtime delivery and the periodic scheduler that feeds it.
//!
//! Subscriber transports (SSE, WebSocket) live outside this crate; they
//! call [`Broadcaster::register`] and drain the returned
//! [`Subscription`].

mod broadcaster;
mod envelope;
mod scheduler;

pub use broadcaster::{Broadcaster, Subscription};
pub use envelope::{Envelope, EventKind};
pub use scheduler::{Scheduler, TickReport};
