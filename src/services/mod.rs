//! Business services layer.
//!
//! Services orchestrate the pipeline on top of the provider and storage
//! seams:
//!
//! ```text
//! Scheduler / external surface
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Providers (mailbox, inference), Storage
//! ```
//!
//! - [`SyncEngine`]: fetch, dedupe, classify and persist one owner's new mail
//! - [`MessageService`]: queries and bulk actions on stored messages
//! - [`UnsubscribeExecutor`]: layered unsubscribe automation
//! - [`CategoryService`], [`OwnerService`]: bookkeeping for the shared
//!   categories and mailbox owners

mod category_service;
mod message_service;
mod owner_service;
mod sync_service;
pub mod unsubscribe;

pub use category_service::{CategoryError, CategoryService};
pub use message_service::{BulkAction, BulkActionError, BulkFailure, BulkReport, MessageService};
pub use owner_service::OwnerService;
pub use sync_service::{MessageFailure, SyncEngine, SyncError, SyncOutcome};
pub use unsubscribe::{UnsubscribeError, UnsubscribeExecutor, UnsubscribeReport};
