//! Domain layer types for mailsift.
//!
//! Messages, shared categories and mailbox owners, plus their identifiers.

mod category;
mod message;
mod owner;
mod types;

pub use category::{default_category_seeds, Category, CategorySeed};
pub use message::Message;
pub use owner::{Credential, Owner};
pub use types::{CategoryId, MessageId, OwnerId};
