//! Remote mailbox access.
//!
//! - [`MailboxClient`] - the trait the pipeline talks to
//! - [`GmailMailbox`] - Gmail REST implementation
//! - [`body`] - MIME body decoding into canonical HTML
//! - [`cursor`] - "messages after this id" filtering
//!
//! # Example
//!
//! ```rust,no_run
//! use mailsift::domain::Credential;
//! use mailsift::providers::email::{GmailMailbox, MailboxClient};
//!
//! # async fn example() -> Result<(), mailsift::providers::email::ProviderError> {
//! let mailbox = GmailMailbox::new();
//! let credential = Credential::new("ya29.access-token");
//! for msg in mailbox.list_and_fetch(&credential, 10, None).await? {
//!     println!("{}: {}", msg.from, msg.subject);
//! }
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod cursor;
mod gmail;
mod traits;

pub use body::{decode_body, text_to_html, DecodedBody, MimePart};
pub use gmail::GmailMailbox;
pub use traits::{labels, MailboxClient, ProviderError, RawMessage, Result};
