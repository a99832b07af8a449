//! Achievement records: a relational reference row that owns workflow state,
//! a document-store payload that owns content and attachments, and an
//! append-only ledger of status changes.

pub mod attachments;
pub mod best_effort;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod saga;
pub mod schema;
pub mod store;
pub mod workflow;

pub use attachments::{AttachmentHandler, AttachmentUpload};
pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{RecordsError, StoreError};
