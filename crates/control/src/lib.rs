//! Control-plane side of the cloud client.
//!
//! Library crate with no transport of its own: the command layer supplies
//! an [`OperationApi`] implementation and page-fetch closures, and gets
//! plain values or a [`ControlError`] back.
//!
//! - [`LongRunningOperationPoller`] turns an accepted submission into a
//!   terminal outcome by polling its status resource.
//! - [`pagination`] follows continuation tokens to exhaustion.
//! - [`wildcard`] implements `*`/`?` name patterns and the server-prefix
//!   split used by listing commands.
//! - [`ClientConfig`] holds persisted defaults for both planes.

pub mod api;
pub mod config;
pub mod error;
pub mod pagination;
pub mod poller;
pub mod wildcard;

pub use api::OperationApi;
pub use config::{ClientConfig, PollSettings, TransferSettings};
pub use error::ControlError;
pub use pagination::{PageRequest, collect, collect_filtered, list_matching, page_stream};
pub use poller::{LongRunningOperationPoller, OperationOutcome, PollPolicy};
pub use wildcard::{NameFilter, contains_wildcard, is_match, non_wildcard_prefix};
