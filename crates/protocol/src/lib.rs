//! Wire types for the cloudctl management API and object data plane.
//!
//! Everything in here is plain data: status bodies returned by the
//! long-running-operation endpoint, listing pages, object properties and
//! the error taxonomy the command layer renders.

pub mod error_kind;
pub mod operation;
pub mod types;

pub use error_kind::ErrorKind;
pub use operation::{Operation, TransitionError};
pub use types::{
    ApiResponse, ObjectKind, ObjectProperties, OperationStatus, OperationStatusBody, Page,
    RemoteError, UnknownObjectKind, block_id,
};
