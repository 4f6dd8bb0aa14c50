//! Paste protection and lifecycle engine.
//!
//! Every inbound operation goes through [`PasteService`], which checks
//! expiration first, then visibility, then opens content before the read
//! is recorded or the paste burned. All of it is serialized per short id.

pub mod burn;
pub mod clock;
pub mod error;
pub mod expiration;
pub mod forks;
pub mod locks;
pub mod revisions;
pub mod service;
pub mod short_id;
pub mod sweep;
#[cfg(test)]
pub(crate) mod test_support;
pub mod viewers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PasteError, Result};
pub use forks::ForkOptions;
pub use service::{
    CreateOptions, CreatedPaste, EditOptions, PasteService, Protection, RevisionView,
    ViewOutcome, ViewerContext,
};
