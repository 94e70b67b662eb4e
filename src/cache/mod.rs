//! Artifact cache protocol
//!
//! Cache entries are immutable commits of an installed dependency tree plus
//! the manifest it was built from, keyed by content and published under
//! `sha-<id>` tags.
//!
//! # Consistency
//!
//! An entry is trusted for a manifest only when:
//!
//! - its manifest snapshot is byte-identical to the manifest, and
//! - its tree hash equals the fingerprint of a fresh hermetic install
//!
//! # Checkout States
//!
//! | State | Checkout directory |
//! |-------|--------------------|
//! | Absent | Missing, or without a complete checkout marker |
//! | Present(id) | Tree of entry `id` plus its marker |

pub mod checker;
pub mod checkout;
pub mod entry;
pub mod fingerprint;
pub mod lifecycle;
pub mod manifest;
pub mod payload;
pub mod staged;
#[cfg(test)]
pub(crate) mod testing;
pub mod verify;

pub use checker::{ConsistencyChecker, TreeDiff, Verdict};
pub use checkout::{CheckoutMarker, CheckoutState, WorkingCheckout};
pub use entry::CacheEntry;
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use lifecycle::{Lifecycle, LockSync, PushOutcome, StatusReport, Verification};
pub use manifest::Manifest;
pub use payload::ArtifactPayload;
pub use staged::{StagedEntry, STAGED_RECORD};
pub use verify::{VerificationJob, VerifiedCommit};
