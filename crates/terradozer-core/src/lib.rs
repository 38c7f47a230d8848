//! Destruction orchestrator for terradozer
//!
//! Walks every resource instance of a [`StateSnapshot`] and drives the
//! Import → Read → Destroy sequence against the responsible provider.
//!
//! ```text
//! for each address:
//!   no current object ─────────────▶ (ignored)
//!   data source ───────────────────▶ SkippedUnsupportedMode
//!   decode id ─────── error ───────▶ abort run
//!   provider ──────── error ───────▶ abort run
//!            └─────── unsupported ─▶ SkippedUnsupportedProvider
//!   import ────────── error ───────▶ SkippedImportFailed
//!   for each imported resource:
//!     read ────────── error ───────▶ SkippedReadFailed
//!          └───────── null ────────▶ SkippedAlreadyGone
//!     destroy ─────── error ───────▶ SkippedApplyFailed
//!             └────── dry run ─────▶ SkippedDryRun (counted)
//!             └────── ok ──────────▶ Deleted
//! ```
//!
//! [`StateSnapshot`]: terradozer_state::StateSnapshot

pub mod destroyer;
pub mod error;
pub mod factory;
pub mod outcome;

// Re-exports
pub use destroyer::Destroyer;
pub use error::{CoreError, Result};
pub use factory::{BoxError, ProviderFactory};
pub use outcome::{DestroyReport, DestructionOutcome, ResourceOutcome};
