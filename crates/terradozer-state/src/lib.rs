//! Terraform state reading for terradozer
//!
//! This crate turns a persisted Terraform state file (format version 4) into an
//! immutable [`StateSnapshot`] and enumerates every resource instance it records.
//!
//! ```text
//! terraform.tfstate ──▶ StateSnapshot ──▶ ResourceEnumerator ──▶ ResourceInstanceAddress...
//!                            │
//!                            └──▶ ResourceInstance { provider, current, deposed }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use terradozer_state::StateSnapshot;
//!
//! let state = StateSnapshot::load("terraform.tfstate").await?;
//! for addr in state.addresses() {
//!     let instance = state.resource_instance(addr).unwrap();
//!     if let Some(current) = instance.current() {
//!         println!("{addr}: {}", current.resource_id()?);
//!     }
//! }
//! ```

pub mod address;
pub mod enumerator;
pub mod error;
pub mod snapshot;

// Re-exports
pub use address::{InstanceKey, ResourceInstanceAddress, ResourceMode, provider_type_name};
pub use enumerator::ResourceEnumerator;
pub use error::{Result, StateError};
pub use snapshot::{ResourceId, ResourceInstance, ResourceObject, StateSnapshot};
