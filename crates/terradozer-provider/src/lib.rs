//! Provider abstraction for terradozer
//!
//! A Terraform provider plugin is modelled as the [`ProviderClient`] capability
//! trait. The plugin crate supplies the gRPC-backed implementation; tests use
//! [`mock::MockProviderClient`]. On top of the trait, [`Provider`] exposes the
//! four operations terradozer needs: configure, import, read and destroy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Provider                    │
//! │  configure / import / read / destroy        │
//! │  (unknown-filled config, force-destroy)     │
//! └──────────────────┬──────────────────────────┘
//!                    │ trait ProviderClient
//!        ┌───────────┴────────────┐
//! ┌──────▼───────┐        ┌───────▼────────┐
//! │ gRPC plugin  │        │ MockProvider   │
//! │ (subprocess) │        │ Client (tests) │
//! └──────────────┘        └────────────────┘
//! ```

pub mod client;
pub mod diagnostics;
pub mod error;
pub mod force_destroy;
pub mod mock;
pub mod provider;
pub mod schema;
pub mod value;

// Re-exports
pub use client::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest, ConfigureResponse,
    GetSchemaResponse, ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ProviderClient, ReadResourceRequest, ReadResourceResponse,
};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{ProviderError, Result};
pub use force_destroy::{FORCE_DESTROY_ATTRIBUTES, enable_force_destroy_attributes};
pub use provider::{Provider, build_config};
pub use schema::{AttributeType, ProviderSchema, SchemaBlock};
pub use value::Value;
