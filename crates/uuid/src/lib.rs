//! UUID utilities for medical data storage.
//!
//! Two kinds of identifier live here:
//!
//! - **Data source ids** are freshly generated, random (version 4) UUIDs. They are stored and
//!   exchanged in a *canonical* representation: **32 lowercase hexadecimal characters** (no
//!   hyphens). [`UuidService`] guarantees that form once constructed and derives the sharded
//!   directory a data source is stored under.
//! - **Medical resource ids** are *content-derived* (version 3, MD5 name-based) UUIDs computed
//!   by [`derive_medical_resource_uuid`]. Re-submitting the same clinical resource from the same
//!   data source always yields the same id, which is what makes upserts idempotent.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data is stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `health_data/medical/55/0e/550e8400e29b41d4a716446655440000/`
//!
//! ## Medical resource identity contract
//! See [`derive_medical_resource_uuid`]. The byte layout and hash are part of the storage
//! format: changing either orphans every stored resource.

mod name_based;
mod service;

// Re-export public types
pub use name_based::{derive_medical_resource_uuid, name_uuid_from_bytes};
pub use service::{Uuid, UuidService};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
