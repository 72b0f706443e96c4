//! Repository management modules.
//!
//! This module contains the file-backed medical store and the file system helpers it is built on.

pub mod medical;
pub(crate) mod shared;
