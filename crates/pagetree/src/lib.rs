//! Public facade crate for `pagetree`.
//!
//! No IO or engine-specific logic lives here: it re-exports the scorer, the
//! tree builder and the extraction/storage seams from `pagetree-core`.

pub use pagetree_core::*;
