// src/packages/mod.rs

//! Package records for pacbind
//!
//! Native packages wrap libalpm cache entries; in-memory packages are plain
//! values. Both implement the traits in [`traits`].

pub mod memory;
mod package;
pub mod traits;

pub use package::{Package, PackageList};
pub use traits::{Database, DatabaseCollection, PackageCollection, PackageRecord};
