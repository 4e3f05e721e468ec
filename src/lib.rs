// src/lib.rs

//! pacbind: safe bindings to libalpm
//!
//! A session ([`Handle`]) opens the package databases under a root and a
//! database directory. Everything reached from it (databases, packages,
//! lists) stays tied to that session and refuses to touch native memory once
//! the session is released or its database unregistered.
//!
//! # Architecture
//!
//! - `ffi`: the raw C ABI, backed by the system libalpm (feature `libalpm`)
//!   or by an in-process stand-in
//! - Handle, databases and packages: checked wrappers over native pointers
//! - Callbacks: log and question closures routed through context pools
//! - Resolver: dependency matching over any backend implementing the
//!   traits in [`packages::traits`]
//! - Repository: a client for the AUR RPC interface

pub mod callbacks;
pub mod db;
mod error;
pub mod ffi;
pub mod handle;
mod list;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod types;
pub mod version;

pub use callbacks::{LogLevel, Question, QuestionKind};
pub use db::{Db, DbList};
pub use error::{Error, Result};
pub use handle::Handle;
pub use list::{AlpmList, Iter};
pub use packages::{Database, DatabaseCollection, Package, PackageCollection, PackageList, PackageRecord};
pub use types::{Backup, File, PkgFrom, PkgReason, SigLevel, Usage, Validation};
pub use version::{DepMod, Depend, vercmp};
