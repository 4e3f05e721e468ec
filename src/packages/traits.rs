// src/packages/traits.rs

//! Common traits for package and database backends
//!
//! The native wrappers and the in-memory records in [`super::memory`]
//! implement the same capability set, so the resolver and callers can work
//! against either one.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::resolver;
use crate::types::{File, PkgReason, Usage};
use crate::version::Depend;

/// Metadata of a single package
pub trait PackageRecord {
    /// Get the package name
    fn name(&self) -> Result<String>;

    /// Get the full `[epoch:]version-release` string
    fn version(&self) -> Result<String>;

    /// Get the package description
    fn description(&self) -> Result<Option<String>>;

    /// Get the package architecture (e.g., "x86_64", "any")
    fn architecture(&self) -> Result<Option<String>>;

    fn url(&self) -> Result<Option<String>>;

    fn packager(&self) -> Result<Option<String>>;

    fn md5sum(&self) -> Result<Option<String>>;

    fn sha256sum(&self) -> Result<Option<String>>;

    /// Download size in bytes
    fn size(&self) -> Result<i64>;

    /// Installed size in bytes
    fn isize(&self) -> Result<i64>;

    fn build_date(&self) -> Result<Option<DateTime<Utc>>>;

    fn install_date(&self) -> Result<Option<DateTime<Utc>>>;

    fn reason(&self) -> Result<PkgReason>;

    fn depends(&self) -> Result<Vec<Depend>>;

    fn optional_depends(&self) -> Result<Vec<Depend>>;

    fn make_depends(&self) -> Result<Vec<Depend>>;

    fn check_depends(&self) -> Result<Vec<Depend>>;

    fn provides(&self) -> Result<Vec<Depend>>;

    fn conflicts(&self) -> Result<Vec<Depend>>;

    fn replaces(&self) -> Result<Vec<Depend>>;

    fn groups(&self) -> Result<Vec<String>>;

    fn licenses(&self) -> Result<Vec<String>>;

    /// Get the file manifest
    fn files(&self) -> Result<Vec<File>>;

    /// Look up an exact path in the file manifest
    ///
    /// Paths are relative to the root, without a leading slash.
    fn contains_file(&self, path: &str) -> Result<Option<File>> {
        Ok(self.files()?.into_iter().find(|file| file.name == path))
    }

    /// Name of the database this record belongs to, if any
    fn db_name(&self) -> Result<Option<String>>;

    /// The first package in `dbs` with the same name and a newer version
    fn sync_new_version<L>(&self, dbs: &L) -> Result<Option<<L::Db as Database>::Pkg>>
    where
        Self: Sized,
        L: DatabaseCollection,
    {
        resolver::sync_new_version(self, dbs)
    }
}

/// An ordered collection of packages
pub trait PackageCollection: Sized {
    type Pkg: PackageRecord;

    /// Iterate in collection order
    ///
    /// A collection that goes stale mid-walk yields the error as its last
    /// item.
    fn iter(&self) -> Result<impl Iterator<Item = Result<Self::Pkg>> + '_>;

    /// Materialize in collection order
    fn to_vec(&self) -> Result<Vec<Self::Pkg>> {
        self.iter()?.collect()
    }

    /// A new collection sorted by installed size, smallest first
    ///
    /// Equal sizes keep their relative order.
    fn sort_by_size(&self) -> Result<Self>;

    /// The first package satisfying `depstring`, by name or provides
    fn find_satisfier(&self, depstring: &str) -> Result<Option<Self::Pkg>> {
        resolver::find_satisfier(self.iter()?, depstring)
    }
}

/// A package database
pub trait Database {
    type Pkg: PackageRecord;
    type Pkgs: PackageCollection<Pkg = Self::Pkg>;

    fn name(&self) -> Result<String>;

    /// Mirror URLs in configured order
    fn servers(&self) -> Result<Vec<String>>;

    /// Replace the mirror list
    ///
    /// The old list is cleared before the new entries are added one by
    /// one. If adding fails part way, the error is returned and the entries
    /// added so far stay in place.
    fn set_servers(&self, servers: &[String]) -> Result<()>;

    fn add_server(&self, server: &str) -> Result<()>;

    fn usage(&self) -> Result<Usage>;

    fn set_usage(&self, usage: Usage) -> Result<()>;

    /// Exact-name lookup; `Ok(None)` when absent
    fn pkg(&self, name: &str) -> Result<Option<Self::Pkg>>;

    /// Every package in the database
    fn pkg_cache(&self) -> Result<Self::Pkgs>;

    /// Packages whose name or description contains every term
    ///
    /// No terms means no matches. A failing search is an error, never an
    /// empty result.
    fn search(&self, terms: &[&str]) -> Result<Self::Pkgs>;

    /// Remove the database from its session; later use is an error
    fn unregister(&self) -> Result<()>;
}

/// An ordered collection of databases
pub trait DatabaseCollection {
    type Db: Database;

    /// Iterate in registration order
    fn iter(&self) -> Result<impl Iterator<Item = Result<Self::Db>> + '_>;

    /// Packages in `group` across every database, by database order
    fn find_group_pkgs(&self, group: &str) -> Result<<Self::Db as Database>::Pkgs>;

    /// The first package satisfying `depstring`
    ///
    /// Exact-name matches in any database win over providers.
    fn find_satisfier(&self, depstring: &str) -> Result<Option<<Self::Db as Database>::Pkg>>
    where
        Self: Sized,
    {
        resolver::find_dbs_satisfier(self, depstring)
    }
}
