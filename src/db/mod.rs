// src/db/mod.rs

//! Database layer for pacbind
//!
//! This module wraps libalpm databases:
//! - the local database of installed packages
//! - registered sync databases and their mirror lists
//! - package lookup, cache access and search
//! - group lookups across a list of databases
//!
//! A [`Db`] is bound to its session and to its own registration. After
//! `unregister` every clone of it, and every package reached through it,
//! reports [`crate::Error::Invalidated`].

use std::ffi::{CString, c_void};
use std::fmt;
use std::ops::ControlFlow;
use std::ptr;
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ffi;
use crate::handle::{Binding, Session};
use crate::list::{AlpmList, RawList};
use crate::packages::traits::{Database, DatabaseCollection};
use crate::packages::{Package, PackageList};
use crate::types::Usage;

/// A libalpm package database
#[derive(Clone)]
pub struct Db {
    ptr: *mut ffi::alpm_db_t,
    binding: Binding,
}

impl Db {
    pub(crate) fn from_raw(ptr: *mut ffi::alpm_db_t, session: &Rc<Session>) -> Self {
        Self {
            ptr,
            binding: Binding::db(session, session.db_key(ptr)),
        }
    }

    pub(crate) fn wrap(data: *mut c_void, binding: &Binding) -> Self {
        Self::from_raw(data.cast::<ffi::alpm_db_t>(), binding.session())
    }

    pub(crate) fn as_ptr(&self) -> Result<*mut ffi::alpm_db_t> {
        self.binding.check()?;
        Ok(self.ptr)
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.binding
    }

    fn last_error(&self) -> Error {
        self.binding.session().last_error()
    }
}

impl Database for Db {
    type Pkg = Package;
    type Pkgs = PackageList;

    fn name(&self) -> Result<String> {
        let ptr = self.as_ptr()?;
        let name = unsafe { ffi::to_string(ffi::alpm_db_get_name(ptr)) };
        Ok(name.unwrap_or_default())
    }

    fn servers(&self) -> Result<Vec<String>> {
        let ptr = self.as_ptr()?;
        let list = unsafe { RawList::borrowed(ffi::alpm_db_get_servers(ptr)) };
        Ok(unsafe { list.strings() })
    }

    fn set_servers(&self, servers: &[String]) -> Result<()> {
        let ptr = self.as_ptr()?;
        if unsafe { ffi::alpm_db_set_servers(ptr, ptr::null_mut()) } != 0 {
            return Err(self.last_error());
        }
        for server in servers {
            self.add_server(server)?;
        }
        debug!("Set {} servers for {}", servers.len(), self.name()?);
        Ok(())
    }

    fn add_server(&self, server: &str) -> Result<()> {
        let ptr = self.as_ptr()?;
        let c_server = CString::new(server)?;
        if unsafe { ffi::alpm_db_add_server(ptr, c_server.as_ptr()) } != 0 {
            return Err(self.last_error());
        }
        Ok(())
    }

    fn usage(&self) -> Result<Usage> {
        let ptr = self.as_ptr()?;
        let mut raw: ffi::alpm_db_usage_t = 0;
        if unsafe { ffi::alpm_db_get_usage(ptr, &mut raw) } != 0 {
            return Err(self.last_error());
        }
        Ok(Usage::from_bits_truncate(raw))
    }

    fn set_usage(&self, usage: Usage) -> Result<()> {
        let ptr = self.as_ptr()?;
        if unsafe { ffi::alpm_db_set_usage(ptr, usage.bits()) } != 0 {
            return Err(self.last_error());
        }
        Ok(())
    }

    fn pkg(&self, name: &str) -> Result<Option<Package>> {
        let ptr = self.as_ptr()?;
        let c_name = CString::new(name)?;
        let pkg = unsafe { ffi::alpm_db_get_pkg(ptr, c_name.as_ptr()) };
        if pkg.is_null() {
            return Ok(None);
        }
        Ok(Some(Package::from_raw(pkg, self.binding.clone())))
    }

    fn pkg_cache(&self) -> Result<PackageList> {
        let ptr = self.as_ptr()?;
        // The cache lives as long as the database registration
        Ok(unsafe { PackageList::borrowed(ffi::alpm_db_get_pkgcache(ptr), self.binding.clone()) })
    }

    fn search(&self, terms: &[&str]) -> Result<PackageList> {
        let ptr = self.as_ptr()?;
        if terms.is_empty() {
            return Ok(PackageList::empty(self.binding.clone()));
        }

        let needles = terms
            .iter()
            .map(|term| CString::new(*term))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let needle_list = RawList::from_ptrs(needles.iter().map(|n| n.as_ptr().cast_mut()));

        let mut found: *mut ffi::alpm_list_t = ptr::null_mut();
        if unsafe { ffi::alpm_db_search(ptr, needle_list.head(), &mut found) } != 0 {
            return Err(self.last_error());
        }
        Ok(unsafe { PackageList::owned(found, self.binding.clone()) })
    }

    fn unregister(&self) -> Result<()> {
        let ptr = self.as_ptr()?;
        let name = self.name()?;
        if unsafe { ffi::alpm_db_unregister(ptr) } != 0 {
            return Err(self.last_error());
        }
        self.binding.session().forget_db(ptr);
        info!("Unregistered database {}", name);
        Ok(())
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Ok(name) => write!(f, "Db({})", name),
            Err(e) => write!(f, "Db(<{}>)", e),
        }
    }
}

/// A snapshot of registered databases
///
/// The list is copied when taken, so later registrations do not show up in
/// it. Unregistering any of its databases invalidates the whole snapshot.
#[derive(Debug)]
pub struct DbList {
    list: AlpmList<Db>,
}

impl DbList {
    pub(crate) fn snapshot(head: *mut ffi::alpm_list_t, session: &Rc<Session>) -> Self {
        let raw = unsafe { RawList::borrowed(head) }.copy();
        let keys = raw
            .nodes()
            .map(|db| session.db_key(db.cast::<ffi::alpm_db_t>()))
            .collect();
        Self {
            list: AlpmList::new(raw, Binding::dbs(session, keys), Db::wrap),
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn to_vec(&self) -> Result<Vec<Db>> {
        self.list.to_vec()
    }

    /// Visit each database until `f` breaks
    pub fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(Db) -> ControlFlow<()>,
    {
        self.list.for_each(f)
    }
}

impl DatabaseCollection for DbList {
    type Db = Db;

    fn iter(&self) -> Result<impl Iterator<Item = Result<Db>> + '_> {
        self.list.iter()
    }

    fn find_group_pkgs(&self, group: &str) -> Result<PackageList> {
        let binding = self.list.binding();
        binding.check()?;
        let c_group = CString::new(group)?;
        let found = unsafe { ffi::alpm_find_group_pkgs(self.list.raw().head(), c_group.as_ptr()) };
        Ok(unsafe { PackageList::owned(found, binding.clone()) })
    }
}

#[cfg(all(test, not(feature = "libalpm")))]
mod tests {
    use super::*;
    use crate::ffi::sim;
    use crate::handle::Handle;
    use crate::packages::memory::MemPackage;
    use crate::packages::traits::{PackageCollection, PackageRecord};
    use crate::types::SigLevel;
    use tempfile::TempDir;

    fn open() -> (TempDir, Handle) {
        let temp = TempDir::new().unwrap();
        let handle = Handle::initialize(temp.path(), temp.path()).unwrap();
        (temp, handle)
    }

    fn names(list: &PackageList) -> Vec<String> {
        list.to_vec().unwrap().iter().map(|p| p.name().unwrap()).collect()
    }

    #[test]
    fn test_servers() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();

        core.add_server("https://mirror.example.org/core/os/x86_64/").unwrap();
        assert_eq!(core.servers().unwrap(), vec!["https://mirror.example.org/core/os/x86_64"]);

        core.set_servers(&["https://a.example.org".to_string(), "https://b.example.org".to_string()])
            .unwrap();
        assert_eq!(core.servers().unwrap(), vec!["https://a.example.org", "https://b.example.org"]);

        assert!(matches!(
            core.add_server(""),
            Err(Error::NativeRejected { code, .. }) if code == ffi::ALPM_ERR_SERVER_BAD_URL
        ));
    }

    #[test]
    fn test_usage_roundtrip() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        assert_eq!(core.usage().unwrap(), Usage::ALL);

        core.set_usage(Usage::SYNC | Usage::SEARCH).unwrap();
        assert_eq!(core.usage().unwrap(), Usage::SYNC | Usage::SEARCH);
    }

    #[test]
    fn test_search_semantics() {
        let (_temp, handle) = open();
        let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
        sim::seed_package(&extra, &MemPackage::new("vim", "9.1").with_description("Vi Improved")).unwrap();
        sim::seed_package(&extra, &MemPackage::new("neovim", "0.10").with_description("Fork of Vim")).unwrap();

        assert_eq!(names(&extra.search(&["vim"]).unwrap()), vec!["vim", "neovim"]);
        assert_eq!(names(&extra.search(&["vim", "fork"]).unwrap()), vec!["neovim"]);
        assert!(extra.search(&["emacs"]).unwrap().is_empty());
        assert!(extra.search(&[]).unwrap().is_empty());

        // A failing search is distinguishable from an empty one
        sim::fail_next_search(&extra).unwrap();
        assert!(matches!(extra.search(&["vim"]), Err(Error::NativeRejected { .. })));
        assert_eq!(extra.search(&["vim"]).unwrap().len().unwrap(), 2);
    }

    #[test]
    fn test_pkg_lookup() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        sim::seed_package(&core, &MemPackage::new("bash", "5.2.037-1")).unwrap();

        assert_eq!(core.pkg("bash").unwrap().unwrap().version().unwrap(), "5.2.037-1");
        assert!(core.pkg("zsh").unwrap().is_none());
        assert_eq!(core.pkg_cache().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_unregister_invalidates_clones() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        let alias = core.clone();
        let cache = core.pkg_cache().unwrap();

        core.unregister().unwrap();
        assert!(matches!(alias.name(), Err(Error::Invalidated(_))));
        assert!(matches!(cache.iter(), Err(Error::Invalidated(_))));
        assert!(matches!(core.unregister(), Err(Error::Invalidated(_))));
    }

    #[test]
    fn test_snapshot_invalidated_by_unregister() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();

        let dbs = handle.sync_dbs().unwrap();
        assert_eq!(dbs.len().unwrap(), 2);

        core.unregister().unwrap();
        assert!(matches!(dbs.len(), Err(Error::Invalidated(_))));
        assert_eq!(handle.sync_dbs().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_find_group_pkgs() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
        sim::seed_package(&core, &MemPackage::new("gcc", "14.1").with_groups(&["base-devel"])).unwrap();
        sim::seed_package(&core, &MemPackage::new("bash", "5.2")).unwrap();
        sim::seed_package(&extra, &MemPackage::new("autoconf", "2.72").with_groups(&["base-devel"])).unwrap();
        sim::seed_package(&extra, &MemPackage::new("gcc", "14.2").with_groups(&["base-devel"])).unwrap();

        let dbs = handle.sync_dbs().unwrap();
        let group = dbs.find_group_pkgs("base-devel").unwrap();
        let found: Vec<String> = group
            .to_vec()
            .unwrap()
            .iter()
            .map(|p| format!("{}-{}", p.name().unwrap(), p.version().unwrap()))
            .collect();
        assert_eq!(found, vec!["gcc-14.1", "autoconf-2.72"]);

        assert!(dbs.find_group_pkgs("gnome").unwrap().is_empty());
    }

    #[test]
    fn test_dbs_find_satisfier() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
        sim::seed_package(&core, &MemPackage::new("bash", "5.2").with_provides(&["sh=5.2"])).unwrap();
        sim::seed_package(&extra, &MemPackage::new("sh", "1.0")).unwrap();

        let dbs = handle.sync_dbs().unwrap();
        let found = dbs.find_satisfier("sh").unwrap().unwrap();
        assert_eq!(found.db_name().unwrap().as_deref(), Some("extra"));

        let found = dbs.find_satisfier("sh>=5").unwrap().unwrap();
        assert_eq!(found.name().unwrap(), "bash");
    }
}
