// src/packages/package.rs

//! Native package records
//!
//! A [`Package`] is a pointer into a libalpm package cache plus the binding
//! of the database it lives in. Every accessor checks the binding first, so
//! a package outliving its database or session returns an error rather
//! than reading freed memory.

use std::ffi::{CString, c_char, c_void};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::db::Db;
use crate::error::Result;
use crate::ffi;
use crate::handle::Binding;
use crate::list::{AlpmList, RawList};
use crate::resolver;
use crate::types::{Backup, File, PkgFrom, PkgReason, Validation};
use crate::version::Depend;

use super::traits::{PackageCollection, PackageRecord};

type StringGetter = unsafe extern "C" fn(*mut ffi::alpm_pkg_t) -> *const c_char;
type ListGetter = unsafe extern "C" fn(*mut ffi::alpm_pkg_t) -> *mut ffi::alpm_list_t;
type TimeGetter = unsafe extern "C" fn(*mut ffi::alpm_pkg_t) -> ffi::alpm_time_t;

/// A package owned by a libalpm database
#[derive(Clone)]
pub struct Package {
    ptr: *mut ffi::alpm_pkg_t,
    binding: Binding,
}

impl Package {
    pub(crate) fn from_raw(ptr: *mut ffi::alpm_pkg_t, binding: Binding) -> Self {
        Self { ptr, binding }
    }

    /// List element wrapper; the package is bound to its own database
    pub(crate) fn wrap(data: *mut c_void, binding: &Binding) -> Self {
        let ptr = data.cast::<ffi::alpm_pkg_t>();
        Self {
            ptr,
            binding: binding.for_package(ptr),
        }
    }

    pub(crate) fn as_ptr(&self) -> Result<*mut ffi::alpm_pkg_t> {
        self.binding.check()?;
        Ok(self.ptr)
    }

    fn string(&self, get: StringGetter) -> Result<Option<String>> {
        let ptr = self.as_ptr()?;
        Ok(unsafe { ffi::to_string(get(ptr)) })
    }

    fn depends_with(&self, get: ListGetter) -> Result<Vec<Depend>> {
        let ptr = self.as_ptr()?;
        let list = unsafe { RawList::borrowed(get(ptr)) };
        Ok(unsafe { list.depends() })
    }

    fn strings_with(&self, get: ListGetter) -> Result<Vec<String>> {
        let ptr = self.as_ptr()?;
        let list = unsafe { RawList::borrowed(get(ptr)) };
        Ok(unsafe { list.strings() })
    }

    fn date(&self, get: TimeGetter) -> Result<Option<DateTime<Utc>>> {
        let ptr = self.as_ptr()?;
        let timestamp = unsafe { get(ptr) };
        // Zero means the date was never recorded
        if timestamp == 0 {
            return Ok(None);
        }
        Ok(DateTime::from_timestamp(timestamp, 0))
    }

    /// Name of the split-package base
    pub fn base(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_base)
    }

    pub fn filename(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_filename)
    }

    pub fn base64_signature(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_base64_sig)
    }

    /// Where the record was loaded from
    pub fn origin(&self) -> Result<Option<PkgFrom>> {
        let ptr = self.as_ptr()?;
        Ok(PkgFrom::from_raw(unsafe { ffi::alpm_pkg_get_origin(ptr) }))
    }

    /// How the package was validated when installed
    pub fn validation(&self) -> Result<Validation> {
        let ptr = self.as_ptr()?;
        Ok(Validation::from_bits_truncate(unsafe {
            ffi::alpm_pkg_get_validation(ptr)
        }))
    }

    /// Configuration files tracked for backup, with their recorded hashes
    pub fn backup(&self) -> Result<Vec<Backup>> {
        let ptr = self.as_ptr()?;
        let list = unsafe { RawList::borrowed(ffi::alpm_pkg_get_backup(ptr)) };
        Ok(list
            .nodes()
            .map(|entry| {
                let entry = unsafe { &*entry.cast::<ffi::alpm_backup_t>() };
                Backup {
                    name: unsafe { ffi::to_string(entry.name) }.unwrap_or_default(),
                    hash: unsafe { ffi::to_string(entry.hash) }.unwrap_or_default(),
                }
            })
            .collect())
    }

    /// The database that owns this package
    pub fn db(&self) -> Result<Option<Db>> {
        let ptr = self.as_ptr()?;
        let db = unsafe { ffi::alpm_pkg_get_db(ptr) };
        if db.is_null() {
            return Ok(None);
        }
        Ok(Some(Db::from_raw(db, self.binding.session())))
    }

    /// Whether the session's ignore list covers this package or its groups
    pub fn should_ignore(&self) -> Result<bool> {
        let handle = self.binding.check()?;
        Ok(unsafe { ffi::alpm_pkg_should_ignore(handle, self.ptr) } != 0)
    }

    /// Names of packages that depend on this one
    ///
    /// Installed packages are checked against the local database, sync
    /// packages against every sync database.
    pub fn compute_required_by(&self) -> Result<Vec<String>> {
        let ptr = self.as_ptr()?;
        Ok(unsafe { RawList::take_strings(ffi::alpm_pkg_compute_requiredby(ptr)) })
    }

    /// Names of packages that list this one as an optional dependency
    pub fn compute_optional_for(&self) -> Result<Vec<String>> {
        let ptr = self.as_ptr()?;
        Ok(unsafe { RawList::take_strings(ffi::alpm_pkg_compute_optionalfor(ptr)) })
    }
}

fn file_from_raw(file: &ffi::alpm_file_t) -> File {
    File {
        name: unsafe { ffi::to_string(file.name) }.unwrap_or_default(),
        size: file.size,
        mode: file.mode,
    }
}

impl PackageRecord for Package {
    fn name(&self) -> Result<String> {
        Ok(self.string(ffi::alpm_pkg_get_name)?.unwrap_or_default())
    }

    fn version(&self) -> Result<String> {
        Ok(self.string(ffi::alpm_pkg_get_version)?.unwrap_or_default())
    }

    fn description(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_desc)
    }

    fn architecture(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_arch)
    }

    fn url(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_url)
    }

    fn packager(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_packager)
    }

    fn md5sum(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_md5sum)
    }

    fn sha256sum(&self) -> Result<Option<String>> {
        self.string(ffi::alpm_pkg_get_sha256sum)
    }

    fn size(&self) -> Result<i64> {
        let ptr = self.as_ptr()?;
        Ok(unsafe { ffi::alpm_pkg_get_size(ptr) })
    }

    fn isize(&self) -> Result<i64> {
        let ptr = self.as_ptr()?;
        Ok(unsafe { ffi::alpm_pkg_get_isize(ptr) })
    }

    fn build_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.date(ffi::alpm_pkg_get_builddate)
    }

    fn install_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.date(ffi::alpm_pkg_get_installdate)
    }

    fn reason(&self) -> Result<PkgReason> {
        let ptr = self.as_ptr()?;
        Ok(PkgReason::from_raw(unsafe { ffi::alpm_pkg_get_reason(ptr) }))
    }

    fn depends(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_depends)
    }

    fn optional_depends(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_optdepends)
    }

    fn make_depends(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_makedepends)
    }

    fn check_depends(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_checkdepends)
    }

    fn provides(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_provides)
    }

    fn conflicts(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_conflicts)
    }

    fn replaces(&self) -> Result<Vec<Depend>> {
        self.depends_with(ffi::alpm_pkg_get_replaces)
    }

    fn groups(&self) -> Result<Vec<String>> {
        self.strings_with(ffi::alpm_pkg_get_groups)
    }

    fn licenses(&self) -> Result<Vec<String>> {
        self.strings_with(ffi::alpm_pkg_get_licenses)
    }

    fn files(&self) -> Result<Vec<File>> {
        let ptr = self.as_ptr()?;
        let list = unsafe { ffi::alpm_pkg_get_files(ptr) };
        if list.is_null() {
            return Ok(Vec::new());
        }
        let list = unsafe { &*list };
        if list.files.is_null() || list.count == 0 {
            return Ok(Vec::new());
        }
        let files = unsafe { std::slice::from_raw_parts(list.files, list.count) };
        Ok(files.iter().map(file_from_raw).collect())
    }

    fn contains_file(&self, path: &str) -> Result<Option<File>> {
        let ptr = self.as_ptr()?;
        let c_path = CString::new(path)?;
        let file = unsafe { ffi::alpm_filelist_contains(ffi::alpm_pkg_get_files(ptr), c_path.as_ptr()) };
        if file.is_null() {
            return Ok(None);
        }
        Ok(Some(file_from_raw(unsafe { &*file })))
    }

    fn db_name(&self) -> Result<Option<String>> {
        use super::traits::Database;

        match self.db()? {
            Some(db) => Ok(Some(db.name()?)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self.version()) {
            (Ok(name), Ok(version)) => write!(f, "Package({}-{})", name, version),
            (Err(e), _) | (_, Err(e)) => write!(f, "Package(<{}>)", e),
        }
    }
}

/// A list of native packages
///
/// Lists borrowed from a database cache stay valid as long as that
/// database does. Lists produced by a search or group lookup own their
/// nodes and free them on drop; the packages themselves stay with their
/// databases.
#[derive(Debug)]
pub struct PackageList {
    list: AlpmList<Package>,
}

impl PackageList {
    /// # Safety
    ///
    /// `head` must stay valid while `binding` checks out.
    pub(crate) unsafe fn borrowed(head: *mut ffi::alpm_list_t, binding: Binding) -> Self {
        let raw = unsafe { RawList::borrowed(head) };
        Self {
            list: AlpmList::new(raw, binding, Package::wrap),
        }
    }

    /// # Safety
    ///
    /// `head` must be a chain handed over to the caller.
    pub(crate) unsafe fn owned(head: *mut ffi::alpm_list_t, binding: Binding) -> Self {
        let raw = unsafe { RawList::owned(head) };
        Self {
            list: AlpmList::new(raw, binding, Package::wrap),
        }
    }

    pub(crate) fn empty(binding: Binding) -> Self {
        Self {
            list: AlpmList::new(RawList::from_ptrs::<ffi::alpm_pkg_t>([]), binding, Package::wrap),
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Visit each package until `f` breaks
    pub fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(Package) -> std::ops::ControlFlow<()>,
    {
        self.list.for_each(f)
    }
}

impl PackageCollection for PackageList {
    type Pkg = Package;

    fn iter(&self) -> Result<impl Iterator<Item = Result<Package>> + '_> {
        self.list.iter()
    }

    fn to_vec(&self) -> Result<Vec<Package>> {
        self.list.to_vec()
    }

    fn sort_by_size(&self) -> Result<Self> {
        let sorted = resolver::sort_by_size(self.list.to_vec()?)?;
        let raw = RawList::from_ptrs(sorted.iter().map(|pkg| pkg.ptr));
        Ok(Self {
            list: AlpmList::new(raw, self.list.binding().clone(), Package::wrap),
        })
    }
}
