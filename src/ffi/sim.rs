// src/ffi/sim.rs

//! In-process stand-in for libalpm
//!
//! Exports the entry points the safe layer calls, with the libalpm
//! signatures, over heap records owned by the handle. Behaviour follows
//! libalpm where the safe layer relies on it:
//!
//! - lists are `alpm_list_t` chains; getters hand out borrowed lists,
//!   search/group/reverse-dependency results are caller-owned
//! - failures return the libalpm sentinel and set the handle errno
//! - search is gated on [`ALPM_DB_USAGE_SEARCH`]
//! - reverse dependencies match by name, version and provides
//!
//! Test code populates databases with [`seed_package`] and drives the
//! callbacks with [`emit_log`] and [`ask_question`].

use super::*;
use std::ffi::{CString, c_char, c_int, c_void};
use std::path::PathBuf;
use std::ptr;

use crate::callbacks::LogLevel;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::packages::Package;
use crate::packages::memory::MemPackage;
use crate::version::Depend;

pub struct alpm_handle_t {
    dbpath: PathBuf,
    db_local: *mut alpm_db_t,
    dbs_sync: *mut alpm_list_t,
    logcb: alpm_cb_log,
    logcb_ctx: *mut c_void,
    questioncb: alpm_cb_question,
    questioncb_ctx: *mut c_void,
    ignorepkg: Vec<String>,
    fail_next_option: bool,
    pm_errno: alpm_errno_t,
}

pub struct alpm_db_t {
    handle: *mut alpm_handle_t,
    treename: CString,
    is_local: bool,
    usage: alpm_db_usage_t,
    /// `CString::into_raw` entries
    servers: *mut alpm_list_t,
    /// `Box<alpm_pkg_t>` entries
    pkgcache: *mut alpm_list_t,
    fail_next_search: bool,
}

pub struct alpm_pkg_t {
    handle: *mut alpm_handle_t,
    db: *mut alpm_db_t,
    origin: alpm_pkgfrom_t,
    name: Option<CString>,
    version: Option<CString>,
    desc: Option<CString>,
    url: Option<CString>,
    packager: Option<CString>,
    arch: Option<CString>,
    base: Option<CString>,
    filename: Option<CString>,
    md5sum: Option<CString>,
    sha256sum: Option<CString>,
    base64_sig: Option<CString>,
    size: off_t,
    isize: off_t,
    builddate: alpm_time_t,
    installdate: alpm_time_t,
    reason: alpm_pkgreason_t,
    validation: alpm_pkgvalidation_t,
    depends: *mut alpm_list_t,
    optdepends: *mut alpm_list_t,
    makedepends: *mut alpm_list_t,
    checkdepends: *mut alpm_list_t,
    provides: *mut alpm_list_t,
    conflicts: *mut alpm_list_t,
    replaces: *mut alpm_list_t,
    groups: *mut alpm_list_t,
    licenses: *mut alpm_list_t,
    backup: *mut alpm_list_t,
    files: alpm_filelist_t,
}

impl Drop for alpm_handle_t {
    fn drop(&mut self) {
        // SAFETY: the handle exclusively owns its databases
        unsafe {
            free_dbs(self.dbs_sync);
            if !self.db_local.is_null() {
                drop(Box::from_raw(self.db_local));
            }
        }
    }
}

impl Drop for alpm_db_t {
    fn drop(&mut self) {
        // SAFETY: the database exclusively owns its servers and packages
        unsafe {
            alpm_list_free_inner(self.servers, Some(free));
            alpm_list_free(self.servers);
            for pkg in walk(self.pkgcache) {
                drop(Box::from_raw(pkg.cast::<alpm_pkg_t>()));
            }
            alpm_list_free(self.pkgcache);
        }
    }
}

impl Drop for alpm_pkg_t {
    fn drop(&mut self) {
        // SAFETY: every list and file entry was allocated by this module
        unsafe {
            for list in [
                self.depends,
                self.optdepends,
                self.makedepends,
                self.checkdepends,
                self.provides,
                self.conflicts,
                self.replaces,
            ] {
                for dep in walk(list) {
                    free_depend(dep.cast());
                }
                alpm_list_free(list);
            }
            for list in [self.groups, self.licenses] {
                alpm_list_free_inner(list, Some(free));
                alpm_list_free(list);
            }
            for entry in walk(self.backup) {
                let backup = Box::from_raw(entry.cast::<alpm_backup_t>());
                free(backup.name.cast());
                free(backup.hash.cast());
            }
            alpm_list_free(self.backup);

            if !self.files.files.is_null() {
                let files = Box::from_raw(ptr::slice_from_raw_parts_mut(
                    self.files.files,
                    self.files.count,
                ));
                for file in files.iter() {
                    free(file.name.cast());
                }
            }
        }
    }
}

/// Forward walk over the `data` pointers of a list
struct Walk(*const alpm_list_t);

impl Iterator for Walk {
    type Item = *mut c_void;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_null() {
            return None;
        }
        // SAFETY: constructed via `walk`, whose caller guarantees a valid chain
        let node = unsafe { &*self.0 };
        self.0 = node.next;
        Some(node.data)
    }
}

unsafe fn walk(list: *const alpm_list_t) -> Walk {
    Walk(list)
}

unsafe fn push(list: &mut *mut alpm_list_t, data: *mut c_void) {
    *list = unsafe { alpm_list_add(*list, data) };
}

/// Unlink the first node holding `data`; the data itself is not freed
unsafe fn unlink(list: &mut *mut alpm_list_t, data: *mut c_void) -> bool {
    let mut node = *list;
    while !node.is_null() {
        // SAFETY: node is part of the caller's valid chain
        unsafe {
            if (*node).data == data {
                let next = (*node).next;
                let prev = (*node).prev;
                if node == *list {
                    *list = next;
                    if !next.is_null() {
                        (*next).prev = prev;
                    }
                } else {
                    (*prev).next = next;
                    if next.is_null() {
                        (**list).prev = prev;
                    } else {
                        (*next).prev = prev;
                    }
                }
                drop(Box::from_raw(node));
                return true;
            }
            node = (*node).next;
        }
    }
    false
}

unsafe fn free_dbs(list: *mut alpm_list_t) {
    unsafe {
        for db in walk(list) {
            drop(Box::from_raw(db.cast::<alpm_db_t>()));
        }
        alpm_list_free(list);
    }
}

unsafe fn free_depend(dep: *mut alpm_depend_t) {
    if dep.is_null() {
        return;
    }
    unsafe {
        let dep = Box::from_raw(dep);
        free(dep.name.cast());
        free(dep.version.cast());
        free(dep.desc.cast());
    }
}

fn set_errno(handle: *mut alpm_handle_t, code: alpm_errno_t) {
    if !handle.is_null() {
        // SAFETY: non-null handles come from alpm_initialize
        unsafe { (*handle).pm_errno = code };
    }
}

fn opt_ptr(s: &Option<CString>) -> *const c_char {
    s.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

fn opt_cstring(s: Option<&str>) -> Result<Option<CString>> {
    Ok(s.map(CString::new).transpose()?)
}

fn raw_string(s: &str) -> Result<*mut c_char> {
    Ok(CString::new(s)?.into_raw())
}

/// sdbm, the hash libalpm stores alongside dependency names
fn name_hash(name: &str) -> std::ffi::c_ulong {
    name.bytes().fold(0, |hash: std::ffi::c_ulong, c| {
        std::ffi::c_ulong::from(c)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash)
    })
}

fn new_depend(dep: &Depend) -> Result<*mut alpm_depend_t> {
    let name = CString::new(dep.name.as_str())?;
    let version = opt_cstring(dep.version.as_deref())?;
    let desc = opt_cstring(dep.description.as_deref())?;
    Ok(Box::into_raw(Box::new(alpm_depend_t {
        name: name.into_raw(),
        version: version.map_or(ptr::null_mut(), CString::into_raw),
        desc: desc.map_or(ptr::null_mut(), CString::into_raw),
        name_hash: name_hash(&dep.name),
        mod_: dep.modifier.to_raw(),
    })))
}

fn new_db(handle: *mut alpm_handle_t, treename: CString, is_local: bool) -> *mut alpm_db_t {
    Box::into_raw(Box::new(alpm_db_t {
        handle,
        treename,
        is_local,
        usage: ALPM_DB_USAGE_ALL,
        servers: ptr::null_mut(),
        pkgcache: ptr::null_mut(),
        fail_next_search: false,
    }))
}

unsafe fn pkg_name(pkg: *const alpm_pkg_t) -> String {
    let name = unsafe { to_string(opt_ptr(&(*pkg).name)) };
    name.unwrap_or_default()
}

unsafe fn depends_of(list: *const alpm_list_t) -> Vec<Depend> {
    unsafe { walk(list).filter_map(|dep| Depend::from_raw(dep.cast::<alpm_depend_t>())).collect() }
}

// Session lifecycle

pub unsafe extern "C" fn alpm_initialize(
    root: *const c_char,
    dbpath: *const c_char,
    err: *mut alpm_errno_t,
) -> *mut alpm_handle_t {
    let report = |code: alpm_errno_t| {
        if !err.is_null() {
            // SAFETY: caller passes a writable errno slot
            unsafe { *err = code };
        }
    };

    let (Some(root), Some(dbpath)) = (unsafe { to_string(root) }, unsafe { to_string(dbpath) }) else {
        report(ALPM_ERR_WRONG_ARGS);
        return ptr::null_mut();
    };

    let root = PathBuf::from(root);
    if !root.is_dir() {
        report(ALPM_ERR_NOT_A_DIR);
        return ptr::null_mut();
    }

    let dbpath = PathBuf::from(dbpath);
    if dbpath.join("db.lck").exists() {
        report(ALPM_ERR_HANDLE_LOCK);
        return ptr::null_mut();
    }

    report(ALPM_ERR_OK);
    Box::into_raw(Box::new(alpm_handle_t {
        dbpath,
        db_local: ptr::null_mut(),
        dbs_sync: ptr::null_mut(),
        logcb: None,
        logcb_ctx: ptr::null_mut(),
        questioncb: None,
        questioncb_ctx: ptr::null_mut(),
        ignorepkg: Vec::new(),
        fail_next_option: false,
        pm_errno: ALPM_ERR_OK,
    }))
}

pub unsafe extern "C" fn alpm_release(handle: *mut alpm_handle_t) -> c_int {
    if handle.is_null() {
        return -1;
    }
    // SAFETY: handle came from alpm_initialize and is released once
    drop(unsafe { Box::from_raw(handle) });
    0
}

pub unsafe extern "C" fn alpm_errno(handle: *mut alpm_handle_t) -> alpm_errno_t {
    if handle.is_null() {
        return ALPM_ERR_HANDLE_NULL;
    }
    unsafe { (*handle).pm_errno }
}

pub unsafe extern "C" fn alpm_strerror(err: alpm_errno_t) -> *const c_char {
    let message = match err {
        ALPM_ERR_OK => c"no error",
        ALPM_ERR_MEMORY => c"out of memory!",
        ALPM_ERR_SYSTEM => c"unexpected system error",
        ALPM_ERR_NOT_A_DIR => c"could not find or read directory",
        ALPM_ERR_WRONG_ARGS => c"wrong or NULL argument passed",
        ALPM_ERR_HANDLE_NULL => c"library not initialized",
        ALPM_ERR_HANDLE_LOCK => c"unable to lock database",
        ALPM_ERR_DB_NULL => c"database is incorrect",
        ALPM_ERR_DB_NOT_NULL => c"database already registered",
        ALPM_ERR_DB_NOT_FOUND => c"could not find database",
        ALPM_ERR_DB_INVALID => c"invalid or corrupted database",
        ALPM_ERR_SERVER_BAD_URL => c"invalid url for server",
        _ => c"unexpected error",
    };
    message.as_ptr()
}

fn take_option_failure(handle: *mut alpm_handle_t) -> bool {
    // SAFETY: callers pass a non-null handle from alpm_initialize
    let h = unsafe { &mut *handle };
    if !h.fail_next_option {
        return false;
    }
    h.fail_next_option = false;
    h.pm_errno = ALPM_ERR_WRONG_ARGS;
    true
}

pub unsafe extern "C" fn alpm_option_set_logcb(
    handle: *mut alpm_handle_t,
    cb: alpm_cb_log,
    ctx: *mut c_void,
) -> c_int {
    if handle.is_null() || take_option_failure(handle) {
        return -1;
    }
    unsafe {
        (*handle).logcb = cb;
        (*handle).logcb_ctx = ctx;
    }
    0
}

pub unsafe extern "C" fn alpm_option_set_questioncb(
    handle: *mut alpm_handle_t,
    cb: alpm_cb_question,
    ctx: *mut c_void,
) -> c_int {
    if handle.is_null() || take_option_failure(handle) {
        return -1;
    }
    unsafe {
        (*handle).questioncb = cb;
        (*handle).questioncb_ctx = ctx;
    }
    0
}

// Databases

pub unsafe extern "C" fn alpm_get_localdb(handle: *mut alpm_handle_t) -> *mut alpm_db_t {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let h = unsafe { &mut *handle };
    if h.db_local.is_null() {
        if !h.dbpath.is_dir() {
            h.pm_errno = ALPM_ERR_DB_NOT_FOUND;
            return ptr::null_mut();
        }
        h.db_local = new_db(handle, c"local".to_owned(), true);
    }
    h.db_local
}

pub unsafe extern "C" fn alpm_get_syncdbs(handle: *mut alpm_handle_t) -> *mut alpm_list_t {
    if handle.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*handle).dbs_sync }
}

pub unsafe extern "C" fn alpm_register_syncdb(
    handle: *mut alpm_handle_t,
    treename: *const c_char,
    level: alpm_siglevel_t,
) -> *mut alpm_db_t {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let Some(name) = (unsafe { to_string(treename) }).filter(|name| !name.is_empty()) else {
        set_errno(handle, ALPM_ERR_WRONG_ARGS);
        return ptr::null_mut();
    };

    let h = unsafe { &mut *handle };
    let taken = name == "local"
        || unsafe { walk(h.dbs_sync) }
            .any(|db| unsafe { (*db.cast::<alpm_db_t>()).treename.to_string_lossy() == name });
    if taken {
        h.pm_errno = ALPM_ERR_DB_NOT_NULL;
        return ptr::null_mut();
    }

    let Ok(treename) = CString::new(name) else {
        h.pm_errno = ALPM_ERR_WRONG_ARGS;
        return ptr::null_mut();
    };
    // Signature checking is not modelled
    let _ = level;
    let db = new_db(handle, treename, false);
    unsafe { push(&mut h.dbs_sync, db.cast()) };
    db
}

pub unsafe extern "C" fn alpm_unregister_all_syncdbs(handle: *mut alpm_handle_t) -> c_int {
    if handle.is_null() {
        return -1;
    }
    unsafe {
        let h = &mut *handle;
        free_dbs(h.dbs_sync);
        h.dbs_sync = ptr::null_mut();
    }
    0
}

pub unsafe extern "C" fn alpm_db_unregister(db: *mut alpm_db_t) -> c_int {
    if db.is_null() {
        return -1;
    }
    unsafe {
        let handle = (*db).handle;
        let h = &mut *handle;
        if (*db).is_local {
            h.db_local = ptr::null_mut();
        } else if !unlink(&mut h.dbs_sync, db.cast()) {
            h.pm_errno = ALPM_ERR_DB_NOT_FOUND;
            return -1;
        }
        drop(Box::from_raw(db));
    }
    0
}

pub unsafe extern "C" fn alpm_db_get_name(db: *const alpm_db_t) -> *const c_char {
    if db.is_null() {
        return ptr::null();
    }
    unsafe { (*db).treename.as_ptr() }
}

pub unsafe extern "C" fn alpm_db_get_servers(db: *const alpm_db_t) -> *mut alpm_list_t {
    if db.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*db).servers }
}

/// Takes ownership of `servers`
pub unsafe extern "C" fn alpm_db_set_servers(db: *mut alpm_db_t, servers: *mut alpm_list_t) -> c_int {
    if db.is_null() {
        return -1;
    }
    unsafe {
        alpm_list_free_inner((*db).servers, Some(free));
        alpm_list_free((*db).servers);
        (*db).servers = servers;
    }
    0
}

pub unsafe extern "C" fn alpm_db_add_server(db: *mut alpm_db_t, url: *const c_char) -> c_int {
    if db.is_null() {
        return -1;
    }
    let handle = unsafe { (*db).handle };
    let Some(url) = (unsafe { to_string(url) }).filter(|url| !url.is_empty()) else {
        set_errno(handle, ALPM_ERR_SERVER_BAD_URL);
        return -1;
    };

    let Ok(url) = CString::new(url.trim_end_matches('/')) else {
        set_errno(handle, ALPM_ERR_SERVER_BAD_URL);
        return -1;
    };
    unsafe { push(&mut (*db).servers, url.into_raw().cast()) };
    0
}

pub unsafe extern "C" fn alpm_db_get_usage(db: *mut alpm_db_t, usage: *mut alpm_db_usage_t) -> c_int {
    if db.is_null() || usage.is_null() {
        return -1;
    }
    unsafe { *usage = (*db).usage };
    0
}

pub unsafe extern "C" fn alpm_db_set_usage(db: *mut alpm_db_t, usage: alpm_db_usage_t) -> c_int {
    if db.is_null() {
        return -1;
    }
    unsafe { (*db).usage = usage };
    0
}

pub unsafe extern "C" fn alpm_db_get_pkg(db: *mut alpm_db_t, name: *const c_char) -> *mut alpm_pkg_t {
    if db.is_null() {
        return ptr::null_mut();
    }
    let Some(name) = (unsafe { to_string(name) }) else {
        set_errno(unsafe { (*db).handle }, ALPM_ERR_WRONG_ARGS);
        return ptr::null_mut();
    };
    let cache = unsafe { walk((*db).pkgcache) };
    cache
        .map(|pkg| pkg.cast::<alpm_pkg_t>())
        .find(|&pkg| unsafe { pkg_name(pkg) } == name)
        .unwrap_or(ptr::null_mut())
}

pub unsafe extern "C" fn alpm_db_get_pkgcache(db: *mut alpm_db_t) -> *mut alpm_list_t {
    if db.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*db).pkgcache }
}

/// Case-insensitive substring search over name, description and provides;
/// every needle must match
pub unsafe extern "C" fn alpm_db_search(
    db: *mut alpm_db_t,
    needles: *const alpm_list_t,
    ret: *mut *mut alpm_list_t,
) -> c_int {
    if db.is_null() || ret.is_null() {
        return -1;
    }
    let d = unsafe { &mut *db };
    if d.fail_next_search {
        d.fail_next_search = false;
        set_errno(d.handle, ALPM_ERR_DB_INVALID);
        return -1;
    }
    set_errno(d.handle, ALPM_ERR_OK);
    if d.usage & ALPM_DB_USAGE_SEARCH == 0 {
        return 0;
    }

    let needles: Vec<String> = unsafe { walk(needles) }
        .filter_map(|needle| unsafe { to_string(needle.cast::<c_char>()) })
        .map(|needle| needle.to_lowercase())
        .collect();

    let mut found: *mut alpm_list_t = ptr::null_mut();
    for entry in unsafe { walk(d.pkgcache) } {
        let pkg = unsafe { &*entry.cast::<alpm_pkg_t>() };
        let mut haystacks: Vec<String> = [&pkg.name, &pkg.desc]
            .into_iter()
            .filter_map(|field| field.as_ref().map(|s| s.to_string_lossy().to_lowercase()))
            .collect();
        haystacks.extend(
            unsafe { depends_of(pkg.provides) }
                .into_iter()
                .map(|provide| provide.name.to_lowercase()),
        );

        if needles
            .iter()
            .all(|needle| haystacks.iter().any(|hay| hay.contains(needle.as_str())))
        {
            unsafe { push(&mut found, entry) };
        }
    }
    unsafe { *ret = found };
    0
}

/// Packages of group `name` across `dbs`; a name already taken from an
/// earlier database is skipped
pub unsafe extern "C" fn alpm_find_group_pkgs(dbs: *mut alpm_list_t, name: *const c_char) -> *mut alpm_list_t {
    let Some(group) = (unsafe { to_string(name) }) else {
        return ptr::null_mut();
    };

    let mut found: *mut alpm_list_t = ptr::null_mut();
    let mut seen: Vec<String> = Vec::new();
    for db in unsafe { walk(dbs) } {
        let db = unsafe { &*db.cast::<alpm_db_t>() };
        for entry in unsafe { walk(db.pkgcache) } {
            let pkg = unsafe { &*entry.cast::<alpm_pkg_t>() };
            let in_group = unsafe { walk(pkg.groups) }
                .any(|g| unsafe { to_string(g.cast::<c_char>()) }.as_deref() == Some(group.as_str()));
            if !in_group {
                continue;
            }
            let name = unsafe { pkg_name(pkg) };
            if !seen.contains(&name) {
                seen.push(name);
                unsafe { push(&mut found, entry) };
            }
        }
    }
    found
}

// Packages

macro_rules! pkg_strings {
    ($($func:ident => $field:ident),* $(,)?) => {$(
        pub unsafe extern "C" fn $func(pkg: *mut alpm_pkg_t) -> *const c_char {
            if pkg.is_null() {
                return ptr::null();
            }
            opt_ptr(unsafe { &(*pkg).$field })
        }
    )*};
}

macro_rules! pkg_values {
    ($($func:ident => $field:ident: $ty:ty),* $(,)?) => {$(
        pub unsafe extern "C" fn $func(pkg: *mut alpm_pkg_t) -> $ty {
            if pkg.is_null() {
                return <$ty>::default();
            }
            unsafe { (*pkg).$field }
        }
    )*};
}

macro_rules! pkg_lists {
    ($($func:ident => $field:ident),* $(,)?) => {$(
        pub unsafe extern "C" fn $func(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t {
            if pkg.is_null() {
                return ptr::null_mut();
            }
            unsafe { (*pkg).$field }
        }
    )*};
}

pkg_strings! {
    alpm_pkg_get_name => name,
    alpm_pkg_get_version => version,
    alpm_pkg_get_desc => desc,
    alpm_pkg_get_url => url,
    alpm_pkg_get_packager => packager,
    alpm_pkg_get_arch => arch,
    alpm_pkg_get_base => base,
    alpm_pkg_get_filename => filename,
    alpm_pkg_get_md5sum => md5sum,
    alpm_pkg_get_sha256sum => sha256sum,
    alpm_pkg_get_base64_sig => base64_sig,
}

pkg_values! {
    alpm_pkg_get_size => size: off_t,
    alpm_pkg_get_isize => isize: off_t,
    alpm_pkg_get_builddate => builddate: alpm_time_t,
    alpm_pkg_get_installdate => installdate: alpm_time_t,
    alpm_pkg_get_reason => reason: alpm_pkgreason_t,
    alpm_pkg_get_origin => origin: alpm_pkgfrom_t,
    alpm_pkg_get_validation => validation: alpm_pkgvalidation_t,
}

pkg_lists! {
    alpm_pkg_get_depends => depends,
    alpm_pkg_get_optdepends => optdepends,
    alpm_pkg_get_makedepends => makedepends,
    alpm_pkg_get_checkdepends => checkdepends,
    alpm_pkg_get_provides => provides,
    alpm_pkg_get_conflicts => conflicts,
    alpm_pkg_get_replaces => replaces,
    alpm_pkg_get_groups => groups,
    alpm_pkg_get_licenses => licenses,
    alpm_pkg_get_backup => backup,
}

pub unsafe extern "C" fn alpm_pkg_get_db(pkg: *mut alpm_pkg_t) -> *mut alpm_db_t {
    if pkg.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*pkg).db }
}

pub unsafe extern "C" fn alpm_pkg_get_files(pkg: *mut alpm_pkg_t) -> *mut alpm_filelist_t {
    if pkg.is_null() {
        return ptr::null_mut();
    }
    unsafe { &mut (*pkg).files }
}

unsafe fn compute_reverse_deps(pkg: *mut alpm_pkg_t, optional: bool) -> *mut alpm_list_t {
    if pkg.is_null() {
        return ptr::null_mut();
    }
    let p = unsafe { &*pkg };
    let h = unsafe { &*p.handle };
    let name = unsafe { pkg_name(pkg) };
    let version = unsafe { to_string(opt_ptr(&p.version)) }.unwrap_or_default();
    let provides = unsafe { depends_of(p.provides) };

    let dbs: Vec<*mut alpm_db_t> = if p.origin == ALPM_PKG_FROM_SYNCDB {
        let sync = unsafe { walk(h.dbs_sync) };
        sync.map(|db| db.cast::<alpm_db_t>()).collect()
    } else if h.db_local.is_null() {
        Vec::new()
    } else {
        vec![h.db_local]
    };

    let mut names: Vec<String> = Vec::new();
    for db in dbs {
        for entry in unsafe { walk((*db).pkgcache) } {
            let candidate = unsafe { &*entry.cast::<alpm_pkg_t>() };
            let deps = if optional { candidate.optdepends } else { candidate.depends };
            let needs = unsafe { depends_of(deps) }
                .iter()
                .any(|dep| dep.is_satisfied_by(&name, &version, &provides));
            if needs {
                let candidate_name = unsafe { pkg_name(candidate) };
                if !names.contains(&candidate_name) {
                    names.push(candidate_name);
                }
            }
        }
    }
    if p.origin == ALPM_PKG_FROM_SYNCDB {
        names.sort();
    }

    let mut out: *mut alpm_list_t = ptr::null_mut();
    for name in names {
        if let Ok(raw) = raw_string(&name) {
            unsafe { push(&mut out, raw.cast()) };
        }
    }
    out
}

/// Caller frees the list and its strings
pub unsafe extern "C" fn alpm_pkg_compute_requiredby(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t {
    unsafe { compute_reverse_deps(pkg, false) }
}

/// Caller frees the list and its strings
pub unsafe extern "C" fn alpm_pkg_compute_optionalfor(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t {
    unsafe { compute_reverse_deps(pkg, true) }
}

pub unsafe extern "C" fn alpm_pkg_should_ignore(handle: *mut alpm_handle_t, pkg: *mut alpm_pkg_t) -> c_int {
    if handle.is_null() || pkg.is_null() {
        return 0;
    }
    let name = unsafe { pkg_name(pkg) };
    let groups: Vec<String> = unsafe { walk((*pkg).groups) }
        .filter_map(|g| unsafe { to_string(g.cast::<c_char>()) })
        .collect();
    let ignored = unsafe { &(*handle).ignorepkg }
        .iter()
        .any(|entry| *entry == name || groups.contains(entry));
    c_int::from(ignored)
}

pub unsafe extern "C" fn alpm_filelist_contains(
    filelist: *const alpm_filelist_t,
    path: *const c_char,
) -> *mut alpm_file_t {
    if filelist.is_null() || path.is_null() {
        return ptr::null_mut();
    }
    let Some(path) = (unsafe { to_string(path) }) else {
        return ptr::null_mut();
    };
    let list = unsafe { &*filelist };
    for idx in 0..list.count {
        let file = unsafe { list.files.add(idx) };
        if unsafe { to_string((*file).name) }.as_deref() == Some(path.as_str()) {
            return file;
        }
    }
    ptr::null_mut()
}

// Lists and memory

/// Append `data`, returning the (possibly new) head
pub unsafe extern "C" fn alpm_list_add(list: *mut alpm_list_t, data: *mut c_void) -> *mut alpm_list_t {
    let node = Box::into_raw(Box::new(alpm_list_t {
        data,
        prev: ptr::null_mut(),
        next: ptr::null_mut(),
    }));
    unsafe {
        if list.is_null() {
            (*node).prev = node;
            return node;
        }
        let tail = (*list).prev;
        (*tail).next = node;
        (*node).prev = tail;
        (*list).prev = node;
    }
    list
}

/// Free the nodes, leaving the data alone
pub unsafe extern "C" fn alpm_list_free(list: *mut alpm_list_t) {
    let mut node = list;
    while !node.is_null() {
        unsafe {
            let next = (*node).next;
            drop(Box::from_raw(node));
            node = next;
        }
    }
}

pub unsafe extern "C" fn alpm_list_free_inner(list: *mut alpm_list_t, f: alpm_list_fn_free) {
    let Some(f) = f else { return };
    for data in unsafe { walk(list) } {
        if !data.is_null() {
            unsafe { f(data) };
        }
    }
}

/// Release a string allocated by this backend
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr.cast()) });
    }
}

/// Messages from this backend arrive preformatted with no argument list
///
/// # Safety
///
/// `fmt` must be NULL or a NUL-terminated string.
pub unsafe fn render_log_message(fmt: *const c_char, _args: va_list) -> String {
    let message = unsafe { to_string(fmt) };
    message.unwrap_or_default()
}

// Population and event helpers

/// Add a package record to `db`, returning a wrapper bound to it
pub fn seed_package(db: &Db, record: &MemPackage) -> Result<Package> {
    let db_ptr = db.as_ptr()?;
    let d = unsafe { &mut *db_ptr };

    let duplicate = unsafe { walk(d.pkgcache) }
        .any(|pkg| unsafe { pkg_name(pkg.cast::<alpm_pkg_t>()) } == record.name);
    if duplicate {
        return Err(Error::InvalidArgument(format!(
            "Package {} already exists in {}",
            record.name,
            d.treename.to_string_lossy()
        )));
    }

    let mut pkg = Box::new(alpm_pkg_t {
        handle: d.handle,
        db: db_ptr,
        origin: if d.is_local { ALPM_PKG_FROM_LOCALDB } else { ALPM_PKG_FROM_SYNCDB },
        name: Some(CString::new(record.name.as_str())?),
        version: Some(CString::new(record.version.as_str())?),
        desc: opt_cstring(record.description.as_deref())?,
        url: opt_cstring(record.url.as_deref())?,
        packager: opt_cstring(record.packager.as_deref())?,
        arch: opt_cstring(record.architecture.as_deref())?,
        base: opt_cstring(record.base.as_deref())?,
        filename: opt_cstring(record.filename.as_deref())?,
        md5sum: opt_cstring(record.md5sum.as_deref())?,
        sha256sum: opt_cstring(record.sha256sum.as_deref())?,
        base64_sig: opt_cstring(record.base64_signature.as_deref())?,
        size: record.size,
        isize: record.isize,
        builddate: record.build_date.map_or(0, |date| date.timestamp()),
        installdate: record.install_date.map_or(0, |date| date.timestamp()),
        reason: record.reason.to_raw(),
        validation: record.validation.bits(),
        depends: ptr::null_mut(),
        optdepends: ptr::null_mut(),
        makedepends: ptr::null_mut(),
        checkdepends: ptr::null_mut(),
        provides: ptr::null_mut(),
        conflicts: ptr::null_mut(),
        replaces: ptr::null_mut(),
        groups: ptr::null_mut(),
        licenses: ptr::null_mut(),
        backup: ptr::null_mut(),
        files: alpm_filelist_t {
            count: 0,
            files: ptr::null_mut(),
        },
    });

    // Anything pushed so far is freed by the Box if a later entry fails
    for (list, deps) in [
        (&mut pkg.depends, &record.depends),
        (&mut pkg.optdepends, &record.optional_depends),
        (&mut pkg.makedepends, &record.make_depends),
        (&mut pkg.checkdepends, &record.check_depends),
        (&mut pkg.provides, &record.provides),
        (&mut pkg.conflicts, &record.conflicts),
        (&mut pkg.replaces, &record.replaces),
    ] {
        for dep in deps {
            unsafe { push(list, new_depend(dep)?.cast()) };
        }
    }
    for (list, strings) in [(&mut pkg.groups, &record.groups), (&mut pkg.licenses, &record.licenses)] {
        for s in strings {
            unsafe { push(list, raw_string(s)?.cast()) };
        }
    }
    for backup in &record.backup {
        let name = CString::new(backup.name.as_str())?;
        let hash = CString::new(backup.hash.as_str())?;
        let entry = Box::into_raw(Box::new(alpm_backup_t {
            name: name.into_raw(),
            hash: hash.into_raw(),
        }));
        unsafe { push(&mut pkg.backup, entry.cast()) };
    }

    let mut files = Vec::with_capacity(record.files.len());
    for file in &record.files {
        files.push(CString::new(file.name.as_str())?);
    }
    let entries: Box<[alpm_file_t]> = files
        .into_iter()
        .zip(&record.files)
        .map(|(name, file)| alpm_file_t {
            name: name.into_raw(),
            size: file.size,
            mode: file.mode,
        })
        .collect();
    pkg.files.count = entries.len();
    pkg.files.files = Box::into_raw(entries).cast();

    let raw = Box::into_raw(pkg);
    unsafe { push(&mut d.pkgcache, raw.cast()) };
    Ok(Package::from_raw(raw, db.binding().clone()))
}

/// Make the next search on `db` fail as a corrupted database would
pub fn fail_next_search(db: &Db) -> Result<()> {
    let db_ptr = db.as_ptr()?;
    unsafe { (*db_ptr).fail_next_search = true };
    Ok(())
}

/// Make the next callback setter on `handle` fail
pub fn fail_next_option(handle: &Handle) -> Result<()> {
    let handle_ptr = handle.as_ptr()?;
    unsafe { (*handle_ptr).fail_next_option = true };
    Ok(())
}

/// Add a package or group name to the handle's ignore list
pub fn ignore_package(handle: &Handle, name: &str) -> Result<()> {
    let handle_ptr = handle.as_ptr()?;
    unsafe { (*handle_ptr).ignorepkg.push(name.to_string()) };
    Ok(())
}

/// Deliver a log line through the registered log callback, if any
pub fn emit_log(handle: &Handle, level: LogLevel, message: &str) -> Result<()> {
    let handle_ptr = handle.as_ptr()?;
    let message = CString::new(message)?;
    let (cb, ctx) = unsafe { ((*handle_ptr).logcb, (*handle_ptr).logcb_ctx) };
    if let Some(cb) = cb {
        unsafe { cb(ctx, level.to_raw(), message.as_ptr(), ptr::null_mut()) };
    }
    Ok(())
}

/// A question libalpm may put to the front end during a transaction
pub enum SimQuestion<'a> {
    InstallIgnorePkg { pkg: &'a Package },
    Replace { old: &'a Package, new: &'a Package },
    Conflict { first: &'a Package, second: &'a Package, reason: &'a str },
    Corrupted { filepath: &'a str, reason: i32 },
    RemovePkgs { packages: &'a [Package] },
    SelectProvider { depend: &'a str, providers: &'a [Package] },
    ImportKey { uid: &'a str, fingerprint: &'a str },
}

/// Put a question to the registered question callback and return the
/// answer it left behind (0 when no callback is registered)
pub fn ask_question(handle: &Handle, question: SimQuestion<'_>) -> Result<i32> {
    let handle_ptr = handle.as_ptr()?;
    let (cb, ctx) = unsafe { ((*handle_ptr).questioncb, (*handle_ptr).questioncb_ctx) };

    let pkg_list = |pkgs: &[Package]| -> Result<*mut alpm_list_t> {
        let mut list: *mut alpm_list_t = ptr::null_mut();
        for pkg in pkgs {
            let raw = match pkg.as_ptr() {
                Ok(raw) => raw,
                Err(err) => {
                    unsafe { alpm_list_free(list) };
                    return Err(err);
                }
            };
            unsafe { push(&mut list, raw.cast()) };
        }
        Ok(list)
    };

    let mut strings: Vec<CString> = Vec::new();
    let mut owned_list: *mut alpm_list_t = ptr::null_mut();
    let mut owned_depend: *mut alpm_depend_t = ptr::null_mut();
    let mut conflict: Option<Box<alpm_conflict_t>> = None;

    let mut raw = match question {
        SimQuestion::InstallIgnorePkg { pkg } => alpm_question_t {
            install_ignorepkg: alpm_question_install_ignorepkg_t {
                type_: ALPM_QUESTION_INSTALL_IGNOREPKG,
                install: 0,
                pkg: pkg.as_ptr()?,
            },
        },
        SimQuestion::Replace { old, new } => {
            let newpkg = new.as_ptr()?;
            alpm_question_t {
                replace: alpm_question_replace_t {
                    type_: ALPM_QUESTION_REPLACE_PKG,
                    replace: 0,
                    oldpkg: old.as_ptr()?,
                    newpkg,
                    newdb: unsafe { alpm_pkg_get_db(newpkg) },
                },
            }
        }
        SimQuestion::Conflict { first, second, reason } => {
            let reason: Depend = reason.parse().map_err(Error::InvalidArgument)?;
            let record = conflict.insert(Box::new(alpm_conflict_t {
                package1: first.as_ptr()?,
                package2: second.as_ptr()?,
                reason: new_depend(&reason)?,
            }));
            alpm_question_t {
                conflict: alpm_question_conflict_t {
                    type_: ALPM_QUESTION_CONFLICT_PKG,
                    remove: 0,
                    conflict: &mut **record,
                },
            }
        }
        SimQuestion::Corrupted { filepath, reason } => {
            let filepath = CString::new(filepath)?;
            let question = alpm_question_t {
                corrupted: alpm_question_corrupted_t {
                    type_: ALPM_QUESTION_CORRUPTED_PKG,
                    remove: 0,
                    filepath: filepath.as_ptr(),
                    reason,
                },
            };
            strings.push(filepath);
            question
        }
        SimQuestion::RemovePkgs { packages } => {
            owned_list = pkg_list(packages)?;
            alpm_question_t {
                remove_pkgs: alpm_question_remove_pkgs_t {
                    type_: ALPM_QUESTION_REMOVE_PKGS,
                    skip: 0,
                    packages: owned_list,
                },
            }
        }
        SimQuestion::SelectProvider { depend, providers } => {
            let depend: Depend = depend.parse().map_err(Error::InvalidArgument)?;
            owned_depend = new_depend(&depend)?;
            owned_list = match pkg_list(providers) {
                Ok(list) => list,
                Err(err) => {
                    unsafe { free_depend(owned_depend) };
                    return Err(err);
                }
            };
            alpm_question_t {
                select_provider: alpm_question_select_provider_t {
                    type_: ALPM_QUESTION_SELECT_PROVIDER,
                    use_index: 0,
                    providers: owned_list,
                    depend: owned_depend,
                },
            }
        }
        SimQuestion::ImportKey { uid, fingerprint } => {
            let uid = CString::new(uid)?;
            let fingerprint = CString::new(fingerprint)?;
            let question = alpm_question_t {
                import_key: alpm_question_import_key_t {
                    type_: ALPM_QUESTION_IMPORT_KEY,
                    import: 0,
                    uid: uid.as_ptr(),
                    fingerprint: fingerprint.as_ptr(),
                },
            };
            strings.push(uid);
            strings.push(fingerprint);
            question
        }
    };

    if let Some(cb) = cb {
        unsafe { cb(ctx, &mut raw) };
    }
    let answer = unsafe { raw.any.answer };

    unsafe {
        alpm_list_free(owned_list);
        free_depend(owned_depend);
        if let Some(conflict) = conflict {
            free_depend(conflict.reason);
        }
    }
    drop(strings);
    Ok(answer)
}
