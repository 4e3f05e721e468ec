// src/ffi/sys.rs

//! Entry points of the system libalpm

use super::*;
use std::ffi::{c_char, c_int, c_void};

#[repr(C)]
pub struct alpm_handle_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct alpm_db_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct alpm_pkg_t {
    _private: [u8; 0],
}

#[link(name = "alpm")]
unsafe extern "C" {
    pub fn alpm_initialize(
        root: *const c_char,
        dbpath: *const c_char,
        err: *mut alpm_errno_t,
    ) -> *mut alpm_handle_t;
    pub fn alpm_release(handle: *mut alpm_handle_t) -> c_int;
    pub fn alpm_errno(handle: *mut alpm_handle_t) -> alpm_errno_t;
    pub fn alpm_strerror(err: alpm_errno_t) -> *const c_char;

    pub fn alpm_option_set_logcb(
        handle: *mut alpm_handle_t,
        cb: alpm_cb_log,
        ctx: *mut c_void,
    ) -> c_int;
    pub fn alpm_option_set_questioncb(
        handle: *mut alpm_handle_t,
        cb: alpm_cb_question,
        ctx: *mut c_void,
    ) -> c_int;

    pub fn alpm_get_localdb(handle: *mut alpm_handle_t) -> *mut alpm_db_t;
    pub fn alpm_get_syncdbs(handle: *mut alpm_handle_t) -> *mut alpm_list_t;
    pub fn alpm_register_syncdb(
        handle: *mut alpm_handle_t,
        treename: *const c_char,
        level: alpm_siglevel_t,
    ) -> *mut alpm_db_t;
    pub fn alpm_unregister_all_syncdbs(handle: *mut alpm_handle_t) -> c_int;
    pub fn alpm_db_unregister(db: *mut alpm_db_t) -> c_int;
    pub fn alpm_db_get_name(db: *const alpm_db_t) -> *const c_char;
    pub fn alpm_db_get_servers(db: *const alpm_db_t) -> *mut alpm_list_t;
    pub fn alpm_db_set_servers(db: *mut alpm_db_t, servers: *mut alpm_list_t) -> c_int;
    pub fn alpm_db_add_server(db: *mut alpm_db_t, url: *const c_char) -> c_int;
    pub fn alpm_db_get_usage(db: *mut alpm_db_t, usage: *mut alpm_db_usage_t) -> c_int;
    pub fn alpm_db_set_usage(db: *mut alpm_db_t, usage: alpm_db_usage_t) -> c_int;
    pub fn alpm_db_get_pkg(db: *mut alpm_db_t, name: *const c_char) -> *mut alpm_pkg_t;
    pub fn alpm_db_get_pkgcache(db: *mut alpm_db_t) -> *mut alpm_list_t;
    pub fn alpm_db_search(
        db: *mut alpm_db_t,
        needles: *const alpm_list_t,
        ret: *mut *mut alpm_list_t,
    ) -> c_int;
    pub fn alpm_find_group_pkgs(dbs: *mut alpm_list_t, name: *const c_char) -> *mut alpm_list_t;

    pub fn alpm_pkg_get_name(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_version(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_desc(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_url(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_packager(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_arch(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_base(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_filename(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_md5sum(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_sha256sum(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_base64_sig(pkg: *mut alpm_pkg_t) -> *const c_char;
    pub fn alpm_pkg_get_size(pkg: *mut alpm_pkg_t) -> off_t;
    pub fn alpm_pkg_get_isize(pkg: *mut alpm_pkg_t) -> off_t;
    pub fn alpm_pkg_get_builddate(pkg: *mut alpm_pkg_t) -> alpm_time_t;
    pub fn alpm_pkg_get_installdate(pkg: *mut alpm_pkg_t) -> alpm_time_t;
    pub fn alpm_pkg_get_reason(pkg: *mut alpm_pkg_t) -> alpm_pkgreason_t;
    pub fn alpm_pkg_get_origin(pkg: *mut alpm_pkg_t) -> alpm_pkgfrom_t;
    pub fn alpm_pkg_get_validation(pkg: *mut alpm_pkg_t) -> alpm_pkgvalidation_t;
    pub fn alpm_pkg_get_db(pkg: *mut alpm_pkg_t) -> *mut alpm_db_t;
    pub fn alpm_pkg_get_depends(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_optdepends(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_makedepends(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_checkdepends(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_provides(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_conflicts(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_replaces(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_groups(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_licenses(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_get_files(pkg: *mut alpm_pkg_t) -> *mut alpm_filelist_t;
    pub fn alpm_pkg_get_backup(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_compute_requiredby(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_compute_optionalfor(pkg: *mut alpm_pkg_t) -> *mut alpm_list_t;
    pub fn alpm_pkg_should_ignore(handle: *mut alpm_handle_t, pkg: *mut alpm_pkg_t) -> c_int;
    pub fn alpm_filelist_contains(
        filelist: *const alpm_filelist_t,
        path: *const c_char,
    ) -> *mut alpm_file_t;

    pub fn alpm_list_add(list: *mut alpm_list_t, data: *mut c_void) -> *mut alpm_list_t;
    pub fn alpm_list_free(list: *mut alpm_list_t);
    pub fn alpm_list_free_inner(list: *mut alpm_list_t, f: alpm_list_fn_free);

    pub fn free(ptr: *mut c_void);
    fn vasprintf(out: *mut *mut c_char, fmt: *const c_char, args: va_list) -> c_int;
}

/// Expand a printf-style log line handed to the log callback
///
/// # Safety
///
/// `fmt` and `args` must be the pair libalpm passed to the callback; the
/// argument list is consumed.
pub unsafe fn render_log_message(fmt: *const c_char, args: va_list) -> String {
    let mut out: *mut c_char = std::ptr::null_mut();
    // SAFETY: fmt/args come straight from libalpm and are consumed once
    let len = unsafe { vasprintf(&mut out, fmt, args) };
    if len < 0 || out.is_null() {
        // SAFETY: fmt is a valid NUL-terminated format string
        return unsafe { to_string(fmt) }.unwrap_or_default();
    }
    // SAFETY: vasprintf produced a NUL-terminated malloc'd buffer
    let message = unsafe { to_string(out) }.unwrap_or_default();
    unsafe { free(out.cast()) };
    message
}
