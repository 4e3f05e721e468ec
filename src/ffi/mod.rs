// src/ffi/mod.rs

//! Raw libalpm C ABI
//!
//! This module declares the subset of the libalpm interface the safe layer
//! uses: `#[repr(C)]` layouts for lists, files, dependencies and questions,
//! the numeric constants, and the function entry points.
//!
//! Two backends provide the entry points:
//! - `sys` (feature `libalpm`): an `extern "C"` block linked against the
//!   system libalpm
//! - `sim` (default): an in-process stand-in exporting the same names and
//!   signatures, so the safe layer can be exercised without an Arch system
//!
//! Nothing outside this crate's safe wrappers should call into here.

#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::{CStr, c_char, c_int, c_ulong, c_void};

#[cfg(feature = "libalpm")]
mod sys;
#[cfg(feature = "libalpm")]
pub use sys::*;

#[cfg(not(feature = "libalpm"))]
pub mod sim;
#[cfg(not(feature = "libalpm"))]
pub use sim::*;

pub type alpm_errno_t = c_int;
pub type alpm_loglevel_t = c_int;
pub type alpm_question_type_t = c_int;
pub type alpm_depmod_t = c_int;
pub type alpm_pkgreason_t = c_int;
pub type alpm_pkgfrom_t = c_int;
pub type alpm_pkgvalidation_t = c_int;
pub type alpm_db_usage_t = c_int;
pub type alpm_siglevel_t = c_int;
pub type alpm_time_t = i64;
pub type off_t = i64;
pub type mode_t = u32;

/// Opaque stand-in for the platform `va_list` as it is received by a
/// callback. On the supported targets it is passed as a single pointer.
pub type va_list = *mut c_void;

pub type alpm_cb_log = Option<
    unsafe extern "C" fn(ctx: *mut c_void, level: alpm_loglevel_t, fmt: *const c_char, args: va_list),
>;
pub type alpm_cb_question =
    Option<unsafe extern "C" fn(ctx: *mut c_void, question: *mut alpm_question_t)>;
pub type alpm_list_fn_free = Option<unsafe extern "C" fn(ptr: *mut c_void)>;

/// Doubly linked list node; `prev` of the head points at the tail
#[repr(C)]
pub struct alpm_list_t {
    pub data: *mut c_void,
    pub prev: *mut alpm_list_t,
    pub next: *mut alpm_list_t,
}

#[repr(C)]
pub struct alpm_file_t {
    pub name: *mut c_char,
    pub size: off_t,
    pub mode: mode_t,
}

#[repr(C)]
pub struct alpm_filelist_t {
    pub count: usize,
    pub files: *mut alpm_file_t,
}

#[repr(C)]
pub struct alpm_backup_t {
    pub name: *mut c_char,
    pub hash: *mut c_char,
}

#[repr(C)]
pub struct alpm_depend_t {
    pub name: *mut c_char,
    pub version: *mut c_char,
    pub desc: *mut c_char,
    pub name_hash: c_ulong,
    pub mod_: alpm_depmod_t,
}

#[repr(C)]
pub struct alpm_conflict_t {
    pub package1: *mut alpm_pkg_t,
    pub package2: *mut alpm_pkg_t,
    pub reason: *mut alpm_depend_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_any_t {
    pub type_: alpm_question_type_t,
    pub answer: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_install_ignorepkg_t {
    pub type_: alpm_question_type_t,
    pub install: c_int,
    pub pkg: *mut alpm_pkg_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_replace_t {
    pub type_: alpm_question_type_t,
    pub replace: c_int,
    pub oldpkg: *mut alpm_pkg_t,
    pub newpkg: *mut alpm_pkg_t,
    pub newdb: *mut alpm_db_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_conflict_t {
    pub type_: alpm_question_type_t,
    pub remove: c_int,
    pub conflict: *mut alpm_conflict_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_corrupted_t {
    pub type_: alpm_question_type_t,
    pub remove: c_int,
    pub filepath: *const c_char,
    pub reason: alpm_errno_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_remove_pkgs_t {
    pub type_: alpm_question_type_t,
    pub skip: c_int,
    pub packages: *mut alpm_list_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_select_provider_t {
    pub type_: alpm_question_type_t,
    pub use_index: c_int,
    pub providers: *mut alpm_list_t,
    pub depend: *mut alpm_depend_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct alpm_question_import_key_t {
    pub type_: alpm_question_type_t,
    pub import: c_int,
    pub uid: *const c_char,
    pub fingerprint: *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union alpm_question_t {
    pub type_: alpm_question_type_t,
    pub any: alpm_question_any_t,
    pub install_ignorepkg: alpm_question_install_ignorepkg_t,
    pub replace: alpm_question_replace_t,
    pub conflict: alpm_question_conflict_t,
    pub corrupted: alpm_question_corrupted_t,
    pub remove_pkgs: alpm_question_remove_pkgs_t,
    pub select_provider: alpm_question_select_provider_t,
    pub import_key: alpm_question_import_key_t,
}

// Log levels
pub const ALPM_LOG_ERROR: alpm_loglevel_t = 1;
pub const ALPM_LOG_WARNING: alpm_loglevel_t = 1 << 1;
pub const ALPM_LOG_DEBUG: alpm_loglevel_t = 1 << 2;
pub const ALPM_LOG_FUNCTION: alpm_loglevel_t = 1 << 3;

// Question kinds
pub const ALPM_QUESTION_INSTALL_IGNOREPKG: alpm_question_type_t = 1;
pub const ALPM_QUESTION_REPLACE_PKG: alpm_question_type_t = 1 << 1;
pub const ALPM_QUESTION_CONFLICT_PKG: alpm_question_type_t = 1 << 2;
pub const ALPM_QUESTION_CORRUPTED_PKG: alpm_question_type_t = 1 << 3;
pub const ALPM_QUESTION_REMOVE_PKGS: alpm_question_type_t = 1 << 4;
pub const ALPM_QUESTION_SELECT_PROVIDER: alpm_question_type_t = 1 << 5;
pub const ALPM_QUESTION_IMPORT_KEY: alpm_question_type_t = 1 << 6;

// Dependency modifiers
pub const ALPM_DEP_MOD_ANY: alpm_depmod_t = 1;
pub const ALPM_DEP_MOD_EQ: alpm_depmod_t = 2;
pub const ALPM_DEP_MOD_GE: alpm_depmod_t = 3;
pub const ALPM_DEP_MOD_LE: alpm_depmod_t = 4;
pub const ALPM_DEP_MOD_GT: alpm_depmod_t = 5;
pub const ALPM_DEP_MOD_LT: alpm_depmod_t = 6;

// Install reasons
pub const ALPM_PKG_REASON_EXPLICIT: alpm_pkgreason_t = 0;
pub const ALPM_PKG_REASON_DEPEND: alpm_pkgreason_t = 1;

// Package origins
pub const ALPM_PKG_FROM_FILE: alpm_pkgfrom_t = 1;
pub const ALPM_PKG_FROM_LOCALDB: alpm_pkgfrom_t = 2;
pub const ALPM_PKG_FROM_SYNCDB: alpm_pkgfrom_t = 3;

// Database usage
pub const ALPM_DB_USAGE_SYNC: alpm_db_usage_t = 1;
pub const ALPM_DB_USAGE_SEARCH: alpm_db_usage_t = 1 << 1;
pub const ALPM_DB_USAGE_INSTALL: alpm_db_usage_t = 1 << 2;
pub const ALPM_DB_USAGE_UPGRADE: alpm_db_usage_t = 1 << 3;
pub const ALPM_DB_USAGE_ALL: alpm_db_usage_t = (1 << 4) - 1;

// Error codes used by the safe layer
pub const ALPM_ERR_OK: alpm_errno_t = 0;
pub const ALPM_ERR_MEMORY: alpm_errno_t = 1;
pub const ALPM_ERR_SYSTEM: alpm_errno_t = 2;
pub const ALPM_ERR_NOT_A_DIR: alpm_errno_t = 5;
pub const ALPM_ERR_WRONG_ARGS: alpm_errno_t = 6;
pub const ALPM_ERR_HANDLE_NULL: alpm_errno_t = 8;
pub const ALPM_ERR_HANDLE_LOCK: alpm_errno_t = 10;
pub const ALPM_ERR_DB_NULL: alpm_errno_t = 13;
pub const ALPM_ERR_DB_NOT_NULL: alpm_errno_t = 14;
pub const ALPM_ERR_DB_NOT_FOUND: alpm_errno_t = 15;
pub const ALPM_ERR_DB_INVALID: alpm_errno_t = 16;
pub const ALPM_ERR_SERVER_BAD_URL: alpm_errno_t = 21;

/// Copy a borrowed C string into an owned `String`, `None` for NULL
///
/// # Safety
///
/// `ptr` must be NULL or point at a NUL-terminated string.
pub unsafe fn to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null and NUL-terminated per the caller's contract
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}
