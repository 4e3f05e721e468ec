// src/handle.rs

//! Session handle
//!
//! A [`Handle`] owns one libalpm session. Database, package and list
//! wrappers hold a [`Binding`] back to the session and check it before
//! touching native memory:
//! - once the handle is released, every bound object reports
//!   [`Error::AlreadyReleased`]
//! - once a database is unregistered, objects bound to it report
//!   [`Error::Invalidated`]
//!
//! Databases are tracked by address plus a generation number, so a new
//! database that happens to reuse a freed address does not revive stale
//! wrappers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::callbacks::{self, Token};
use crate::db::{Db, DbList};
use crate::error::{Error, Result};
use crate::ffi;
use crate::list::RawList;
use crate::packages::traits::{Database, DatabaseCollection};
use crate::types::SigLevel;

/// Identity of a registered database within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DbKey {
    addr: usize,
    generation: u64,
}

/// Shared state of a native session
pub(crate) struct Session {
    ptr: Cell<*mut ffi::alpm_handle_t>,
    root: PathBuf,
    dbpath: PathBuf,
    /// Live databases: address -> generation
    dbs: RefCell<HashMap<usize, u64>>,
    next_generation: Cell<u64>,
}

impl Session {
    pub(crate) fn ptr(&self) -> Result<*mut ffi::alpm_handle_t> {
        let ptr = self.ptr.get();
        if ptr.is_null() {
            Err(Error::AlreadyReleased)
        } else {
            Ok(ptr)
        }
    }

    /// Key for a live database, adopting it on first sight
    pub(crate) fn db_key(&self, db: *mut ffi::alpm_db_t) -> DbKey {
        let addr = db as usize;
        let mut dbs = self.dbs.borrow_mut();
        let generation = *dbs.entry(addr).or_insert_with(|| {
            let generation = self.next_generation.get() + 1;
            self.next_generation.set(generation);
            generation
        });
        DbKey { addr, generation }
    }

    fn is_live(&self, key: DbKey) -> bool {
        self.dbs.borrow().get(&key.addr) == Some(&key.generation)
    }

    pub(crate) fn forget_db(&self, db: *mut ffi::alpm_db_t) {
        self.dbs.borrow_mut().remove(&(db as usize));
    }

    /// The session's current errno as an error value
    pub(crate) fn last_error(&self) -> Error {
        match self.ptr() {
            Ok(ptr) => {
                let code = unsafe { ffi::alpm_errno(ptr) };
                Error::NativeRejected {
                    code,
                    message: strerror(code),
                }
            }
            Err(err) => err,
        }
    }

    fn release(&self) -> Result<()> {
        let ptr = self.ptr()?;
        let ret = unsafe { ffi::alpm_release(ptr) };
        self.ptr.set(ptr::null_mut());
        self.dbs.borrow_mut().clear();

        // Callback contexts stay registered until the native side is gone
        callbacks::unregister_all(ptr as Token);

        if ret != 0 {
            return Err(Error::NativeRejected {
                code: ret,
                message: "failed to release alpm handle".to_string(),
            });
        }
        Ok(())
    }
}

/// Message for a libalpm error code
pub(crate) fn strerror(code: ffi::alpm_errno_t) -> String {
    let message = unsafe { ffi::to_string(ffi::alpm_strerror(code)) };
    message.unwrap_or_else(|| format!("unknown error {}", code))
}

/// Back-reference from a wrapper to its session and owning databases
#[derive(Clone)]
pub(crate) struct Binding {
    session: Rc<Session>,
    dbs: Rc<[DbKey]>,
}

impl Binding {
    /// Bound to the session only
    pub(crate) fn handle(session: &Rc<Session>) -> Self {
        Self {
            session: Rc::clone(session),
            dbs: Rc::from(Vec::new()),
        }
    }

    pub(crate) fn db(session: &Rc<Session>, key: DbKey) -> Self {
        Self {
            session: Rc::clone(session),
            dbs: Rc::from(vec![key]),
        }
    }

    pub(crate) fn dbs(session: &Rc<Session>, keys: Vec<DbKey>) -> Self {
        Self {
            session: Rc::clone(session),
            dbs: Rc::from(keys),
        }
    }

    pub(crate) fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// Confirm the session and every bound database are still live
    pub(crate) fn check(&self) -> Result<*mut ffi::alpm_handle_t> {
        let handle = self.session.ptr()?;
        if let Some(stale) = self.dbs.iter().find(|key| !self.session.is_live(**key)) {
            return Err(Error::Invalidated(format!(
                "database at {:#x} has been unregistered",
                stale.addr
            )));
        }
        Ok(handle)
    }

    /// Binding for a package record, following its owning database
    ///
    /// Only call after [`Binding::check`] succeeded for the list or
    /// database the package was reached through.
    pub(crate) fn for_package(&self, pkg: *mut ffi::alpm_pkg_t) -> Binding {
        let db = unsafe { ffi::alpm_pkg_get_db(pkg) };
        if db.is_null() {
            Binding::handle(&self.session)
        } else {
            Binding::db(&self.session, self.session.db_key(db))
        }
    }
}

/// A libalpm session rooted at a filesystem root and database directory
pub struct Handle {
    session: Rc<Session>,
}

impl Handle {
    /// Open a session
    ///
    /// # Arguments
    /// * `root` - Installation root, usually `/`
    /// * `dbpath` - Database directory, usually `/var/lib/pacman`
    pub fn initialize(root: impl AsRef<Path>, dbpath: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let dbpath = dbpath.as_ref();
        let c_root = path_cstring(root)?;
        let c_dbpath = path_cstring(dbpath)?;

        let mut code: ffi::alpm_errno_t = ffi::ALPM_ERR_OK;
        let ptr = unsafe { ffi::alpm_initialize(c_root.as_ptr(), c_dbpath.as_ptr(), &mut code) };
        if ptr.is_null() {
            return Err(Error::Initialization {
                code,
                message: strerror(code),
            });
        }

        info!(
            "Initialized alpm session (root: {}, dbpath: {})",
            root.display(),
            dbpath.display()
        );

        Ok(Self {
            session: Rc::new(Session {
                ptr: Cell::new(ptr),
                root: root.to_path_buf(),
                dbpath: dbpath.to_path_buf(),
                dbs: RefCell::new(HashMap::new()),
                next_generation: Cell::new(0),
            }),
        })
    }

    /// Release the native session
    ///
    /// Every object obtained through this handle becomes unusable. A second
    /// call returns [`Error::AlreadyReleased`].
    pub fn release(&self) -> Result<()> {
        self.session.release()?;
        info!("Released alpm session for {}", self.session.root.display());
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.session.ptr.get().is_null()
    }

    pub fn root(&self) -> &Path {
        &self.session.root
    }

    pub fn dbpath(&self) -> &Path {
        &self.session.dbpath
    }

    /// Key under which this session's callback contexts are registered
    pub fn token(&self) -> Result<Token> {
        Ok(self.session.ptr()? as Token)
    }

    /// The most recent native error recorded on this session
    pub fn last_error(&self) -> Error {
        self.session.last_error()
    }

    /// The database of installed packages
    pub fn local_db(&self) -> Result<Db> {
        let handle = self.session.ptr()?;
        let db = unsafe { ffi::alpm_get_localdb(handle) };
        if db.is_null() {
            return Err(self.last_error());
        }
        Ok(Db::from_raw(db, &self.session))
    }

    /// The registered sync databases, in registration order
    pub fn sync_dbs(&self) -> Result<DbList> {
        let handle = self.session.ptr()?;
        let head = unsafe { ffi::alpm_get_syncdbs(handle) };
        Ok(DbList::snapshot(head, &self.session))
    }

    pub fn sync_db_by_name(&self, name: &str) -> Result<Option<Db>> {
        for db in self.sync_dbs()?.iter()? {
            let db = db?;
            if db.name()? == name {
                return Ok(Some(db));
            }
        }
        Ok(None)
    }

    /// Register a sync database under a unique name
    ///
    /// # Arguments
    /// * `name` - Repository name, e.g. `core`
    /// * `siglevel` - Signature requirements for the database and its packages
    ///
    /// # Returns
    /// The new database, or [`Error::DuplicateName`] if the name is taken
    pub fn register_sync_db(&self, name: &str, siglevel: SigLevel) -> Result<Db> {
        let handle = self.session.ptr()?;
        if name == "local" || self.sync_db_by_name(name)?.is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let c_name = CString::new(name)?;
        let db = unsafe { ffi::alpm_register_syncdb(handle, c_name.as_ptr(), siglevel.bits()) };
        if db.is_null() {
            return Err(self.last_error());
        }

        debug!("Registered sync database {}", name);
        Ok(Db::from_raw(db, &self.session))
    }

    /// Unregister every sync database; wrappers for them become invalid
    pub fn unregister_all_sync_dbs(&self) -> Result<()> {
        let handle = self.session.ptr()?;
        let dbs: Vec<*mut ffi::alpm_db_t> = {
            let list = unsafe { RawList::borrowed(ffi::alpm_get_syncdbs(handle)) };
            list.nodes().map(|db| db.cast::<ffi::alpm_db_t>()).collect()
        };

        if unsafe { ffi::alpm_unregister_all_syncdbs(handle) } != 0 {
            return Err(self.last_error());
        }

        for db in &dbs {
            self.session.forget_db(*db);
        }
        debug!("Unregistered {} sync databases", dbs.len());
        Ok(())
    }

    pub(crate) fn as_ptr(&self) -> Result<*mut ffi::alpm_handle_t> {
        self.session.ptr()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.is_released() {
            return;
        }
        debug!("Releasing alpm session for {} on drop", self.session.root.display());
        if let Err(e) = self.session.release() {
            warn!("Failed to release alpm session: {}", e);
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("root", &self.session.root)
            .field("dbpath", &self.session.dbpath)
            .field("released", &self.is_released())
            .finish()
    }
}

fn path_cstring(path: &Path) -> Result<CString> {
    let path = path
        .to_str()
        .ok_or_else(|| Error::InvalidArgument(format!("Path is not valid UTF-8: {}", path.display())))?;
    Ok(CString::new(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, Handle) {
        let temp = TempDir::new().unwrap();
        let dbpath = temp.path().join("db");
        std::fs::create_dir(&dbpath).unwrap();
        let handle = Handle::initialize(temp.path(), &dbpath).unwrap();
        (temp, handle)
    }

    #[test]
    fn test_initialize_missing_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");

        match Handle::initialize(&missing, temp.path()) {
            Err(Error::Initialization { code, .. }) => assert_eq!(code, ffi::ALPM_ERR_NOT_A_DIR),
            other => panic!("expected initialization failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_initialize_locked_dbpath() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("db.lck"), "").unwrap();

        let result = Handle::initialize(temp.path(), temp.path());
        assert!(matches!(result, Err(Error::Initialization { .. })));
    }

    #[test]
    fn test_release_twice() {
        let (_temp, handle) = open();
        handle.release().unwrap();
        assert!(handle.is_released());
        assert!(matches!(handle.release(), Err(Error::AlreadyReleased)));
        assert!(matches!(handle.local_db(), Err(Error::AlreadyReleased)));
    }

    #[test]
    fn test_local_db_requires_dbpath() {
        let temp = TempDir::new().unwrap();
        let handle = Handle::initialize(temp.path(), temp.path().join("missing")).unwrap();

        // Initialization succeeds, the local database does not
        match handle.local_db() {
            Err(Error::NativeRejected { code, .. }) => assert_eq!(code, ffi::ALPM_ERR_DB_NOT_FOUND),
            other => panic!("expected native rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let (_temp, handle) = open();
        handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();

        let names: Vec<String> = handle
            .sync_dbs()
            .unwrap()
            .to_vec()
            .unwrap()
            .iter()
            .map(|db| db.name().unwrap())
            .collect();
        assert_eq!(names, vec!["core", "extra"]);

        assert!(handle.sync_db_by_name("extra").unwrap().is_some());
        assert!(handle.sync_db_by_name("multilib").unwrap().is_none());
    }

    #[test]
    fn test_register_duplicate() {
        let (_temp, handle) = open();
        handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();

        let err = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "core"));
        assert_eq!(handle.sync_dbs().unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_unregister_all_invalidates() {
        let (_temp, handle) = open();
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        handle.unregister_all_sync_dbs().unwrap();

        assert!(matches!(core.name(), Err(Error::Invalidated(_))));
        assert_eq!(handle.sync_dbs().unwrap().len().unwrap(), 0);

        // The name is free again
        let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
        assert_eq!(core.name().unwrap(), "core");
    }

    #[test]
    fn test_drop_releases() {
        let (_temp, handle) = open();
        let token = handle.token().unwrap();
        handle
            .set_log_callback(|_: &(), _, _| {}, ())
            .unwrap();
        assert!(callbacks::LOG_CONTEXTS.contains(token));

        drop(handle);
        assert!(!callbacks::LOG_CONTEXTS.contains(token));
    }
}
