// src/callbacks.rs

//! Log and question callbacks
//!
//! libalpm hands callbacks an opaque context pointer. Rust closures cannot
//! cross that boundary safely, so the context is a [`Token`] (the session
//! address) and the closures live in process-wide [`ContextPool`]s. Fixed
//! `extern "C"` trampolines look the token up, clone the entry out of the
//! pool and invoke it with the lock released, so a callback may itself
//! register or replace callbacks.
//!
//! A panicking callback is caught at the boundary and logged.

use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::ffi;
use crate::handle::Handle;
use crate::list::RawList;
use crate::version::Depend;

/// Key of a callback context: the address of the owning session
pub type Token = usize;

/// Levels libalpm logs at, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Debug,
    Function,
}

impl LogLevel {
    pub(crate) fn from_raw(raw: ffi::alpm_loglevel_t) -> Self {
        match raw {
            ffi::ALPM_LOG_ERROR => LogLevel::Error,
            ffi::ALPM_LOG_WARNING => LogLevel::Warning,
            ffi::ALPM_LOG_DEBUG => LogLevel::Debug,
            _ => LogLevel::Function,
        }
    }

    pub(crate) fn to_raw(self) -> ffi::alpm_loglevel_t {
        match self {
            LogLevel::Error => ffi::ALPM_LOG_ERROR,
            LogLevel::Warning => ffi::ALPM_LOG_WARNING,
            LogLevel::Debug => ffi::ALPM_LOG_DEBUG,
            LogLevel::Function => ffi::ALPM_LOG_FUNCTION,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Debug => "debug",
            LogLevel::Function => "function",
        };
        write!(f, "{}", name)
    }
}

/// Threshold used by [`tracing_log_callback`] when none is configured
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Warning;

/// Token-keyed store of callback entries
pub struct ContextPool<V> {
    entries: Mutex<HashMap<Token, V>>,
}

impl<V: Clone> ContextPool<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Token, V>> {
        // A panic while holding the lock leaves the map itself intact
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `value` under `token`, returning the entry it replaced
    pub fn register(&self, token: Token, value: V) -> Option<V> {
        self.lock().insert(token, value)
    }

    pub fn lookup(&self, token: Token) -> Option<V> {
        self.lock().get(&token).cloned()
    }

    pub fn unregister(&self, token: Token) -> Option<V> {
        self.lock().remove(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.lock().contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<V: Clone> Default for ContextPool<V> {
    fn default() -> Self {
        Self::new()
    }
}

pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;
pub type QuestionCallback = Arc<dyn Fn(&mut Question<'_>) + Send + Sync>;

pub static LOG_CONTEXTS: LazyLock<ContextPool<LogCallback>> = LazyLock::new(ContextPool::new);
pub static QUESTION_CONTEXTS: LazyLock<ContextPool<QuestionCallback>> = LazyLock::new(ContextPool::new);

fn log_entry<F>(f: F) -> LogCallback
where
    F: Fn(LogLevel, &str) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn question_entry<F>(f: F) -> QuestionCallback
where
    F: Fn(&mut Question<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Drop every callback registered for a session
pub(crate) fn unregister_all(token: Token) {
    let log = LOG_CONTEXTS.unregister(token).is_some();
    let question = QUESTION_CONTEXTS.unregister(token).is_some();
    if log || question {
        debug!("Unregistered callbacks for session {:#x}", token);
    }
}

/// Put back the entry a failed registration displaced
fn restore<V: Clone>(pool: &ContextPool<V>, token: Token, previous: Option<V>) {
    match previous {
        Some(value) => {
            pool.register(token, value);
        }
        None => {
            pool.unregister(token);
        }
    }
}

unsafe extern "C" fn log_trampoline(
    ctx: *mut c_void,
    level: ffi::alpm_loglevel_t,
    fmt: *const std::ffi::c_char,
    args: ffi::va_list,
) {
    let Some(callback) = LOG_CONTEXTS.lookup(ctx as Token) else {
        return;
    };
    // SAFETY: fmt/args are the pair libalpm passed in
    let message = unsafe { ffi::render_log_message(fmt, args) };
    let level = LogLevel::from_raw(level);

    if panic::catch_unwind(AssertUnwindSafe(|| callback(level, &message))).is_err() {
        error!("Log callback panicked; message dropped");
    }
}

unsafe extern "C" fn question_trampoline(ctx: *mut c_void, question: *mut ffi::alpm_question_t) {
    if question.is_null() {
        return;
    }
    let Some(callback) = QUESTION_CONTEXTS.lookup(ctx as Token) else {
        return;
    };
    // SAFETY: libalpm keeps the question alive for the duration of the call
    let mut question = Question {
        raw: unsafe { &mut *question },
    };

    if panic::catch_unwind(AssertUnwindSafe(|| callback(&mut question))).is_err() {
        error!("Question callback panicked; leaving the default answer");
    }
}

impl Handle {
    /// Route native log lines to `callback`
    ///
    /// `context` is handed back to every invocation, by reference, so the
    /// caller can recover its own state. Replaces any earlier log callback.
    pub fn set_log_callback<T, F>(&self, callback: F, context: T) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, LogLevel, &str) + Send + Sync + 'static,
    {
        let handle = self.as_ptr()?;
        let token = handle as Token;
        let entry = log_entry(move |level, message| callback(&context, level, message));

        let previous = LOG_CONTEXTS.register(token, entry);
        let ret = unsafe { ffi::alpm_option_set_logcb(handle, Some(log_trampoline), token as *mut c_void) };
        if ret != 0 {
            restore(&*LOG_CONTEXTS, token, previous);
            return Err(self.last_error());
        }
        if previous.is_some() {
            debug!("Replaced log callback for session {:#x}", token);
        }
        Ok(())
    }

    /// Answer native questions with `callback`
    ///
    /// Questions left unanswered keep libalpm's default (no).
    pub fn set_question_callback<T, F>(&self, callback: F, context: T) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &mut Question<'_>) + Send + Sync + 'static,
    {
        let handle = self.as_ptr()?;
        let token = handle as Token;
        let entry = question_entry(move |question| callback(&context, question));

        let previous = QUESTION_CONTEXTS.register(token, entry);
        let ret = unsafe {
            ffi::alpm_option_set_questioncb(handle, Some(question_trampoline), token as *mut c_void)
        };
        if ret != 0 {
            restore(&*QUESTION_CONTEXTS, token, previous);
            return Err(self.last_error());
        }
        Ok(())
    }
}

/// Forward native log lines to `tracing`, dropping those less severe than
/// `threshold`
pub fn tracing_log_callback(threshold: &LogLevel, level: LogLevel, message: &str) {
    if level > *threshold {
        return;
    }
    let message = message.trim_end();
    match level {
        LogLevel::Error => error!(target: "alpm", "{}", message),
        LogLevel::Warning => warn!(target: "alpm", "{}", message),
        LogLevel::Debug => debug!(target: "alpm", "{}", message),
        LogLevel::Function => trace!(target: "alpm", "{}", message),
    }
}

/// What a question asks, decoded from the native record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    /// Install a package listed in IgnorePkg?
    InstallIgnorePkg { package: String },
    /// Replace an installed package with one from a sync database?
    Replace {
        old_package: String,
        new_package: String,
        new_db: String,
    },
    /// Remove one side of a conflict?
    Conflict {
        package1: String,
        package2: String,
        reason: Option<Depend>,
    },
    /// Delete a corrupted package file?
    Corrupted { filepath: String, reason: i32 },
    /// Skip packages with unresolvable dependencies?
    RemovePkgs { packages: Vec<String> },
    /// Which provider satisfies a dependency? Answered by index.
    SelectProvider {
        depend: Option<Depend>,
        providers: Vec<String>,
    },
    /// Import a PGP key?
    ImportKey { uid: String, fingerprint: String },
    Unknown(i32),
}

/// A question put to the front end, answered in place
pub struct Question<'a> {
    raw: &'a mut ffi::alpm_question_t,
}

impl Question<'_> {
    pub fn kind(&self) -> QuestionKind {
        // SAFETY: the type tag selects the active variant; every pointer in
        // it is valid while libalpm waits for the answer
        unsafe {
            match self.raw.type_ {
                ffi::ALPM_QUESTION_INSTALL_IGNOREPKG => QuestionKind::InstallIgnorePkg {
                    package: pkg_name(self.raw.install_ignorepkg.pkg),
                },
                ffi::ALPM_QUESTION_REPLACE_PKG => {
                    let q = self.raw.replace;
                    QuestionKind::Replace {
                        old_package: pkg_name(q.oldpkg),
                        new_package: pkg_name(q.newpkg),
                        new_db: ffi::to_string(ffi::alpm_db_get_name(q.newdb)).unwrap_or_default(),
                    }
                }
                ffi::ALPM_QUESTION_CONFLICT_PKG => {
                    let conflict = self.raw.conflict.conflict;
                    if conflict.is_null() {
                        QuestionKind::Unknown(ffi::ALPM_QUESTION_CONFLICT_PKG)
                    } else {
                        QuestionKind::Conflict {
                            package1: pkg_name((*conflict).package1),
                            package2: pkg_name((*conflict).package2),
                            reason: Depend::from_raw((*conflict).reason),
                        }
                    }
                }
                ffi::ALPM_QUESTION_CORRUPTED_PKG => {
                    let q = self.raw.corrupted;
                    QuestionKind::Corrupted {
                        filepath: ffi::to_string(q.filepath).unwrap_or_default(),
                        reason: q.reason,
                    }
                }
                ffi::ALPM_QUESTION_REMOVE_PKGS => QuestionKind::RemovePkgs {
                    packages: pkg_names(self.raw.remove_pkgs.packages),
                },
                ffi::ALPM_QUESTION_SELECT_PROVIDER => {
                    let q = self.raw.select_provider;
                    QuestionKind::SelectProvider {
                        depend: Depend::from_raw(q.depend),
                        providers: pkg_names(q.providers),
                    }
                }
                ffi::ALPM_QUESTION_IMPORT_KEY => {
                    let q = self.raw.import_key;
                    QuestionKind::ImportKey {
                        uid: ffi::to_string(q.uid).unwrap_or_default(),
                        fingerprint: ffi::to_string(q.fingerprint).unwrap_or_default(),
                    }
                }
                other => QuestionKind::Unknown(other),
            }
        }
    }

    /// The answer currently recorded
    pub fn answer(&self) -> i32 {
        // SAFETY: every variant stores its answer right after the type tag
        unsafe { self.raw.any.answer }
    }

    /// Answer a yes/no question
    pub fn set_answer(&mut self, yes: bool) {
        self.raw.any.answer = c_int::from(yes);
    }

    /// Pick a provider by its position in the provider list
    pub fn set_provider_index(&mut self, index: i32) {
        self.raw.any.answer = index;
    }
}

unsafe fn pkg_name(pkg: *mut ffi::alpm_pkg_t) -> String {
    let name = unsafe { ffi::to_string(ffi::alpm_pkg_get_name(pkg)) };
    name.unwrap_or_default()
}

unsafe fn pkg_names(list: *mut ffi::alpm_list_t) -> Vec<String> {
    let list = unsafe { RawList::borrowed(list) };
    list.nodes()
        .map(|pkg| unsafe { pkg_name(pkg.cast::<ffi::alpm_pkg_t>()) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_register_lookup_unregister() {
        let pool: ContextPool<Arc<String>> = ContextPool::new();
        assert!(pool.is_empty());

        let first = Arc::new("first".to_string());
        assert!(pool.register(7, Arc::clone(&first)).is_none());
        assert!(pool.contains(7));

        let found = pool.lookup(7).unwrap();
        assert!(Arc::ptr_eq(&found, &first));

        // Re-registering replaces and hands back the old entry
        let replaced = pool.register(7, Arc::new("second".to_string())).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(pool.len(), 1);

        assert!(pool.unregister(7).is_some());
        assert!(!pool.contains(7));
        assert!(pool.lookup(7).is_none());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Debug > DEFAULT_LOG_LEVEL);
        assert_eq!(LogLevel::from_raw(ffi::ALPM_LOG_DEBUG), LogLevel::Debug);
        assert_eq!(LogLevel::Function.to_raw(), ffi::ALPM_LOG_FUNCTION);
    }

    #[test]
    fn test_question_answer_fields() {
        let mut raw = ffi::alpm_question_t {
            import_key: ffi::alpm_question_import_key_t {
                type_: ffi::ALPM_QUESTION_IMPORT_KEY,
                import: 0,
                uid: c"Alice <alice@example.org>".as_ptr(),
                fingerprint: c"ABCD1234".as_ptr(),
            },
        };
        let mut question = Question { raw: &mut raw };

        assert_eq!(
            question.kind(),
            QuestionKind::ImportKey {
                uid: "Alice <alice@example.org>".to_string(),
                fingerprint: "ABCD1234".to_string(),
            }
        );
        question.set_answer(true);
        assert_eq!(question.answer(), 1);
        assert_eq!(unsafe { raw.import_key.import }, 1);
    }
}
