// tests/integration_test.rs

//! Integration tests for pacbind
//!
//! These tests drive sessions end to end against the in-process backend:
//! database registration, package queries, callbacks and invalidation.

#![cfg(not(feature = "libalpm"))]

use std::sync::{Arc, Mutex};

use pacbind::callbacks::{LOG_CONTEXTS, QUESTION_CONTEXTS};
use pacbind::ffi::sim::{self, SimQuestion};
use pacbind::packages::memory::MemPackage;
use pacbind::{
    Database, DatabaseCollection, Error, Handle, LogLevel, PackageCollection, PackageRecord, QuestionKind, SigLevel,
    Usage,
};
use tempfile::TempDir;

fn open() -> (TempDir, Handle) {
    let temp = TempDir::new().unwrap();
    let handle = Handle::initialize(temp.path(), temp.path()).unwrap();
    (temp, handle)
}

fn names<C: PackageCollection>(pkgs: &C) -> Vec<String> {
    pkgs.to_vec().unwrap().iter().map(|p| p.name().unwrap()).collect()
}

#[test]
fn test_sync_db_registration() {
    let (_temp, handle) = open();
    handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    handle.register_sync_db("extra", SigLevel::PACKAGE | SigLevel::DATABASE_OPTIONAL).unwrap();

    let dbs = handle.sync_dbs().unwrap();
    let registered: Vec<String> = dbs.to_vec().unwrap().iter().map(|db| db.name().unwrap()).collect();
    assert_eq!(registered, vec!["core", "extra"]);

    assert!(matches!(
        handle.register_sync_db("extra", SigLevel::USE_DEFAULT),
        Err(Error::DuplicateName(name)) if name == "extra"
    ));
    assert!(matches!(
        handle.register_sync_db("local", SigLevel::USE_DEFAULT),
        Err(Error::DuplicateName(_))
    ));

    // The earlier snapshot is unaffected by later registrations
    handle.register_sync_db("multilib", SigLevel::USE_DEFAULT).unwrap();
    assert_eq!(dbs.len().unwrap(), 2);
    assert_eq!(handle.sync_dbs().unwrap().len().unwrap(), 3);
}

#[test]
fn test_everything_fails_after_release() {
    let (_temp, handle) = open();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    let bash = sim::seed_package(&core, &MemPackage::new("bash", "5.2.037-1")).unwrap();
    let cache = core.pkg_cache().unwrap();
    let dbs = handle.sync_dbs().unwrap();

    handle.release().unwrap();

    assert!(matches!(core.name(), Err(Error::AlreadyReleased)));
    assert!(matches!(bash.name(), Err(Error::AlreadyReleased)));
    assert!(matches!(cache.iter(), Err(Error::AlreadyReleased)));
    assert!(matches!(dbs.len(), Err(Error::AlreadyReleased)));
    assert!(matches!(handle.sync_dbs(), Err(Error::AlreadyReleased)));
    assert!(matches!(handle.release(), Err(Error::AlreadyReleased)));
}

#[test]
fn test_log_callback_receives_context() {
    let (_temp, handle) = open();
    let token = handle.token().unwrap();
    let seen: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::new(Mutex::new(Vec::new()));

    let expected = Arc::clone(&seen);
    handle
        .set_log_callback(
            move |ctx: &Arc<Mutex<Vec<(LogLevel, String)>>>, level, message| {
                assert!(Arc::ptr_eq(ctx, &expected));
                ctx.lock().unwrap().push((level, message.to_string()));
            },
            Arc::clone(&seen),
        )
        .unwrap();

    sim::emit_log(&handle, LogLevel::Warning, "database file for 'core' does not exist").unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(LogLevel::Warning, "database file for 'core' does not exist".to_string())]
    );

    // Context, closure and its captured Arc are dropped with the session
    assert!(LOG_CONTEXTS.contains(token));
    handle.release().unwrap();
    assert!(!LOG_CONTEXTS.contains(token));
    assert_eq!(Arc::strong_count(&seen), 1);
}

#[test]
fn test_log_callback_replacement() {
    let (_temp, handle) = open();
    let count = Arc::new(Mutex::new((0, 0)));

    handle
        .set_log_callback(|ctx: &Arc<Mutex<(i32, i32)>>, _, _| ctx.lock().unwrap().0 += 1, Arc::clone(&count))
        .unwrap();
    sim::emit_log(&handle, LogLevel::Debug, "first").unwrap();

    handle
        .set_log_callback(|ctx: &Arc<Mutex<(i32, i32)>>, _, _| ctx.lock().unwrap().1 += 1, Arc::clone(&count))
        .unwrap();
    sim::emit_log(&handle, LogLevel::Debug, "second").unwrap();

    assert_eq!(*count.lock().unwrap(), (1, 1));
}

#[test]
fn test_failed_callback_install_keeps_previous() {
    let (_temp, handle) = open();
    let count = Arc::new(Mutex::new((0, 0)));

    handle
        .set_log_callback(|ctx: &Arc<Mutex<(i32, i32)>>, _, _| ctx.lock().unwrap().0 += 1, Arc::clone(&count))
        .unwrap();

    sim::fail_next_option(&handle).unwrap();
    let result = handle.set_log_callback(
        |ctx: &Arc<Mutex<(i32, i32)>>, _, _| ctx.lock().unwrap().1 += 1,
        Arc::clone(&count),
    );
    assert!(matches!(result, Err(Error::NativeRejected { .. })));

    sim::emit_log(&handle, LogLevel::Warning, "still routed").unwrap();
    assert_eq!(*count.lock().unwrap(), (1, 0));

    // A failed first install leaves nothing behind
    let token = handle.token().unwrap();
    sim::fail_next_option(&handle).unwrap();
    assert!(handle.set_question_callback(|_: &(), _| {}, ()).is_err());
    assert!(!QUESTION_CONTEXTS.contains(token));
}

#[test]
fn test_panicking_callback_is_contained() {
    let (_temp, handle) = open();
    handle
        .set_log_callback(|_: &(), _, _| panic!("callback failure"), ())
        .unwrap();

    // The panic must not cross the native boundary
    sim::emit_log(&handle, LogLevel::Error, "boom").unwrap();
    assert!(!handle.is_released());
}

#[test]
fn test_sessions_keep_separate_callbacks() {
    let (_temp_a, first) = open();
    let (_temp_b, second) = open();
    let log = Arc::new(Mutex::new(Vec::new()));

    first
        .set_log_callback(|ctx: &Arc<Mutex<Vec<&str>>>, _, _| ctx.lock().unwrap().push("first"), Arc::clone(&log))
        .unwrap();
    second
        .set_log_callback(|ctx: &Arc<Mutex<Vec<&str>>>, _, _| ctx.lock().unwrap().push("second"), Arc::clone(&log))
        .unwrap();

    sim::emit_log(&second, LogLevel::Warning, "x").unwrap();
    sim::emit_log(&first, LogLevel::Warning, "y").unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
}

#[test]
fn test_question_answers() {
    let (_temp, handle) = open();
    let token = handle.token().unwrap();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    let linux = sim::seed_package(&core, &MemPackage::new("linux", "6.10.1-1")).unwrap();
    let jdk17 = sim::seed_package(&core, &MemPackage::new("jdk17-openjdk", "17.0.12").with_provides(&["java-runtime=17"]))
        .unwrap();
    let jdk21 = sim::seed_package(&core, &MemPackage::new("jdk21-openjdk", "21.0.4").with_provides(&["java-runtime=21"]))
        .unwrap();

    let asked = Arc::new(Mutex::new(Vec::new()));
    handle
        .set_question_callback(
            |ctx: &Arc<Mutex<Vec<QuestionKind>>>, question| {
                let kind = question.kind();
                match &kind {
                    QuestionKind::InstallIgnorePkg { .. } => question.set_answer(true),
                    QuestionKind::SelectProvider { providers, .. } => {
                        let index = providers.iter().position(|p| p == "jdk21-openjdk").unwrap_or(0);
                        question.set_provider_index(index as i32);
                    }
                    _ => {}
                }
                ctx.lock().unwrap().push(kind);
            },
            Arc::clone(&asked),
        )
        .unwrap();

    let answer = sim::ask_question(&handle, SimQuestion::InstallIgnorePkg { pkg: &linux }).unwrap();
    assert_eq!(answer, 1);

    let providers = [jdk17.clone(), jdk21.clone()];
    let answer = sim::ask_question(
        &handle,
        SimQuestion::SelectProvider {
            depend: "java-runtime>=17",
            providers: &providers,
        },
    )
    .unwrap();
    assert_eq!(answer, 1);

    // Unanswered questions keep the default
    let answer = sim::ask_question(
        &handle,
        SimQuestion::ImportKey {
            uid: "Arch Linux Master Key",
            fingerprint: "4AA4767BBC9C4B1D18AE28B77F2D434B9741E8AC",
        },
    )
    .unwrap();
    assert_eq!(answer, 0);

    let asked = asked.lock().unwrap();
    assert_eq!(asked[0], QuestionKind::InstallIgnorePkg { package: "linux".to_string() });
    match &asked[1] {
        QuestionKind::SelectProvider { depend, providers } => {
            assert_eq!(depend.as_ref().unwrap().to_string(), "java-runtime>=17");
            assert_eq!(providers, &vec!["jdk17-openjdk".to_string(), "jdk21-openjdk".to_string()]);
        }
        other => panic!("unexpected question {:?}", other),
    }
    assert!(matches!(&asked[2], QuestionKind::ImportKey { uid, .. } if uid == "Arch Linux Master Key"));
    drop(asked);

    handle.release().unwrap();
    assert!(!QUESTION_CONTEXTS.contains(token));
}

#[test]
fn test_conflict_and_replace_questions() {
    let (_temp, handle) = open();
    let local = handle.local_db().unwrap();
    let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
    let old = sim::seed_package(&local, &MemPackage::new("pulseaudio", "17.0")).unwrap();
    let new = sim::seed_package(&extra, &MemPackage::new("pipewire-pulse", "1.2.3")).unwrap();

    let asked = Arc::new(Mutex::new(Vec::new()));
    handle
        .set_question_callback(
            |ctx: &Arc<Mutex<Vec<QuestionKind>>>, question| {
                question.set_answer(true);
                ctx.lock().unwrap().push(question.kind());
            },
            Arc::clone(&asked),
        )
        .unwrap();

    let answer = sim::ask_question(&handle, SimQuestion::Replace { old: &old, new: &new }).unwrap();
    assert_eq!(answer, 1);
    sim::ask_question(
        &handle,
        SimQuestion::Conflict {
            first: &new,
            second: &old,
            reason: "pulseaudio",
        },
    )
    .unwrap();

    let asked = asked.lock().unwrap();
    assert_eq!(
        asked[0],
        QuestionKind::Replace {
            old_package: "pulseaudio".to_string(),
            new_package: "pipewire-pulse".to_string(),
            new_db: "extra".to_string(),
        }
    );
    match &asked[1] {
        QuestionKind::Conflict { package1, package2, reason } => {
            assert_eq!(package1, "pipewire-pulse");
            assert_eq!(package2, "pulseaudio");
            assert_eq!(reason.as_ref().unwrap().name, "pulseaudio");
        }
        other => panic!("unexpected question {:?}", other),
    }
}

#[test]
fn test_search_error_versus_no_match() {
    let (_temp, handle) = open();
    let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
    sim::seed_package(&extra, &MemPackage::new("ripgrep", "14.1.0-1").with_description("A search tool")).unwrap();

    assert_eq!(names(&extra.search(&["search"]).unwrap()), vec!["ripgrep"]);
    assert!(extra.search(&["nothing-matches"]).unwrap().is_empty());

    sim::fail_next_search(&extra).unwrap();
    match extra.search(&["search"]) {
        Err(Error::NativeRejected { code, .. }) => assert_eq!(code, pacbind::ffi::ALPM_ERR_DB_INVALID),
        other => panic!("expected a native failure, got {:?}", other.map(|l| l.len())),
    }

    extra.set_usage(Usage::SYNC).unwrap();
    assert!(extra.search(&["search"]).unwrap().is_empty());
}

#[test]
fn test_group_lookup_across_dbs() {
    let (_temp, handle) = open();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
    sim::seed_package(&core, &MemPackage::new("xorg-server", "21.1").with_groups(&["xorg"])).unwrap();
    sim::seed_package(&extra, &MemPackage::new("xorg-xinit", "1.4").with_groups(&["xorg", "xorg-apps"])).unwrap();

    let dbs = handle.sync_dbs().unwrap();
    assert_eq!(names(&dbs.find_group_pkgs("xorg").unwrap()), vec!["xorg-server", "xorg-xinit"]);
    assert_eq!(names(&dbs.find_group_pkgs("xorg-apps").unwrap()), vec!["xorg-xinit"]);
}

#[test]
fn test_upgrade_scan() {
    let (_temp, handle) = open();
    let local = handle.local_db().unwrap();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();

    sim::seed_package(&local, &MemPackage::new("bash", "5.2.026-2")).unwrap();
    sim::seed_package(&local, &MemPackage::new("vim", "9.1.0-1")).unwrap();
    sim::seed_package(&local, &MemPackage::new("foreign", "1.0")).unwrap();
    sim::seed_package(&core, &MemPackage::new("bash", "5.2.037-1").with_size(2_000_000)).unwrap();
    sim::seed_package(&extra, &MemPackage::new("vim", "9.1.0-1")).unwrap();

    let dbs = handle.sync_dbs().unwrap();
    let mut upgrades = Vec::new();
    for pkg in local.pkg_cache().unwrap().iter().unwrap() {
        let pkg = pkg.unwrap();
        if let Some(newer) = pkg.sync_new_version(&dbs).unwrap() {
            upgrades.push((pkg.name().unwrap(), newer.version().unwrap(), newer.db_name().unwrap()));
        }
    }
    assert_eq!(
        upgrades,
        vec![("bash".to_string(), "5.2.037-1".to_string(), Some("core".to_string()))]
    );
}

#[test]
fn test_upgrade_found_past_same_version() {
    let (_temp, handle) = open();
    let local = handle.local_db().unwrap();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();

    let installed = sim::seed_package(&local, &MemPackage::new("pkg", "1.0")).unwrap();
    sim::seed_package(&core, &MemPackage::new("pkg", "1.0")).unwrap();
    sim::seed_package(&extra, &MemPackage::new("pkg", "1.5")).unwrap();

    // Usage flags do not hide a database from the scan
    extra.set_usage(Usage::SYNC | Usage::SEARCH).unwrap();

    let newer = installed.sync_new_version(&handle.sync_dbs().unwrap()).unwrap().unwrap();
    assert_eq!(newer.version().unwrap(), "1.5");
    assert_eq!(newer.db_name().unwrap().as_deref(), Some("extra"));
}

#[test]
fn test_walk_fails_when_db_unregistered() {
    let (_temp, handle) = open();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    for name in ["a", "b", "c"] {
        sim::seed_package(&core, &MemPackage::new(name, "1")).unwrap();
    }

    let cache = core.pkg_cache().unwrap();
    let mut seen = Vec::new();
    let mut failure = None;
    for pkg in cache.iter().unwrap() {
        match pkg {
            Ok(pkg) => {
                seen.push(pkg.name().unwrap());
                core.unregister().unwrap();
            }
            Err(e) => failure = Some(e),
        }
    }
    assert_eq!(seen, vec!["a"]);
    assert!(matches!(failure, Some(Error::Invalidated(_))));
    assert!(matches!(cache.to_vec(), Err(Error::Invalidated(_))));
}

#[test]
fn test_reverse_dependencies() {
    let (_temp, handle) = open();
    let local = handle.local_db().unwrap();
    let glibc = sim::seed_package(&local, &MemPackage::new("glibc", "2.40").with_provides(&["libc.so=6-64"]))
        .unwrap();
    sim::seed_package(&local, &MemPackage::new("bash", "5.2").with_depends(&["glibc>=2.38"])).unwrap();
    sim::seed_package(&local, &MemPackage::new("coreutils", "9.5").with_depends(&["glibc", "acl"])).unwrap();
    sim::seed_package(&local, &MemPackage::new("old-tool", "1.0").with_depends(&["glibc<2.30"])).unwrap();
    sim::seed_package(&local, &MemPackage::new("python", "3.12").with_optional_depends(&["glibc: locales"]))
        .unwrap();

    let mut required = glibc.compute_required_by().unwrap();
    required.sort();
    assert_eq!(required, vec!["bash", "coreutils"]);
    assert_eq!(glibc.compute_optional_for().unwrap(), vec!["python"]);
}

#[test]
fn test_package_outlives_unregistered_db() {
    let (_temp, handle) = open();
    let core = handle.register_sync_db("core", SigLevel::USE_DEFAULT).unwrap();
    let extra = handle.register_sync_db("extra", SigLevel::USE_DEFAULT).unwrap();
    let bash = sim::seed_package(&core, &MemPackage::new("bash", "5.2")).unwrap();
    let vim = sim::seed_package(&extra, &MemPackage::new("vim", "9.1")).unwrap();

    core.unregister().unwrap();
    assert!(matches!(bash.version(), Err(Error::Invalidated(_))));
    assert!(matches!(core.pkg("bash"), Err(Error::Invalidated(_))));

    // Objects of other databases are unaffected
    assert_eq!(vim.version().unwrap(), "9.1");
    assert_eq!(extra.pkg_cache().unwrap().len().unwrap(), 1);
}
