// src/packages/memory.rs

//! In-memory package and database records
//!
//! Plain Rust implementations of the backend traits. They behave like the
//! native wrappers (name lookup, search gating on [`Usage::SEARCH`],
//! invalidation after `unregister`) without a native session, which makes
//! them suitable for exercising the resolver or front-end code directly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::ffi;
use crate::resolver;
use crate::types::{Backup, File, PkgReason, Usage, Validation};
use crate::version::Depend;

use super::traits::{Database, DatabaseCollection, PackageCollection, PackageRecord};

/// A package record held entirely in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemPackage {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub architecture: Option<String>,
    pub url: Option<String>,
    pub packager: Option<String>,
    pub base: Option<String>,
    pub filename: Option<String>,
    pub md5sum: Option<String>,
    pub sha256sum: Option<String>,
    pub base64_signature: Option<String>,
    pub size: i64,
    pub isize: i64,
    pub build_date: Option<DateTime<Utc>>,
    pub install_date: Option<DateTime<Utc>>,
    pub reason: PkgReason,
    pub validation: Validation,
    pub depends: Vec<Depend>,
    pub optional_depends: Vec<Depend>,
    pub make_depends: Vec<Depend>,
    pub check_depends: Vec<Depend>,
    pub provides: Vec<Depend>,
    pub conflicts: Vec<Depend>,
    pub replaces: Vec<Depend>,
    pub groups: Vec<String>,
    pub licenses: Vec<String>,
    pub files: Vec<File>,
    pub backup: Vec<Backup>,
    /// Owning database, set by [`MemDb::add_package`]
    pub db: Option<String>,
}

fn parse_specs(specs: &[&str]) -> Vec<Depend> {
    specs
        .iter()
        .map(|spec| spec.parse().unwrap_or_else(|_| Depend::new(*spec)))
        .collect()
}

impl MemPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_isize(mut self, isize: i64) -> Self {
        self.isize = isize;
        self
    }

    pub fn with_reason(mut self, reason: PkgReason) -> Self {
        self.reason = reason;
        self
    }

    /// Add dependency specifiers such as `"glibc>=2.38"`
    pub fn with_depends(mut self, specs: &[&str]) -> Self {
        self.depends.extend(parse_specs(specs));
        self
    }

    pub fn with_optional_depends(mut self, specs: &[&str]) -> Self {
        self.optional_depends.extend(parse_specs(specs));
        self
    }

    /// Add provided capabilities such as `"sh=5.2"`
    pub fn with_provides(mut self, specs: &[&str]) -> Self {
        self.provides.extend(parse_specs(specs));
        self
    }

    pub fn with_conflicts(mut self, specs: &[&str]) -> Self {
        self.conflicts.extend(parse_specs(specs));
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups.extend(groups.iter().map(|g| g.to_string()));
        self
    }

    pub fn with_licenses(mut self, licenses: &[&str]) -> Self {
        self.licenses.extend(licenses.iter().map(|l| l.to_string()));
        self
    }

    /// Add regular files (mode 0644, size 0) by relative path
    pub fn with_files(mut self, paths: &[&str]) -> Self {
        self.files.extend(paths.iter().map(|path| File {
            name: path.to_string(),
            size: 0,
            mode: 0o100644,
        }));
        self
    }
}

impl PackageRecord for MemPackage {
    fn name(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    fn description(&self) -> Result<Option<String>> {
        Ok(self.description.clone())
    }

    fn architecture(&self) -> Result<Option<String>> {
        Ok(self.architecture.clone())
    }

    fn url(&self) -> Result<Option<String>> {
        Ok(self.url.clone())
    }

    fn packager(&self) -> Result<Option<String>> {
        Ok(self.packager.clone())
    }

    fn md5sum(&self) -> Result<Option<String>> {
        Ok(self.md5sum.clone())
    }

    fn sha256sum(&self) -> Result<Option<String>> {
        Ok(self.sha256sum.clone())
    }

    fn size(&self) -> Result<i64> {
        Ok(self.size)
    }

    fn isize(&self) -> Result<i64> {
        Ok(self.isize)
    }

    fn build_date(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.build_date)
    }

    fn install_date(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.install_date)
    }

    fn reason(&self) -> Result<PkgReason> {
        Ok(self.reason)
    }

    fn depends(&self) -> Result<Vec<Depend>> {
        Ok(self.depends.clone())
    }

    fn optional_depends(&self) -> Result<Vec<Depend>> {
        Ok(self.optional_depends.clone())
    }

    fn make_depends(&self) -> Result<Vec<Depend>> {
        Ok(self.make_depends.clone())
    }

    fn check_depends(&self) -> Result<Vec<Depend>> {
        Ok(self.check_depends.clone())
    }

    fn provides(&self) -> Result<Vec<Depend>> {
        Ok(self.provides.clone())
    }

    fn conflicts(&self) -> Result<Vec<Depend>> {
        Ok(self.conflicts.clone())
    }

    fn replaces(&self) -> Result<Vec<Depend>> {
        Ok(self.replaces.clone())
    }

    fn groups(&self) -> Result<Vec<String>> {
        Ok(self.groups.clone())
    }

    fn licenses(&self) -> Result<Vec<String>> {
        Ok(self.licenses.clone())
    }

    fn files(&self) -> Result<Vec<File>> {
        Ok(self.files.clone())
    }

    fn db_name(&self) -> Result<Option<String>> {
        Ok(self.db.clone())
    }
}

/// An ordered list of in-memory packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemPackageList {
    packages: Vec<MemPackage>,
}

impl MemPackageList {
    pub fn packages(&self) -> &[MemPackage] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl From<Vec<MemPackage>> for MemPackageList {
    fn from(packages: Vec<MemPackage>) -> Self {
        Self { packages }
    }
}

impl FromIterator<MemPackage> for MemPackageList {
    fn from_iter<I: IntoIterator<Item = MemPackage>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().collect(),
        }
    }
}

impl PackageCollection for MemPackageList {
    type Pkg = MemPackage;

    fn iter(&self) -> Result<impl Iterator<Item = Result<MemPackage>> + '_> {
        Ok(self.packages.iter().cloned().map(Ok))
    }

    fn sort_by_size(&self) -> Result<Self> {
        Ok(Self {
            packages: resolver::sort_by_size(self.packages.clone())?,
        })
    }
}

#[derive(Debug)]
struct MemDbState {
    name: String,
    servers: RefCell<Vec<String>>,
    usage: Cell<Usage>,
    packages: RefCell<Vec<MemPackage>>,
    registered: Cell<bool>,
}

/// An in-memory database; clones share state
#[derive(Debug, Clone)]
pub struct MemDb {
    state: Rc<MemDbState>,
}

impl MemDb {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Rc::new(MemDbState {
                name: name.into(),
                servers: RefCell::new(Vec::new()),
                usage: Cell::new(Usage::ALL),
                packages: RefCell::new(Vec::new()),
                registered: Cell::new(true),
            }),
        }
    }

    /// Add a package, tagging it with this database's name
    pub fn add_package(&self, mut pkg: MemPackage) {
        pkg.db = Some(self.state.name.clone());
        self.state.packages.borrow_mut().push(pkg);
    }

    /// Names of packages here that depend on `pkg`
    pub fn required_by(&self, pkg: &MemPackage) -> Result<Vec<String>> {
        self.check()?;
        resolver::required_by(pkg, self.state.packages.borrow().iter().cloned(), false)
    }

    /// Names of packages here that optionally depend on `pkg`
    pub fn optional_for(&self, pkg: &MemPackage) -> Result<Vec<String>> {
        self.check()?;
        resolver::required_by(pkg, self.state.packages.borrow().iter().cloned(), true)
    }

    fn check(&self) -> Result<()> {
        if self.state.registered.get() {
            Ok(())
        } else {
            Err(Error::Invalidated(format!(
                "database {} has been unregistered",
                self.state.name
            )))
        }
    }
}

impl Database for MemDb {
    type Pkg = MemPackage;
    type Pkgs = MemPackageList;

    fn name(&self) -> Result<String> {
        self.check()?;
        Ok(self.state.name.clone())
    }

    fn servers(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.state.servers.borrow().clone())
    }

    fn set_servers(&self, servers: &[String]) -> Result<()> {
        self.check()?;
        self.state.servers.borrow_mut().clear();
        for server in servers {
            self.add_server(server)?;
        }
        Ok(())
    }

    fn add_server(&self, server: &str) -> Result<()> {
        self.check()?;
        if server.is_empty() {
            return Err(Error::NativeRejected {
                code: ffi::ALPM_ERR_SERVER_BAD_URL,
                message: "invalid url for server".to_string(),
            });
        }
        self.state
            .servers
            .borrow_mut()
            .push(server.trim_end_matches('/').to_string());
        Ok(())
    }

    fn usage(&self) -> Result<Usage> {
        self.check()?;
        Ok(self.state.usage.get())
    }

    fn set_usage(&self, usage: Usage) -> Result<()> {
        self.check()?;
        self.state.usage.set(usage);
        Ok(())
    }

    fn pkg(&self, name: &str) -> Result<Option<MemPackage>> {
        self.check()?;
        Ok(self
            .state
            .packages
            .borrow()
            .iter()
            .find(|pkg| pkg.name == name)
            .cloned())
    }

    fn pkg_cache(&self) -> Result<MemPackageList> {
        self.check()?;
        Ok(self.state.packages.borrow().clone().into())
    }

    fn search(&self, terms: &[&str]) -> Result<MemPackageList> {
        self.check()?;
        if terms.is_empty() || !self.state.usage.get().contains(Usage::SEARCH) {
            return Ok(MemPackageList::default());
        }

        let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        let packages = self.state.packages.borrow();
        Ok(packages
            .iter()
            .filter(|pkg| {
                let mut haystacks = vec![pkg.name.to_lowercase()];
                haystacks.extend(pkg.description.as_ref().map(|d| d.to_lowercase()));
                haystacks.extend(pkg.provides.iter().map(|p| p.name.to_lowercase()));
                terms
                    .iter()
                    .all(|term| haystacks.iter().any(|hay| hay.contains(term.as_str())))
            })
            .cloned()
            .collect())
    }

    fn unregister(&self) -> Result<()> {
        self.check()?;
        self.state.registered.set(false);
        Ok(())
    }
}

/// An ordered list of in-memory databases
#[derive(Debug, Clone, Default)]
pub struct MemDbList {
    dbs: Vec<MemDb>,
}

impl MemDbList {
    pub fn new(dbs: Vec<MemDb>) -> Self {
        Self { dbs }
    }

    pub fn push(&mut self, db: MemDb) {
        self.dbs.push(db);
    }
}

impl DatabaseCollection for MemDbList {
    type Db = MemDb;

    fn iter(&self) -> Result<impl Iterator<Item = Result<MemDb>> + '_> {
        Ok(self.dbs.iter().cloned().map(Ok))
    }

    fn find_group_pkgs(&self, group: &str) -> Result<MemPackageList> {
        let mut found: Vec<MemPackage> = Vec::new();
        for db in &self.dbs {
            db.check()?;
            for pkg in db.state.packages.borrow().iter() {
                let in_group = pkg.groups.iter().any(|g| g == group);
                if in_group && !found.iter().any(|f| f.name == pkg.name) {
                    found.push(pkg.clone());
                }
            }
        }
        Ok(found.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkg_lookup_absent_is_none() {
        let db = MemDb::new("core");
        db.add_package(MemPackage::new("bash", "5.2.037-1"));

        assert!(db.pkg("bash").unwrap().is_some());
        assert!(db.pkg("zsh").unwrap().is_none());
        assert_eq!(db.pkg("bash").unwrap().unwrap().db.as_deref(), Some("core"));
    }

    #[test]
    fn test_search_terms_and_usage() {
        let db = MemDb::new("extra");
        db.add_package(MemPackage::new("vim", "9.1").with_description("Vi Improved, a text editor"));
        db.add_package(MemPackage::new("nano", "8.0").with_description("Pico editor clone"));

        assert_eq!(db.search(&["editor"]).unwrap().len(), 2);
        assert_eq!(db.search(&["EDITOR", "vi"]).unwrap().len(), 1);
        assert!(db.search(&["emacs"]).unwrap().is_empty());
        assert!(db.search(&[]).unwrap().is_empty());

        db.set_usage(Usage::SYNC).unwrap();
        assert!(db.search(&["editor"]).unwrap().is_empty());
    }

    #[test]
    fn test_set_servers_partial_failure() {
        let db = MemDb::new("core");
        db.add_server("https://old.example.org").unwrap();

        let servers = vec![
            "https://a.example.org/".to_string(),
            String::new(),
            "https://c.example.org".to_string(),
        ];
        assert!(db.set_servers(&servers).is_err());

        // Cleared, then filled up to the failing entry
        assert_eq!(db.servers().unwrap(), vec!["https://a.example.org"]);
    }

    #[test]
    fn test_unregister_invalidates() {
        let db = MemDb::new("core");
        db.unregister().unwrap();
        assert!(matches!(db.name(), Err(Error::Invalidated(_))));
        assert!(matches!(db.pkg("bash"), Err(Error::Invalidated(_))));
    }

    #[test]
    fn test_group_pkgs_in_db_order() {
        let core = MemDb::new("core");
        core.add_package(MemPackage::new("gcc", "14.1").with_groups(&["base-devel"]));
        core.add_package(MemPackage::new("make", "4.4").with_groups(&["base-devel"]));
        let extra = MemDb::new("extra");
        extra.add_package(MemPackage::new("autoconf", "2.72").with_groups(&["base-devel"]));
        extra.add_package(MemPackage::new("gcc", "14.2").with_groups(&["base-devel"]));

        let dbs = MemDbList::new(vec![core, extra]);
        let names: Vec<String> = dbs
            .find_group_pkgs("base-devel")
            .unwrap()
            .packages()
            .iter()
            .map(|p| format!("{}-{}", p.name, p.version))
            .collect();
        assert_eq!(names, vec!["gcc-14.1", "make-4.4", "autoconf-2.72"]);
    }

    #[test]
    fn test_required_by() {
        let local = MemDb::new("local");
        let bash = MemPackage::new("bash", "5.2.037-1").with_provides(&["sh=5.2"]);
        local.add_package(bash.clone());
        local.add_package(MemPackage::new("base", "3-2").with_depends(&["bash", "glibc"]));
        local.add_package(MemPackage::new("autoconf", "2.72").with_depends(&["sh>=5"]));
        local.add_package(MemPackage::new("git", "2.46").with_optional_depends(&["bash: completion"]));

        assert_eq!(local.required_by(&bash).unwrap(), vec!["base", "autoconf"]);
        assert_eq!(local.optional_for(&bash).unwrap(), vec!["git"]);
    }
}
