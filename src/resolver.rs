// src/resolver.rs

//! Dependency matching engine
//!
//! Generic over the backend traits, so the same rules apply to native
//! packages and in-memory records. Every search here is first-match in
//! collection order; nothing is ranked.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{Error, Result};
use crate::packages::traits::{Database, DatabaseCollection, PackageCollection, PackageRecord};
use crate::version::{Depend, vercmp};

fn parse(depstring: &str) -> Result<Depend> {
    depstring.parse().map_err(Error::InvalidArgument)
}

/// Does `pkg` satisfy `dep` by name or through one of its provides?
pub fn satisfies<P: PackageRecord>(pkg: &P, dep: &Depend) -> Result<bool> {
    let name = pkg.name()?;
    let version = pkg.version()?;
    if name == dep.name && dep.version_matches(&version) {
        return Ok(true);
    }
    Ok(dep.is_satisfied_by(&name, &version, &pkg.provides()?))
}

/// The first candidate satisfying `depstring`
///
/// An error from the candidate walk ends the search with that error.
pub fn find_satisfier<P, I>(candidates: I, depstring: &str) -> Result<Option<P>>
where
    P: PackageRecord,
    I: IntoIterator<Item = Result<P>>,
{
    let dep = parse(depstring)?;
    for pkg in candidates {
        let pkg = pkg?;
        if satisfies(&pkg, &dep)? {
            debug!("{} satisfied by {}", dep, pkg.name()?);
            return Ok(Some(pkg));
        }
    }
    Ok(None)
}

/// The first package across `dbs` satisfying `depstring`
///
/// A package carrying the dependency's exact name in any database is
/// preferred over a provider found earlier.
pub fn find_dbs_satisfier<L>(dbs: &L, depstring: &str) -> Result<Option<<L::Db as Database>::Pkg>>
where
    L: DatabaseCollection,
{
    let dep = parse(depstring)?;

    for db in dbs.iter()? {
        if let Some(pkg) = db?.pkg(&dep.name)? {
            if dep.version_matches(&pkg.version()?) {
                return Ok(Some(pkg));
            }
        }
    }

    for db in dbs.iter()? {
        let db = db?;
        let cache = db.pkg_cache()?;
        for pkg in cache.iter()? {
            let pkg = pkg?;
            if satisfies(&pkg, &dep)? {
                debug!("{} provided by {} in {}", dep, pkg.name()?, db.name()?);
                return Ok(Some(pkg));
            }
        }
    }
    Ok(None)
}

/// The first same-named package in `dbs` with a strictly newer version
///
/// Databases are scanned in list order whatever their usage flags.
pub fn sync_new_version<P, L>(pkg: &P, dbs: &L) -> Result<Option<<L::Db as Database>::Pkg>>
where
    P: PackageRecord,
    L: DatabaseCollection,
{
    let name = pkg.name()?;
    let version = pkg.version()?;

    for db in dbs.iter()? {
        let db = db?;
        if let Some(candidate) = db.pkg(&name)? {
            let candidate_version = candidate.version()?;
            if vercmp(&candidate_version, &version) == Ordering::Greater {
                debug!(
                    "{} {} -> {} in {}",
                    name,
                    version,
                    candidate_version,
                    db.name()?
                );
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

/// Stable ascending sort by installed size
pub fn sort_by_size<P: PackageRecord>(pkgs: Vec<P>) -> Result<Vec<P>> {
    let mut keyed = pkgs
        .into_iter()
        .map(|pkg| Ok((pkg.isize()?, pkg)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by_key(|(size, _)| *size);
    Ok(keyed.into_iter().map(|(_, pkg)| pkg).collect())
}

/// Names of `candidates` whose (optional) dependencies `target` satisfies
pub fn required_by<P, Q, I>(target: &P, candidates: I, optional: bool) -> Result<Vec<String>>
where
    P: PackageRecord,
    Q: PackageRecord,
    I: IntoIterator<Item = Q>,
{
    let name = target.name()?;
    let version = target.version()?;
    let provides = target.provides()?;

    let mut names: Vec<String> = Vec::new();
    for candidate in candidates {
        let deps = if optional {
            candidate.optional_depends()?
        } else {
            candidate.depends()?
        };
        if deps.iter().any(|dep| dep.is_satisfied_by(&name, &version, &provides)) {
            let candidate_name = candidate.name()?;
            if !names.contains(&candidate_name) {
                names.push(candidate_name);
            }
        }
    }
    Ok(names)
}
