// src/types.rs

//! Flag sets and small value types shared by the database and package
//! wrappers

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::ffi;

bitflags! {
    /// Operations a database may be used for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Usage: i32 {
        const SYNC = ffi::ALPM_DB_USAGE_SYNC;
        const SEARCH = ffi::ALPM_DB_USAGE_SEARCH;
        const INSTALL = ffi::ALPM_DB_USAGE_INSTALL;
        const UPGRADE = ffi::ALPM_DB_USAGE_UPGRADE;
        const ALL = ffi::ALPM_DB_USAGE_ALL;
    }
}

impl Default for Usage {
    fn default() -> Self {
        Usage::ALL
    }
}

impl FromStr for Usage {
    type Err = Error;

    /// Parse a pacman.conf style usage list, e.g. `"Sync Search"`
    fn from_str(s: &str) -> Result<Self> {
        let mut usage = Usage::empty();
        for word in s.split(|c: char| c.is_whitespace() || c == ',') {
            usage |= match word {
                "" => continue,
                "Sync" => Usage::SYNC,
                "Search" => Usage::SEARCH,
                "Install" => Usage::INSTALL,
                "Upgrade" => Usage::UPGRADE,
                "All" => Usage::ALL,
                other => {
                    return Err(Error::InvalidArgument(format!("Unknown database usage: {}", other)));
                }
            };
        }
        Ok(usage)
    }
}

bitflags! {
    /// Signature verification requirements for packages and databases
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SigLevel: i32 {
        const PACKAGE = 1;
        const PACKAGE_OPTIONAL = 1 << 1;
        const PACKAGE_MARGINAL_OK = 1 << 2;
        const PACKAGE_UNKNOWN_OK = 1 << 3;
        const DATABASE = 1 << 10;
        const DATABASE_OPTIONAL = 1 << 11;
        const DATABASE_MARGINAL_OK = 1 << 12;
        const DATABASE_UNKNOWN_OK = 1 << 13;
        const USE_DEFAULT = 1 << 30;
    }
}

bitflags! {
    /// How a package's integrity was validated; empty means unknown
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Validation: i32 {
        const NONE = 1;
        const MD5SUM = 1 << 1;
        const SHA256SUM = 1 << 2;
        const SIGNATURE = 1 << 3;
    }
}

/// Why a package is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PkgReason {
    #[default]
    Explicit,
    Depend,
}

impl PkgReason {
    pub(crate) fn from_raw(raw: ffi::alpm_pkgreason_t) -> Self {
        if raw == ffi::ALPM_PKG_REASON_DEPEND {
            PkgReason::Depend
        } else {
            PkgReason::Explicit
        }
    }

    pub(crate) fn to_raw(self) -> ffi::alpm_pkgreason_t {
        match self {
            PkgReason::Explicit => ffi::ALPM_PKG_REASON_EXPLICIT,
            PkgReason::Depend => ffi::ALPM_PKG_REASON_DEPEND,
        }
    }
}

impl fmt::Display for PkgReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkgReason::Explicit => write!(f, "Explicitly installed"),
            PkgReason::Depend => write!(f, "Installed as a dependency for another package"),
        }
    }
}

/// Where a package record was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgFrom {
    File,
    LocalDb,
    SyncDb,
}

impl PkgFrom {
    pub(crate) fn from_raw(raw: ffi::alpm_pkgfrom_t) -> Option<Self> {
        match raw {
            ffi::ALPM_PKG_FROM_FILE => Some(PkgFrom::File),
            ffi::ALPM_PKG_FROM_LOCALDB => Some(PkgFrom::LocalDb),
            ffi::ALPM_PKG_FROM_SYNCDB => Some(PkgFrom::SyncDb),
            _ => None,
        }
    }
}

/// A file owned by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Path relative to the installation root, without a leading slash
    pub name: String,
    pub size: i64,
    pub mode: u32,
}

/// A file tracked for backup with its recorded hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub name: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_from_str() {
        let usage: Usage = "Sync Search".parse().unwrap();
        assert_eq!(usage, Usage::SYNC | Usage::SEARCH);

        let usage: Usage = "All".parse().unwrap();
        assert_eq!(usage, Usage::ALL);
        assert!(usage.contains(Usage::UPGRADE));

        assert!("Sync Bogus".parse::<Usage>().is_err());
    }

    #[test]
    fn test_usage_all_bits() {
        assert_eq!(Usage::ALL.bits(), 15);
        assert_eq!(
            Usage::ALL,
            Usage::SYNC | Usage::SEARCH | Usage::INSTALL | Usage::UPGRADE
        );
    }

    #[test]
    fn test_reason_roundtrip_raw() {
        assert_eq!(PkgReason::from_raw(1), PkgReason::Depend);
        assert_eq!(PkgReason::from_raw(0), PkgReason::Explicit);
        assert_eq!(PkgReason::Depend.to_raw(), 1);
    }
}
