// src/version.rs

//! Version comparison and dependency specifiers
//!
//! Versions follow the pacman `[epoch:]version[-release]` layout. Segments
//! are compared the rpm way: numeric runs numerically, alphabetic runs
//! lexically, and a `~` sorts before everything including the end of the
//! string, so `1.0~rc1 < 1.0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::ffi;

/// Compare two full version strings
///
/// Epochs are compared first, then versions, then releases when both sides
/// carry one (`1.5` and `1.5-1` compare equal).
///
/// This is a pure Rust implementation and is used even when linking the
/// system libalpm. It deliberately differs from `alpm_pkg_vercmp` on `~`:
/// libalpm treats it as a plain separator, so `1.0~rc1` and `1.0` can order
/// differently there.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch1, ver1, rel1) = parse_evr(a);
    let (epoch2, ver2, rel2) = parse_evr(b);

    rpmvercmp(epoch1, epoch2)
        .then_with(|| rpmvercmp(ver1, ver2))
        .then_with(|| match (rel1, rel2) {
            (Some(r1), Some(r2)) => rpmvercmp(r1, r2),
            _ => Ordering::Equal,
        })
}

/// Split `[epoch:]version[-release]`; a missing or empty epoch is "0"
fn parse_evr(evr: &str) -> (&str, &str, Option<&str>) {
    let digits = evr.bytes().take_while(u8::is_ascii_digit).count();

    let (epoch, rest) = if evr.as_bytes().get(digits) == Some(&b':') {
        let epoch = &evr[..digits];
        (if epoch.is_empty() { "0" } else { epoch }, &evr[digits + 1..])
    } else {
        ("0", evr)
    };

    match rest.rfind('-') {
        Some(pos) => (epoch, &rest[..pos], Some(&rest[pos + 1..])),
        None => (epoch, rest, None),
    }
}

/// Segment-wise comparison of a single version component
fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    loop {
        let tilde1 = one.get(i) == Some(&b'~');
        let tilde2 = two.get(j) == Some(&b'~');
        if tilde1 || tilde2 {
            if !tilde1 {
                return Ordering::Greater;
            }
            if !tilde2 {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let (sep1, sep2) = (i, j);
        while i < one.len() && is_separator(one[i]) {
            i += 1;
        }
        while j < two.len() && is_separator(two[j]) {
            j += 1;
        }

        if one.get(i) == Some(&b'~') || two.get(j) == Some(&b'~') {
            continue;
        }
        if i >= one.len() || j >= two.len() {
            break;
        }

        // Different separator lengths decide on their own
        if i - sep1 != j - sep2 {
            return (i - sep1).cmp(&(j - sep2));
        }

        let (start1, start2) = (i, j);
        let numeric = one[i].is_ascii_digit();
        if numeric {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        // Segment types differ: a numeric segment beats an alphabetic one
        if start2 == j {
            return if numeric { Ordering::Greater } else { Ordering::Less };
        }

        let mut seg1 = &one[start1..i];
        let mut seg2 = &two[start2..j];
        if numeric {
            seg1 = trim_leading_zeros(seg1);
            seg2 = trim_leading_zeros(seg2);
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        match seg1.cmp(seg2) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    let rest1 = &one[i.min(one.len())..];
    let rest2 = &two[j.min(two.len())..];

    if rest1.is_empty() && rest2.is_empty() {
        return Ordering::Equal;
    }

    // A remaining alpha run never beats an empty string
    let rest2_alpha = rest2.first().is_some_and(u8::is_ascii_alphabetic);
    let rest1_alpha = rest1.first().is_some_and(u8::is_ascii_alphabetic);
    if (rest1.is_empty() && !rest2_alpha) || rest1_alpha {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn is_separator(c: u8) -> bool {
    !c.is_ascii_alphanumeric() && c != b'~'
}

fn trim_leading_zeros(segment: &[u8]) -> &[u8] {
    let zeros = segment.iter().take_while(|&&c| c == b'0').count();
    &segment[zeros..]
}

/// Comparison operator of a dependency specifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepMod {
    /// No version constraint
    #[default]
    Any,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

impl DepMod {
    pub fn as_str(&self) -> &str {
        match self {
            DepMod::Any => "",
            DepMod::Eq => "=",
            DepMod::Ge => ">=",
            DepMod::Le => "<=",
            DepMod::Gt => ">",
            DepMod::Lt => "<",
        }
    }

    pub(crate) fn from_raw(raw: ffi::alpm_depmod_t) -> Self {
        match raw {
            ffi::ALPM_DEP_MOD_EQ => DepMod::Eq,
            ffi::ALPM_DEP_MOD_GE => DepMod::Ge,
            ffi::ALPM_DEP_MOD_LE => DepMod::Le,
            ffi::ALPM_DEP_MOD_GT => DepMod::Gt,
            ffi::ALPM_DEP_MOD_LT => DepMod::Lt,
            _ => DepMod::Any,
        }
    }

    pub(crate) fn to_raw(self) -> ffi::alpm_depmod_t {
        match self {
            DepMod::Any => ffi::ALPM_DEP_MOD_ANY,
            DepMod::Eq => ffi::ALPM_DEP_MOD_EQ,
            DepMod::Ge => ffi::ALPM_DEP_MOD_GE,
            DepMod::Le => ffi::ALPM_DEP_MOD_LE,
            DepMod::Gt => ffi::ALPM_DEP_MOD_GT,
            DepMod::Lt => ffi::ALPM_DEP_MOD_LT,
        }
    }

    /// Does an ordering of `candidate` against the required version pass?
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            DepMod::Any => true,
            DepMod::Eq => ordering == Ordering::Equal,
            DepMod::Ge => ordering != Ordering::Less,
            DepMod::Le => ordering != Ordering::Greater,
            DepMod::Gt => ordering == Ordering::Greater,
            DepMod::Lt => ordering == Ordering::Less,
        }
    }
}

/// A dependency specifier such as `glibc>=2.12` or `python: scripting`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depend {
    /// Target package name or provided capability
    pub name: String,
    pub version: Option<String>,
    /// Free-text reason, used by optional dependencies
    pub description: Option<String>,
    pub modifier: DepMod,
}

impl Depend {
    /// An unversioned dependency on `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            modifier: DepMod::Any,
        }
    }

    /// Copy a native dependency record
    ///
    /// # Safety
    ///
    /// `raw` must be NULL or point at a live `alpm_depend_t`.
    pub(crate) unsafe fn from_raw(raw: *const ffi::alpm_depend_t) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        // SAFETY: non-null and live per the caller's contract
        let raw = unsafe { &*raw };
        unsafe {
            Some(Self {
                name: ffi::to_string(raw.name)?,
                version: ffi::to_string(raw.version),
                description: ffi::to_string(raw.desc),
                modifier: DepMod::from_raw(raw.mod_),
            })
        }
    }

    /// Does `version` pass this specifier's version constraint?
    pub fn version_matches(&self, version: &str) -> bool {
        if self.modifier == DepMod::Any {
            return true;
        }
        let required = self.version.as_deref().unwrap_or("");
        self.modifier.accepts(vercmp(version, required))
    }

    /// Is this specifier satisfied by a package with the given name,
    /// version and provides list?
    ///
    /// A provide only satisfies a versioned specifier when the provide
    /// itself carries an exact (`=`) version.
    pub fn is_satisfied_by(&self, name: &str, version: &str, provides: &[Depend]) -> bool {
        if name == self.name && self.version_matches(version) {
            return true;
        }

        provides.iter().any(|provide| {
            if provide.name != self.name {
                return false;
            }
            match (self.modifier, provide.modifier) {
                (DepMod::Any, _) => true,
                (_, DepMod::Eq) => self.version_matches(provide.version.as_deref().unwrap_or("")),
                _ => false,
            }
        })
    }
}

impl FromStr for Depend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (spec, description) = match s.split_once(": ") {
            Some((spec, desc)) => (spec, Some(desc.to_string())),
            None => (s, None),
        };

        let (name, modifier, version) = if let Some(pos) = spec.find('<') {
            match spec[pos + 1..].strip_prefix('=') {
                Some(version) => (&spec[..pos], DepMod::Le, Some(version)),
                None => (&spec[..pos], DepMod::Lt, Some(&spec[pos + 1..])),
            }
        } else if let Some(pos) = spec.find('>') {
            match spec[pos + 1..].strip_prefix('=') {
                Some(version) => (&spec[..pos], DepMod::Ge, Some(version)),
                None => (&spec[..pos], DepMod::Gt, Some(&spec[pos + 1..])),
            }
        } else if let Some(pos) = spec.find('=') {
            (&spec[..pos], DepMod::Eq, Some(&spec[pos + 1..]))
        } else {
            (spec, DepMod::Any, None)
        };

        if name.is_empty() {
            return Err(format!("Invalid dependency specifier: '{}'", s));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.map(str::to_string),
            description,
            modifier,
        })
    }
}

impl fmt::Display for Depend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.modifier != DepMod::Any {
            write!(f, "{}{}", self.modifier.as_str(), self.version.as_deref().unwrap_or(""))?;
        }
        if let Some(desc) = &self.description {
            write!(f, ": {}", desc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    fn check(a: &str, b: &str, expected: Ordering) {
        assert_eq!(vercmp(a, b), expected, "vercmp({}, {})", a, b);
        assert_eq!(vercmp(b, a), expected.reverse(), "vercmp({}, {})", b, a);
    }

    #[test]
    fn test_vercmp_simple() {
        check("1.5.0", "1.5.0", Equal);
        check("1.5.1", "1.5.0", Greater);
        check("1.5.1", "1.5", Greater);
        check("1.10", "1.9", Greater);
        check("1.001", "1.1", Equal);
    }

    #[test]
    fn test_vercmp_release() {
        check("1.5.0-1", "1.5.0-2", Less);
        check("1.5.0-1", "1.5.1-1", Less);
        check("1.5-1", "1.5.1-1", Less);
        check("1.5", "1.5-1", Equal);
        check("1.1-1", "1.1", Equal);
        check("1.0-1", "1.1", Less);
    }

    #[test]
    fn test_vercmp_alpha() {
        check("1.5b-1", "1.5-1", Less);
        check("1.5b", "1.5.1", Less);
        check("1.0a", "1.0alpha", Less);
        check("1.0alpha", "1.0b", Less);
        check("1.0beta", "1.0rc", Less);
        check("1.0rc", "1.0", Less);
        check("1.5.a", "1.5", Greater);
        check("1.5.1", "1.5.b", Greater);
    }

    #[test]
    fn test_vercmp_separators() {
        check("2.0", "2_0", Equal);
        check("2.0_a", "2_0.a", Equal);
        check("2.0a", "2.0.a", Less);
        check("2___a", "2_a", Greater);
    }

    #[test]
    fn test_vercmp_epoch() {
        check("0:1.0", "0:1.0", Equal);
        check("1:1.0", "0:1.1", Greater);
        check("1:1.0", "2:1.1", Less);
        check("0:1.0", "1.0", Equal);
        check("1:1.0", "1.1", Greater);
        check("1:1.0-1", "0:1.1-1", Greater);
    }

    #[test]
    fn test_vercmp_tilde() {
        check("1.0~rc1", "1.0", Less);
        check("1.0~rc1", "1.0~rc2", Less);
        check("1.0~~", "1.0~", Less);
        check("1.0~rc1-1", "1.0-1", Less);
    }

    #[test]
    fn test_parse_depend() {
        let dep: Depend = "glibc>=2.12".parse().unwrap();
        assert_eq!(dep.name, "glibc");
        assert_eq!(dep.modifier, DepMod::Ge);
        assert_eq!(dep.version.as_deref(), Some("2.12"));

        let dep: Depend = "python: for scripting support".parse().unwrap();
        assert_eq!(dep.name, "python");
        assert_eq!(dep.modifier, DepMod::Any);
        assert_eq!(dep.description.as_deref(), Some("for scripting support"));

        let dep: Depend = "sh=5.2-1".parse().unwrap();
        assert_eq!(dep.modifier, DepMod::Eq);
        assert_eq!(dep.version.as_deref(), Some("5.2-1"));

        let dep: Depend = "linux<6".parse().unwrap();
        assert_eq!(dep.modifier, DepMod::Lt);

        assert!(">=1.0".parse::<Depend>().is_err());
    }

    #[test]
    fn test_depend_display() {
        let dep: Depend = "glibc>=2.12: C library".parse().unwrap();
        assert_eq!(dep.to_string(), "glibc>=2.12: C library");
        assert_eq!(Depend::new("bash").to_string(), "bash");
    }

    #[test]
    fn test_satisfied_by_name_and_provides() {
        let dep: Depend = "sh>=5".parse().unwrap();
        assert!(dep.is_satisfied_by("sh", "5.1", &[]));
        assert!(!dep.is_satisfied_by("sh", "4.4", &[]));

        let versioned_provide: Depend = "sh=5.2".parse().unwrap();
        assert!(dep.is_satisfied_by("bash", "5.2.037-1", &[versioned_provide]));

        // An unversioned provide cannot satisfy a versioned dependency
        assert!(!dep.is_satisfied_by("bash", "5.2.037-1", &[Depend::new("sh")]));
        assert!(Depend::new("sh").is_satisfied_by("bash", "5.2.037-1", &[Depend::new("sh")]));
    }
}
