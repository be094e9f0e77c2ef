use std::fmt;

use crate::error::RefError;

/// A reference name that passed [`is_valid_name`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(String);

pub const HEAD: &str = "HEAD";

/// Characters that may not appear anywhere in a name.
const FORBIDDEN: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

fn check(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty");
    }
    if name == "@" {
        return Err("'@' alone");
    }
    if name.chars().any(|c| c.is_ascii_control() || FORBIDDEN.contains(&c)) {
        return Err("forbidden character");
    }
    if name.contains("..") || name.contains("@{") {
        return Err("contains '..' or '@{'");
    }
    if name.ends_with('.') {
        return Err("ends with '.'");
    }
    if !name.contains('/') && !name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_') {
        return Err("one-level names must be upper case like HEAD");
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err("empty path component");
        }
        if component.starts_with('.') {
            return Err("component starts with '.'");
        }
        if component.ends_with(".lock") {
            return Err("component ends with '.lock'");
        }
    }
    Ok(())
}

/// git's `check-ref-format` rules, plus: a name without `/` must be an
/// all-caps pseudo ref such as `HEAD` or `MERGE_HEAD`.
pub fn is_valid_name(name: &str) -> bool {
    check(name).is_ok()
}

impl RefName {
    pub fn new(name: impl Into<String>) -> Result<Self, RefError> {
        let name = name.into();
        match check(&name) {
            Ok(()) => Ok(Self(name)),
            Err(why) => Err(RefError::InvalidName(format!("'{name}': {why}"))),
        }
    }

    pub fn head() -> Self {
        Self(HEAD.to_owned())
    }

    /// `refs/heads/<short>`
    pub fn branch(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/heads/{short}"))
    }

    /// `refs/tags/<short>`
    pub fn tag(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/tags/{short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strip `refs/heads/`, `refs/tags/`, `refs/remotes/` or `refs/`.
    pub fn short_name(&self) -> &str {
        ["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"]
            .iter()
            .find_map(|p| self.0.strip_prefix(p))
            .unwrap_or(&self.0)
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("refs/remotes/")
    }

    pub fn is_note(&self) -> bool {
        self.0.starts_with("refs/notes/")
    }

    /// Pseudo refs live directly in the git dir and are never packed.
    pub fn is_pseudo(&self) -> bool {
        !self.0.contains('/')
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for RefName {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RefName {
    type Error = RefError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}
