//! Reading and writing git-format configuration.
//!
//! [`ConfigFile`] is one file, kept as a lossless event list so edits touch
//! only the lines they change. [`ConfigSet`] layers the global file, the
//! repository file and in-memory overrides, later layers winning.

mod error;
mod file;
mod parse;
mod set;
mod types;

pub use error::ConfigError;
pub use file::ConfigFile;
pub use set::{ConfigSet, NO_GLOBAL_ENV};
pub use types::{parse_bool, parse_int};

use std::fmt;
use std::path::PathBuf;

use bstr::{BStr, BString, ByteSlice};

/// Where a value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigScope {
    /// `$HOME/.gitconfig`
    Global,
    /// `<git-dir>/config`
    Local,
    /// Values set through [`ConfigSet::set_override`].
    Memory,
}

/// `section[.subsection].name`. Section and name compare case-insensitively
/// and are stored lowercased; the subsection is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub section: BString,
    pub subsection: Option<BString>,
    pub name: BString,
}

impl ConfigKey {
    /// The subsection is everything between the first and the last dot, so
    /// `url.https://host/.insteadOf` works.
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidKey(key.to_owned());
        let (section, rest) = key.split_once('.').ok_or_else(invalid)?;
        let (subsection, name) = match rest.rsplit_once('.') {
            Some((sub, name)) => (Some(sub), name),
            None => (None, rest),
        };

        let valid_section = !section.is_empty()
            && section.bytes().all(parse::is_name_char);
        let valid_name = name.bytes().next().is_some_and(|b| b.is_ascii_alphabetic())
            && name.bytes().all(parse::is_name_char);
        if !valid_section || !valid_name || subsection.is_some_and(|s| s.contains('\n')) {
            return Err(invalid());
        }

        Ok(Self {
            section: BString::from(section.to_ascii_lowercase()),
            subsection: subsection.map(BString::from),
            name: BString::from(name.to_ascii_lowercase()),
        })
    }

    pub fn new(section: &str, subsection: Option<&str>, name: &str) -> Result<Self, ConfigError> {
        match subsection {
            Some(sub) => Self::parse(&format!("{section}.{sub}.{name}")),
            None => Self::parse(&format!("{section}.{name}")),
        }
    }

    pub(crate) fn in_section(&self, section: &BStr, subsection: Option<&BStr>) -> bool {
        self.section.as_bstr() == section && self.subsection.as_ref().map(|s| s.as_bstr()) == subsection
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subsection {
            Some(sub) => write!(f, "{}.{}.{}", self.section, sub, self.name),
            None => write!(f, "{}.{}", self.section, self.name),
        }
    }
}

/// One value with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    /// `None` for a bare `name` line.
    pub value: Option<BString>,
    pub scope: ConfigScope,
    pub origin: Option<PathBuf>,
    pub line: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_forms() {
        let k = ConfigKey::parse("User.Name").unwrap();
        assert_eq!(k.section, "user");
        assert!(k.subsection.is_none());
        assert_eq!(k.name, "name");

        let k = ConfigKey::parse("remote.Origin.URL").unwrap();
        assert_eq!(k.subsection.as_deref().map(|s| s.as_bstr()), Some(BStr::new("Origin")));
        assert_eq!(k.name, "url");
        assert_eq!(k.to_string(), "remote.Origin.url");

        let k = ConfigKey::parse("url.https://example.com/.insteadOf").unwrap();
        assert_eq!(k.subsection.unwrap(), "https://example.com/");
        assert_eq!(k.name, "insteadof");
    }

    #[test]
    fn bad_keys() {
        for bad in ["", "nodot", "core.", ".name", "core.1bad", "core.has space"] {
            assert!(ConfigKey::parse(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn subsection_is_case_sensitive() {
        let a = ConfigKey::parse("branch.Main.remote").unwrap();
        let b = ConfigKey::parse("branch.main.remote").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, ConfigKey::parse("BRANCH.Main.Remote").unwrap());
    }
}
