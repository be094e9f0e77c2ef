use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice, ByteVec};
use grove_utils::lockfile::LockFile;
use tracing::debug;

use crate::error::ConfigError;
use crate::parse::{self, Event};
use crate::{ConfigEntry, ConfigKey, ConfigScope};

/// A single configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: Option<PathBuf>,
    scope: ConfigScope,
    events: Vec<Event>,
}

/// Walks events while tracking the enclosing section.
fn with_sections<'a>(
    events: &'a [Event],
) -> impl Iterator<Item = (usize, Option<(&'a BStr, Option<&'a BStr>)>, &'a Event)> + 'a {
    let mut current: Option<(&BStr, Option<&BStr>)> = None;
    events.iter().enumerate().map(move |(i, event)| {
        if let Event::Section { name, subsection, .. } = event {
            current = Some((name.as_bstr(), subsection.as_ref().map(|s| s.as_bstr())));
        }
        (i, current, event)
    })
}

impl ConfigFile {
    pub fn empty(path: Option<&Path>, scope: ConfigScope) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            scope,
            events: Vec::new(),
        }
    }

    pub fn parse(content: &[u8], path: Option<&Path>, scope: ConfigScope) -> Result<Self, ConfigError> {
        let origin = path.map_or_else(|| "<memory>".to_owned(), |p| p.display().to_string());
        Ok(Self {
            path: path.map(Path::to_path_buf),
            scope,
            events: parse::parse(content, &origin)?,
        })
    }

    /// Read `path`; a missing file gives an empty config bound to that path.
    pub fn load(path: &Path, scope: ConfigScope) -> Result<Self, ConfigError> {
        match std::fs::read(path) {
            Ok(content) => Self::parse(&content, Some(path), scope),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty(Some(path), scope)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    pub fn entries(&self) -> Vec<ConfigEntry> {
        with_sections(&self.events)
            .filter_map(|(_, section, event)| match (section, event) {
                (Some((sec, sub)), Event::Entry { name, value, line, .. }) => Some(ConfigEntry {
                    key: ConfigKey {
                        section: sec.to_owned(),
                        subsection: sub.map(ToOwned::to_owned),
                        name: name.clone(),
                    },
                    value: value.clone(),
                    scope: self.scope,
                    origin: self.path.clone(),
                    line: Some(*line),
                }),
                _ => None,
            })
            .collect()
    }

    fn matching<'a>(&'a self, key: &ConfigKey) -> impl Iterator<Item = (usize, Option<&'a BStr>)> + 'a {
        let key = key.clone();
        with_sections(&self.events).filter_map(move |(i, section, event)| match (section, event) {
            (Some((sec, sub)), Event::Entry { name, value, .. })
                if key.in_section(sec, sub) && *name == key.name =>
            {
                Some((i, value.as_ref().map(|v| v.as_bstr())))
            }
            _ => None,
        })
    }

    /// The last value for `key`. The inner `None` is a bare `name` line.
    pub fn get(&self, key: &ConfigKey) -> Option<Option<&BStr>> {
        self.matching(key).last().map(|(_, v)| v)
    }

    pub fn get_all(&self, key: &ConfigKey) -> Vec<Option<&BStr>> {
        self.matching(key).map(|(_, v)| v).collect()
    }

    /// Every subsection name that appears for `section`, in file order.
    pub fn subsections(&self, section: &str) -> Vec<BString> {
        let section = section.to_ascii_lowercase();
        let mut out: Vec<BString> = Vec::new();
        for event in &self.events {
            if let Event::Section { name, subsection: Some(sub), .. } = event {
                if *name == section && !out.contains(sub) {
                    out.push(sub.clone());
                }
            }
        }
        out
    }

    fn entry_event(key: &ConfigKey, value: &BStr, line: usize) -> Event {
        let mut raw = BString::from("\t");
        raw.push_str(&key.name);
        raw.push_str(b" = ");
        raw.push_str(parse::quote_value(value));
        raw.push_byte(b'\n');
        Event::Entry {
            raw,
            name: key.name.clone(),
            value: Some(value.to_owned()),
            line,
        }
    }

    fn ensure_trailing_newline(&mut self, index: usize) {
        if let Some(event) = self.events.get_mut(index) {
            let raw = match event {
                Event::Section { raw, .. } | Event::Entry { raw, .. } | Event::Other(raw) => raw,
            };
            if !raw.ends_with(b"\n") {
                raw.push_byte(b'\n');
            }
        }
    }

    /// Replace the last value of `key`, or add it to the last matching
    /// section, or append a new section.
    pub fn set(&mut self, key: &ConfigKey, value: &BStr) {
        let existing = self.matching(key).last().map(|(i, _)| i);
        if let Some(i) = existing {
            let line = match &self.events[i] {
                Event::Entry { line, .. } => *line,
                _ => 0,
            };
            self.events[i] = Self::entry_event(key, value, line);
            return;
        }

        let sub = key.subsection.as_ref().map(|s| s.as_bstr());
        let last_in_section = with_sections(&self.events)
            .filter(|(_, section, event)| {
                matches!(section, Some((sec, s)) if key.in_section(sec, *s))
                    && !matches!(event, Event::Other(_))
            })
            .map(|(i, _, _)| i)
            .last();

        match last_in_section {
            Some(i) => {
                self.ensure_trailing_newline(i);
                self.events.insert(i + 1, Self::entry_event(key, value, 0));
            }
            None => {
                if let Some(last) = self.events.len().checked_sub(1) {
                    self.ensure_trailing_newline(last);
                }
                self.events.push(Event::Section {
                    raw: parse::section_header(&key.section, sub.map(|s| s.as_bytes())),
                    name: key.section.clone(),
                    subsection: key.subsection.clone(),
                });
                self.events.push(Self::entry_event(key, value, 0));
            }
        }
    }

    /// Drop every line for `key`. Returns how many were removed.
    pub fn unset(&mut self, key: &ConfigKey) -> usize {
        let doomed: Vec<usize> = self.matching(key).map(|(i, _)| i).collect();
        for &i in doomed.iter().rev() {
            self.events.remove(i);
        }
        doomed.len()
    }

    /// Remove a whole `[section "sub"]` block, every occurrence of it.
    pub fn remove_section(&mut self, section: &str, subsection: Option<&str>) -> bool {
        let section = section.to_ascii_lowercase();
        let wanted = |name: &BString, sub: &Option<BString>| {
            *name == section && sub.as_ref().map(|s| s.as_bytes()) == subsection.map(str::as_bytes)
        };
        let before = self.events.len();
        let mut inside = false;
        self.events.retain(|event| {
            if let Event::Section { name, subsection, .. } = event {
                inside = wanted(name, subsection);
            }
            !inside
        });
        self.events.len() != before
    }

    /// Rename `[section "old"]` headers to `[section "new"]`.
    pub fn rename_section(&mut self, section: &str, old: &str, new: &str) -> bool {
        let section = section.to_ascii_lowercase();
        let mut renamed = false;
        for event in &mut self.events {
            if let Event::Section { raw, name, subsection } = event {
                if *name == section && subsection.as_ref().is_some_and(|s| s == old) {
                    *raw = parse::section_header(name, Some(new.as_bytes()));
                    *subsection = Some(BString::from(new));
                    renamed = true;
                }
            }
        }
        renamed
    }

    pub fn to_bytes(&self) -> BString {
        let mut out = BString::default();
        for event in &self.events {
            out.push_str(event.raw());
        }
        out
    }

    /// Write back to the file's own path through a lock file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.path.as_deref().ok_or(ConfigError::NoWritableFile)?;
        let mut lock = LockFile::acquire(path)?;
        lock.write_all(&self.to_bytes())?;
        lock.commit()?;
        debug!(path = %path.display(), "wrote config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> ConfigKey {
        ConfigKey::parse(k).unwrap()
    }

    fn file(text: &str) -> ConfigFile {
        ConfigFile::parse(text.as_bytes(), None, ConfigScope::Local).unwrap()
    }

    #[test]
    fn last_value_wins() {
        let f = file("[core]\n\tbare = false\n[core]\n\tbare = true\n");
        assert_eq!(f.get(&key("core.bare")), Some(Some(BStr::new("true"))));
        assert_eq!(f.get_all(&key("core.bare")).len(), 2);
        assert_eq!(f.get(&key("core.missing")), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut f = file("# keep me\n[user]\n\tname = Old ; note\n\temail = a@b\n");
        f.set(&key("user.name"), BStr::new("New Name"));
        assert_eq!(
            f.to_bytes(),
            "# keep me\n[user]\n\tname = New Name\n\temail = a@b\n"
        );
    }

    #[test]
    fn set_adds_to_existing_section() {
        let mut f = file("[user]\n\tname = A\n[core]\n\tbare = false");
        f.set(&key("user.email"), BStr::new("a@example.com"));
        f.set(&key("core.compression"), BStr::new("9"));
        assert_eq!(
            f.to_bytes(),
            "[user]\n\tname = A\n\temail = a@example.com\n[core]\n\tbare = false\n\tcompression = 9\n"
        );
    }

    #[test]
    fn set_creates_section() {
        let mut f = file("");
        f.set(&key("branch.Main.remote"), BStr::new("origin"));
        assert_eq!(f.to_bytes(), "[branch \"Main\"]\n\tremote = origin\n");
        assert_eq!(f.subsections("branch"), vec![BString::from("Main")]);
    }

    #[test]
    fn unset_and_remove_section() {
        let mut f = file("[a]\n\tx = 1\n\tx = 2\n\ty = 3\n[remote \"o\"]\n\turl = u\n[b]\n\tz = 4\n");
        assert_eq!(f.unset(&key("a.x")), 2);
        assert!(f.remove_section("remote", Some("o")));
        assert_eq!(f.to_bytes(), "[a]\n\ty = 3\n[b]\n\tz = 4\n");
        assert!(!f.remove_section("remote", Some("o")));
    }

    #[test]
    fn rename_subsection() {
        let mut f = file("[branch \"old\"]\n\tremote = origin\n");
        assert!(f.rename_section("branch", "old", "new"));
        assert_eq!(f.get(&key("branch.new.remote")), Some(Some(BStr::new("origin"))));
        assert_eq!(f.get(&key("branch.old.remote")), None);
    }

    #[test]
    fn save_through_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let mut f = ConfigFile::load(&path, ConfigScope::Local).unwrap();
        f.set(&key("core.bare"), BStr::new("false"));
        f.save().unwrap();
        let again = ConfigFile::load(&path, ConfigScope::Local).unwrap();
        assert_eq!(again.get(&key("core.bare")), Some(Some(BStr::new("false"))));
        assert!(!dir.path().join("config.lock").exists());
    }
}
