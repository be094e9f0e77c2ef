use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use tracing::debug;

use crate::error::ConfigError;
use crate::file::ConfigFile;
use crate::types;
use crate::{ConfigEntry, ConfigKey, ConfigScope};

/// When set (to anything), `$HOME/.gitconfig` is not read.
pub const NO_GLOBAL_ENV: &str = "GROVE_CONFIG_NOGLOBAL";

/// Global, local and in-memory configuration; the later layer wins.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    global: Option<ConfigFile>,
    local: Option<ConfigFile>,
    overrides: ConfigFile,
}

impl Default for ConfigSet {
    fn default() -> Self {
        Self::new()
    }
}

fn global_path() -> Option<PathBuf> {
    if std::env::var_os(NO_GLOBAL_ENV).is_some() {
        return None;
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".gitconfig"))
}

impl ConfigSet {
    /// No files, only overrides.
    pub fn new() -> Self {
        Self {
            global: None,
            local: None,
            overrides: ConfigFile::empty(None, ConfigScope::Memory),
        }
    }

    /// The user's global file (if present and not disabled) and
    /// `<git_dir>/config`.
    pub fn load(git_dir: &Path) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        if let Some(path) = global_path().filter(|p| p.is_file()) {
            debug!(path = %path.display(), "loading global config");
            set.global = Some(ConfigFile::load(&path, ConfigScope::Global)?);
        }
        set.local = Some(ConfigFile::load(&git_dir.join("config"), ConfigScope::Local)?);
        Ok(set)
    }

    /// Only the repository file, ignoring the environment.
    pub fn load_local_only(git_dir: &Path) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        set.local = Some(ConfigFile::load(&git_dir.join("config"), ConfigScope::Local)?);
        Ok(set)
    }

    pub fn with_global(mut self, file: ConfigFile) -> Self {
        self.global = Some(file);
        self
    }

    pub fn with_local(mut self, file: ConfigFile) -> Self {
        self.local = Some(file);
        self
    }

    pub fn local(&self) -> Option<&ConfigFile> {
        self.local.as_ref()
    }

    fn layers(&self) -> impl DoubleEndedIterator<Item = &ConfigFile> {
        self.global
            .iter()
            .chain(self.local.iter())
            .chain(std::iter::once(&self.overrides))
    }

    /// Raw value from the highest layer that has `key`.
    pub fn get_raw(&self, key: &str) -> Result<Option<Option<BString>>, ConfigError> {
        let key = ConfigKey::parse(key)?;
        Ok(self
            .layers()
            .rev()
            .find_map(|f| f.get(&key))
            .map(|v| v.map(ToOwned::to_owned)))
    }

    /// Every value across layers, lowest precedence first.
    pub fn get_all(&self, key: &str) -> Result<Vec<BString>, ConfigError> {
        let key = ConfigKey::parse(key)?;
        Ok(self
            .layers()
            .flat_map(|f| f.get_all(&key))
            .map(|v| v.map_or_else(BString::default, ToOwned::to_owned))
            .collect())
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self
            .get_raw(key)?
            .map(|v| v.map_or_else(String::new, |v| v.to_str_lossy().into_owned())))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get_raw(key)? {
            Some(v) => types::parse_bool(key, v.as_ref().map(|v| v.as_bstr())).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    /// A bare key has no number in it and is rejected.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.get_raw(key)? {
            Some(Some(v)) => types::parse_int(key, v.as_bstr()).map(Some),
            Some(None) => Err(ConfigError::InvalidInt {
                key: key.to_owned(),
                value: String::new(),
            }),
            None => Ok(None),
        }
    }

    pub fn entries(&self) -> Vec<ConfigEntry> {
        self.layers().flat_map(ConfigFile::entries).collect()
    }

    /// Subsections of `section` across all layers, deduplicated.
    pub fn subsections(&self, section: &str) -> Vec<BString> {
        let mut out: Vec<BString> = Vec::new();
        for sub in self.layers().flat_map(|f| f.subsections(section)) {
            if !out.contains(&sub) {
                out.push(sub);
            }
        }
        out
    }

    /// Highest-precedence value for this process only.
    pub fn set_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = ConfigKey::parse(key)?;
        self.overrides.set(&key, BStr::new(value));
        Ok(())
    }

    fn local_mut(&mut self) -> Result<&mut ConfigFile, ConfigError> {
        self.local.as_mut().ok_or(ConfigError::NoWritableFile)
    }

    /// Set `key` in the repository file and write it out.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parsed = ConfigKey::parse(key)?;
        let local = self.local_mut()?;
        local.set(&parsed, BStr::new(value));
        local.save()
    }

    /// Remove `key` from the repository file. Returns whether anything was
    /// removed.
    pub fn unset(&mut self, key: &str) -> Result<bool, ConfigError> {
        let parsed = ConfigKey::parse(key)?;
        let local = self.local_mut()?;
        if local.unset(&parsed) == 0 {
            return Ok(false);
        }
        local.save()?;
        Ok(true)
    }

    pub fn remove_section(&mut self, section: &str, subsection: Option<&str>) -> Result<bool, ConfigError> {
        let local = self.local_mut()?;
        if !local.remove_section(section, subsection) {
            return Ok(false);
        }
        local.save()?;
        Ok(true)
    }

    pub fn rename_section(&mut self, section: &str, old: &str, new: &str) -> Result<bool, ConfigError> {
        let local = self.local_mut()?;
        if !local.rename_section(section, old, new) {
            return Ok(false);
        }
        local.save()?;
        Ok(true)
    }
}
