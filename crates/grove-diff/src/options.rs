use bstr::BString;
use grove_config::ConfigSet;

use crate::algorithm::Whitespace;
use crate::binary::DEFAULT_BINARY_SCAN;
use crate::DiffError;

/// Line diff algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffAlgorithm {
    /// Minimal edit script (Myers 1986).
    #[default]
    Myers,
    /// Anchors on lines unique to both sides, Myers in between.
    Patience,
}

impl DiffAlgorithm {
    /// Parse a `diff.algorithm` value. `histogram` is served by patience.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "myers" | "default" | "minimal" => Some(Self::Myers),
            "patience" | "histogram" => Some(Self::Patience),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Swap the old and new sides.
    pub reverse: bool,
    /// Treat every file as text.
    pub force_text: bool,
    pub ignore_whitespace: bool,
    pub ignore_whitespace_change: bool,
    /// Executable and regular files compare equal.
    pub ignore_filemode: bool,
    pub include_unmodified: bool,
    /// Report kind switches as `TypeChange` instead of a delete and an add.
    pub include_typechange: bool,
    pub include_untracked: bool,
    pub include_ignored: bool,
    /// Path prefixes or globs; empty means every path.
    pub pathspec: Vec<BString>,
    pub context_lines: u32,
    /// Hunks separated by at most this many unchanged lines (beyond the
    /// context) are merged.
    pub interhunk_lines: u32,
    pub algorithm: DiffAlgorithm,
    pub max_binary_scan: usize,
    /// Regex selecting hunk header context lines; the first capture group
    /// is used when present.
    pub funcname_pattern: Option<String>,
    pub old_prefix: String,
    pub new_prefix: String,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            reverse: false,
            force_text: false,
            ignore_whitespace: false,
            ignore_whitespace_change: false,
            ignore_filemode: false,
            include_unmodified: false,
            include_typechange: false,
            include_untracked: false,
            include_ignored: false,
            pathspec: Vec::new(),
            context_lines: 3,
            interhunk_lines: 0,
            algorithm: DiffAlgorithm::Myers,
            max_binary_scan: DEFAULT_BINARY_SCAN,
            funcname_pattern: None,
            old_prefix: "a/".into(),
            new_prefix: "b/".into(),
        }
    }
}

impl DiffOptions {
    /// Defaults with `diff.algorithm` applied.
    pub fn from_config(config: &ConfigSet) -> Result<Self, DiffError> {
        let mut options = Self::default();
        if let Some(name) = config.get_string("diff.algorithm")? {
            options.algorithm = DiffAlgorithm::from_name(&name).ok_or(DiffError::InvalidOption {
                key: "diff.algorithm",
                value: name,
            })?;
        }
        Ok(options)
    }

    pub fn whitespace(&self) -> Whitespace {
        if self.ignore_whitespace {
            Whitespace::IgnoreAll
        } else if self.ignore_whitespace_change {
            Whitespace::IgnoreChange
        } else {
            Whitespace::Exact
        }
    }
}

/// Rename and copy detection settings for [`crate::Diff::find_similar`].
#[derive(Debug, Clone)]
pub struct FindOptions {
    pub renames: bool,
    pub copies: bool,
    /// Minimum similarity in `[0, 1]` for a rename.
    pub rename_threshold: f32,
    pub copy_threshold: f32,
    /// Fuzzy matching is skipped when sources times targets exceeds the
    /// square of this.
    pub rename_limit: usize,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            renames: true,
            copies: false,
            rename_threshold: 0.5,
            copy_threshold: 0.5,
            rename_limit: 1000,
        }
    }
}

impl FindOptions {
    /// Defaults with `diff.renames` and `diff.renameLimit` applied.
    pub fn from_config(config: &ConfigSet) -> Result<Self, DiffError> {
        let mut options = Self::default();
        if let Some(value) = config.get_string("diff.renames")? {
            if matches!(value.to_ascii_lowercase().as_str(), "copies" | "copy") {
                options.renames = true;
                options.copies = true;
            } else {
                options.renames = config.get_bool("diff.renames")?.unwrap_or(true);
            }
        }
        if let Some(limit) = config.get_int("diff.renameLimit")? {
            options.rename_limit = usize::try_from(limit).map_err(|_| DiffError::InvalidOption {
                key: "diff.renameLimit",
                value: limit.to_string(),
            })?;
        }
        Ok(options)
    }
}
