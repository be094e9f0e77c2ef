use grove_config::ConfigSet;
use grove_diff::{DiffAlgorithm, FindOptions, Whitespace};

use crate::MergeError;

/// Length of `<<<<<<<`, `|||||||`, `=======` and `>>>>>>>`.
pub const DEFAULT_MARKER_SIZE: usize = 7;

/// How a conflicted region is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStyle {
    /// Ours and theirs only.
    #[default]
    Merge,
    /// Ours, the ancestor between `|||||||` and `=======`, then theirs.
    Diff3,
}

impl ConflictStyle {
    /// Parse a `merge.conflictStyle` value. `zdiff3` is read as `diff3`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "merge" => Some(Self::Merge),
            "diff3" | "zdiff3" => Some(Self::Diff3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Diff3 => "diff3",
        }
    }
}

/// Which side wins a conflicting region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFavor {
    /// Leave conflict markers.
    #[default]
    Normal,
    Ours,
    Theirs,
    /// Ours followed by theirs, no markers.
    Union,
}

/// Options for a single three-way file merge.
#[derive(Debug, Clone)]
pub struct MergeFileOptions {
    pub style: ConflictStyle,
    pub favor: FileFavor,
    /// Compare lines with all whitespace removed.
    pub ignore_whitespace: bool,
    /// Compare lines with whitespace runs collapsed.
    pub ignore_whitespace_change: bool,
    pub algorithm: DiffAlgorithm,
    pub ancestor_label: Option<String>,
    pub our_label: Option<String>,
    pub their_label: Option<String>,
    pub marker_size: usize,
}

impl Default for MergeFileOptions {
    fn default() -> Self {
        Self {
            style: ConflictStyle::Merge,
            favor: FileFavor::Normal,
            ignore_whitespace: false,
            ignore_whitespace_change: false,
            algorithm: DiffAlgorithm::Myers,
            ancestor_label: None,
            our_label: None,
            their_label: None,
            marker_size: DEFAULT_MARKER_SIZE,
        }
    }
}

impl MergeFileOptions {
    pub(crate) fn whitespace(&self) -> Whitespace {
        if self.ignore_whitespace {
            Whitespace::IgnoreAll
        } else if self.ignore_whitespace_change {
            Whitespace::IgnoreChange
        } else {
            Whitespace::Exact
        }
    }
}

/// Options for tree and commit merges.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub file: MergeFileOptions,
    /// Rename detection run on each side before pairing paths.
    pub find: FindOptions,
    /// Merge histories with no common ancestor against an empty tree.
    pub allow_unrelated: bool,
}

impl MergeOptions {
    /// Defaults adjusted by `merge.conflictStyle`, `diff.renames`,
    /// `diff.renameLimit`, `merge.renames` and `merge.renameLimit`.
    pub fn from_config(config: &ConfigSet) -> Result<Self, MergeError> {
        let mut options = Self {
            find: FindOptions::from_config(config)?,
            ..Self::default()
        };
        // Copies never pair paths in a merge.
        options.find.copies = false;
        if let Some(style) = config.get_string("merge.conflictStyle")? {
            options.file.style = ConflictStyle::from_name(&style).ok_or(MergeError::InvalidOption {
                key: "merge.conflictStyle",
                value: style,
            })?;
        }
        if let Some(renames) = config.get_bool("merge.renames")? {
            options.find.renames = renames;
        }
        if let Some(limit) = config.get_int("merge.renameLimit")? {
            options.find.rename_limit = usize::try_from(limit).map_err(|_| MergeError::InvalidOption {
                key: "merge.renameLimit",
                value: limit.to_string(),
            })?;
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = MergeOptions::default();
        assert_eq!(opts.file.style, ConflictStyle::Merge);
        assert_eq!(opts.file.favor, FileFavor::Normal);
        assert_eq!(opts.file.marker_size, 7);
        assert!(opts.find.renames);
        assert!(!opts.find.copies);
        assert!(!opts.allow_unrelated);
    }

    #[test]
    fn style_names() {
        assert_eq!(ConflictStyle::from_name("diff3"), Some(ConflictStyle::Diff3));
        assert_eq!(ConflictStyle::from_name("zdiff3"), Some(ConflictStyle::Diff3));
        assert_eq!(ConflictStyle::from_name("merge"), Some(ConflictStyle::Merge));
        assert_eq!(ConflictStyle::from_name("fancy"), None);
        assert_eq!(ConflictStyle::Diff3.name(), "diff3");
    }

    #[test]
    fn whitespace_flags() {
        let mut opts = MergeFileOptions::default();
        assert_eq!(opts.whitespace(), Whitespace::Exact);
        opts.ignore_whitespace_change = true;
        assert_eq!(opts.whitespace(), Whitespace::IgnoreChange);
        opts.ignore_whitespace = true;
        assert_eq!(opts.whitespace(), Whitespace::IgnoreAll);
    }

    #[test]
    fn reads_config() {
        let mut config = ConfigSet::new();
        config.set_override("merge.conflictStyle", "diff3").unwrap();
        config.set_override("merge.renames", "false").unwrap();
        let opts = MergeOptions::from_config(&config).unwrap();
        assert_eq!(opts.file.style, ConflictStyle::Diff3);
        assert!(!opts.find.renames);

        config.set_override("merge.conflictStyle", "loud").unwrap();
        assert!(MergeOptions::from_config(&config).is_err());
    }
}
