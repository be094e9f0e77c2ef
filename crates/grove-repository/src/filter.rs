//! Content filters run when bytes move between the object database and the
//! work tree.
//!
//! A [`FilterRegistry`] is an ordinary value owned by a repository; filters
//! are registered into it with a priority and selected per path by the
//! attribute expressions they declare. Filters run in ascending priority
//! towards the work tree and in descending priority towards the object
//! database, so a pair of filters undo each other in the right order.

use std::sync::Arc;

use bstr::{BStr, BString, ByteSlice};
use tracing::trace;

use crate::attributes::{AttributeTable, Attributes};
use crate::RepoError;

pub type FilterError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDirection {
    /// Checkout: object database to work tree ("smudge").
    ToWorktree,
    /// Staging: work tree to object database ("clean").
    ToOdb,
}

/// What a filter is being run on.
#[derive(Debug, Clone, Copy)]
pub struct FilterSource<'a> {
    pub path: &'a BStr,
    pub direction: FilterDirection,
    pub attributes: &'a Attributes,
}

pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Space-separated attribute expressions (`text`, `-diff`,
    /// `filter=lfs`) that must all hold for a path before the filter runs.
    /// Empty means every path.
    fn attributes(&self) -> &str;

    /// Transform `input`, or return `None` to pass it through unchanged.
    fn apply(&self, source: &FilterSource<'_>, input: &[u8]) -> Result<Option<Vec<u8>>, FilterError>;
}

struct Registered {
    priority: i32,
    filter: Arc<dyn Filter>,
}

#[derive(Default)]
pub struct FilterRegistry {
    filters: Vec<Registered>,
    attributes: AttributeTable,
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .field("attribute_rules", &self.attributes.len())
            .finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `filter`. Names are unique within a registry.
    pub fn register(&mut self, filter: impl Filter + 'static, priority: i32) -> Result<(), RepoError> {
        self.register_arc(Arc::new(filter), priority)
    }

    pub fn register_arc(&mut self, filter: Arc<dyn Filter>, priority: i32) -> Result<(), RepoError> {
        if self.get(filter.name()).is_some() {
            return Err(RepoError::FilterExists(filter.name().to_owned()));
        }
        trace!(name = filter.name(), priority, "registered filter");
        self.filters.push(Registered { priority, filter });
        // Stable: equal priorities keep registration order.
        self.filters.sort_by_key(|r| r.priority);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn Filter>, RepoError> {
        let pos = self
            .filters
            .iter()
            .position(|r| r.filter.name() == name)
            .ok_or_else(|| RepoError::FilterNotFound(name.to_owned()))?;
        Ok(self.filters.remove(pos).filter)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters
            .iter()
            .find(|r| r.filter.name() == name)
            .map(|r| Arc::clone(&r.filter))
    }

    /// Registered names in ascending priority.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|r| r.filter.name()).collect()
    }

    /// Replace the attribute table with the rules in `text`.
    pub fn set_attributes(&mut self, text: &[u8]) {
        self.attributes = AttributeTable::parse(text);
    }

    /// Append the rules in `text` after the existing ones.
    pub fn add_attributes(&mut self, text: &[u8]) {
        self.attributes.add_lines(text);
    }

    pub fn attributes(&self, path: &BStr) -> Attributes {
        self.attributes.lookup(path)
    }

    /// `Some(true)` when attributes declare `path` binary (`binary` or
    /// `-diff`), `Some(false)` when `diff` forces text, `None` when the
    /// content has to decide.
    pub fn is_binary(&self, path: &BStr) -> Option<bool> {
        let attrs = self.attributes(path);
        if attrs.is_set("binary") || attrs.is_unset("diff") {
            Some(true)
        } else if attrs.is_set("diff") {
            Some(false)
        } else {
            None
        }
    }

    /// The filters that apply to `path`, in the order they run for
    /// `direction`.
    pub fn filter_list(&self, path: &BStr, direction: FilterDirection) -> FilterList {
        let attributes = self.attributes(path);
        let mut filters: Vec<Arc<dyn Filter>> = self
            .filters
            .iter()
            .filter(|r| {
                r.filter
                    .attributes()
                    .split_whitespace()
                    .all(|expr| attributes.satisfies(expr))
            })
            .map(|r| Arc::clone(&r.filter))
            .collect();
        if direction == FilterDirection::ToOdb {
            filters.reverse();
        }
        FilterList {
            path: path.to_owned(),
            direction,
            attributes,
            filters,
        }
    }

    pub fn apply(&self, path: &BStr, input: &[u8], direction: FilterDirection) -> Result<Vec<u8>, RepoError> {
        self.filter_list(path, direction).apply(input)
    }
}

/// Filters selected for one path and direction.
pub struct FilterList {
    path: BString,
    direction: FilterDirection,
    attributes: Attributes,
    filters: Vec<Arc<dyn Filter>>,
}

impl std::fmt::Debug for FilterList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterList")
            .field("path", &self.path)
            .field("direction", &self.direction)
            .field("filters", &self.names())
            .finish()
    }
}

impl FilterList {
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn apply(&self, input: &[u8]) -> Result<Vec<u8>, RepoError> {
        let source = FilterSource {
            path: self.path.as_bstr(),
            direction: self.direction,
            attributes: &self.attributes,
        };
        let mut data = input.to_vec();
        for filter in &self.filters {
            let output = filter.apply(&source, &data).map_err(|source| RepoError::Filter {
                name: filter.name().to_owned(),
                path: self.path.to_string(),
                source,
            })?;
            if let Some(output) = output {
                trace!(filter = filter.name(), path = %self.path, "filter applied");
                data = output;
            }
        }
        Ok(data)
    }
}

/// Line-ending conversion for paths with the `text` attribute: CRLF becomes
/// LF on the way into the object database, and LF becomes CRLF on checkout
/// when `eol=crlf` is also set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrlfFilter;

impl Filter for CrlfFilter {
    fn name(&self) -> &str {
        "crlf"
    }

    fn attributes(&self) -> &str {
        "text"
    }

    fn apply(&self, source: &FilterSource<'_>, input: &[u8]) -> Result<Option<Vec<u8>>, FilterError> {
        match source.direction {
            FilterDirection::ToOdb => {
                if input.find(b"\r\n").is_none() {
                    return Ok(None);
                }
                Ok(Some(input.replace(b"\r\n", b"\n")))
            }
            FilterDirection::ToWorktree => {
                if source.attributes.value("eol") != Some("crlf") || !input.contains(&b'\n') {
                    return Ok(None);
                }
                let mut out = Vec::with_capacity(input.len() + input.len() / 32);
                let mut prev = 0u8;
                for &b in input {
                    if b == b'\n' && prev != b'\r' {
                        out.push(b'\r');
                    }
                    out.push(b);
                    prev = b;
                }
                Ok(Some(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Filter for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn attributes(&self) -> &str {
            "filter=upper"
        }
        fn apply(&self, source: &FilterSource<'_>, input: &[u8]) -> Result<Option<Vec<u8>>, FilterError> {
            Ok(match source.direction {
                FilterDirection::ToWorktree => Some(input.to_ascii_uppercase()),
                FilterDirection::ToOdb => Some(input.to_ascii_lowercase()),
            })
        }
    }

    struct Tagger(&'static str);

    impl Filter for Tagger {
        fn name(&self) -> &str {
            self.0
        }
        fn attributes(&self) -> &str {
            ""
        }
        fn apply(&self, _: &FilterSource<'_>, input: &[u8]) -> Result<Option<Vec<u8>>, FilterError> {
            let mut out = input.to_vec();
            out.extend_from_slice(self.0.as_bytes());
            Ok(Some(out))
        }
    }

    #[test]
    fn order_follows_priority_and_direction() {
        let mut registry = FilterRegistry::new();
        registry.register(Tagger("b"), 20).unwrap();
        registry.register(Tagger("a"), 10).unwrap();
        assert_eq!(registry.names(), ["a", "b"]);

        let path = BStr::new("x");
        assert_eq!(registry.apply(path, b">", FilterDirection::ToWorktree).unwrap(), b">ab");
        assert_eq!(registry.apply(path, b">", FilterDirection::ToOdb).unwrap(), b">ba");
    }

    #[test]
    fn attributes_select_filters() {
        let mut registry = FilterRegistry::new();
        registry.register(Upper, 0).unwrap();
        registry.set_attributes(b"*.up filter=upper\n");

        let list = registry.filter_list(BStr::new("a.up"), FilterDirection::ToWorktree);
        assert_eq!(list.names(), ["upper"]);
        assert_eq!(list.apply(b"hi").unwrap(), b"HI");
        assert!(registry
            .filter_list(BStr::new("a.txt"), FilterDirection::ToWorktree)
            .is_empty());
    }

    #[test]
    fn duplicate_and_missing_names() {
        let mut registry = FilterRegistry::new();
        registry.register(Upper, 0).unwrap();
        assert!(matches!(registry.register(Upper, 5), Err(RepoError::FilterExists(_))));
        assert!(registry.unregister("upper").is_ok());
        assert!(matches!(registry.unregister("upper"), Err(RepoError::FilterNotFound(_))));
    }

    #[test]
    fn crlf_round_trip() {
        let mut registry = FilterRegistry::new();
        registry.register(CrlfFilter, 0).unwrap();
        registry.set_attributes(b"*.bat text eol=crlf\n*.sh text\n");

        let bat = BStr::new("run.bat");
        let out = registry.apply(bat, b"a\nb\r\n", FilterDirection::ToWorktree).unwrap();
        assert_eq!(out, b"a\r\nb\r\n");
        let back = registry.apply(bat, &out, FilterDirection::ToOdb).unwrap();
        assert_eq!(back, b"a\nb\n");

        let sh = BStr::new("run.sh");
        assert_eq!(registry.apply(sh, b"a\n", FilterDirection::ToWorktree).unwrap(), b"a\n");
        assert_eq!(registry.is_binary(sh), None);
    }
}
