//! A `.gitattributes`-style table: lines of `pattern attr1 -attr2 attr3=v`.
//!
//! Later lines override earlier ones. A pattern without a `/` matches the
//! file name at any depth; one with a `/` matches the whole path from the
//! root (a leading `/` only anchors). `binary` is the built-in macro for
//! `-diff -merge -text`.

use std::collections::BTreeMap;

use bstr::{BStr, ByteSlice};
use grove_utils::wildmatch::Wildmatch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// `attr`
    Set,
    /// `-attr`
    Unset,
    /// `attr=value`
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Assignment {
    Assign(AttrValue),
    /// `!attr`: back to unspecified.
    Clear,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Wildmatch,
    /// Match against the basename instead of the full path.
    basename: bool,
    assignments: Vec<(String, Assignment)>,
}

impl Rule {
    fn matches(&self, path: &BStr) -> bool {
        if self.basename {
            let name = path.rsplit_str("/").next().unwrap_or(path.as_bytes());
            self.pattern.matches(name.as_bstr())
        } else {
            self.pattern.matches(path)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    rules: Vec<Rule>,
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &[u8]) -> Self {
        let mut table = Self::new();
        table.add_lines(text);
        table
    }

    /// Append the rules in `text`. Blank lines, comments and directory
    /// patterns (ending in `/`) are skipped.
    pub fn add_lines(&mut self, text: &[u8]) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(b"#") {
                continue;
            }
            let mut fields = line.fields();
            let Some(pattern) = fields.next() else {
                continue;
            };
            if pattern.ends_with(b"/") {
                continue;
            }
            let (pattern, anchored) = match pattern.strip_prefix(b"/") {
                Some(rest) => (rest, true),
                None => (pattern, false),
            };

            let mut assignments = Vec::new();
            for field in fields {
                let field = field.to_str_lossy();
                expand(&field, &mut assignments);
            }
            self.rules.push(Rule {
                pattern: Wildmatch::new(pattern),
                basename: !anchored && !pattern.contains(&b'/'),
                assignments,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every attribute specified for `path`.
    pub fn lookup(&self, path: &BStr) -> Attributes {
        let mut values = BTreeMap::new();
        for rule in self.rules.iter().filter(|r| r.matches(path)) {
            for (name, assignment) in &rule.assignments {
                match assignment {
                    Assignment::Assign(value) => {
                        values.insert(name.clone(), value.clone());
                    }
                    Assignment::Clear => {
                        values.remove(name);
                    }
                }
            }
        }
        Attributes { values }
    }
}

fn expand(field: &str, out: &mut Vec<(String, Assignment)>) {
    let (name, assignment) = if let Some(name) = field.strip_prefix('-') {
        (name, Assignment::Assign(AttrValue::Unset))
    } else if let Some(name) = field.strip_prefix('!') {
        (name, Assignment::Clear)
    } else if let Some((name, value)) = field.split_once('=') {
        (name, Assignment::Assign(AttrValue::Value(value.to_owned())))
    } else {
        (field, Assignment::Assign(AttrValue::Set))
    };
    if name.is_empty() {
        return;
    }
    if name == "binary" && assignment == Assignment::Assign(AttrValue::Set) {
        for implied in ["diff", "merge", "text"] {
            out.push((implied.to_owned(), Assignment::Assign(AttrValue::Unset)));
        }
    }
    out.push((name.to_owned(), assignment));
}

/// The attributes in effect for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    values: BTreeMap<String, AttrValue>,
}

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// Set, or set to a value.
    pub fn is_set(&self, name: &str) -> bool {
        matches!(self.get(name), Some(AttrValue::Set | AttrValue::Value(_)))
    }

    pub fn is_unset(&self, name: &str) -> bool {
        matches!(self.get(name), Some(AttrValue::Unset))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(AttrValue::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether one filter attribute expression holds: `name`, `-name`
    /// or `name=value`.
    pub fn satisfies(&self, expression: &str) -> bool {
        if let Some(name) = expression.strip_prefix('-') {
            self.is_unset(name)
        } else if let Some((name, value)) = expression.split_once('=') {
            self.value(name) == Some(value)
        } else {
            self.is_set(expression)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# comment
*.txt   text
*.png   binary
docs/*.md  -text linguist=prose
/top.cfg  eol=crlf
build/  ignored
*.txt   !text
notes.txt text
";

    #[test]
    fn later_lines_win() {
        let table = AttributeTable::parse(TABLE.as_bytes());
        assert_eq!(table.len(), 6);
        let readme = table.lookup("src/readme.txt".into());
        assert_eq!(readme.get("text"), None);
        let notes = table.lookup("a/notes.txt".into());
        assert!(notes.is_set("text"));
    }

    #[test]
    fn binary_macro_expands() {
        let table = AttributeTable::parse(TABLE.as_bytes());
        let attrs = table.lookup("img/logo.png".into());
        assert!(attrs.is_set("binary"));
        assert!(attrs.is_unset("diff"));
        assert!(attrs.is_unset("text"));
        assert!(attrs.satisfies("-merge"));
    }

    #[test]
    fn slash_patterns_are_anchored() {
        let table = AttributeTable::parse(TABLE.as_bytes());
        assert!(table.lookup("docs/guide.md".into()).is_unset("text"));
        assert!(table.lookup("x/docs/guide.md".into()).is_empty());
        assert_eq!(table.lookup("top.cfg".into()).value("eol"), Some("crlf"));
        assert!(table.lookup("sub/top.cfg".into()).is_empty());
        assert!(table.lookup("docs/guide.md".into()).satisfies("linguist=prose"));
    }
}
