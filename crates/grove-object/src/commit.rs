use bstr::{BStr, BString, ByteSlice};
use grove_hash::ObjectId;
use grove_utils::Signature;

use crate::fields::{write_field, Fields};
use crate::ObjectError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// Empty for a root commit, two or more for a merge.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub encoding: Option<BString>,
    /// `gpgsig` payload without the continuation indentation.
    pub signature: Option<BString>,
    /// Any other headers (`mergetag`, ...), in order, for faithful re-encoding.
    pub extra_headers: Vec<(BString, BString)>,
    pub message: BString,
}

fn hex_field(value: &[u8], what: &'static str) -> Result<ObjectId, ObjectError> {
    let text = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("{what} id is not ASCII")))?;
    Ok(ObjectId::from_hex(text)?)
}

impl Commit {
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut encoding = None;
        let mut signature = None;
        let mut extra_headers = Vec::new();

        let mut fields = Fields::new(content);
        for (key, value) in fields.by_ref() {
            match key {
                b"tree" => tree = Some(hex_field(&value, "tree")?),
                b"parent" => parents.push(hex_field(&value, "parent")?),
                b"author" => author = Some(Signature::parse(value.as_bstr())?),
                b"committer" => committer = Some(Signature::parse(value.as_bstr())?),
                b"encoding" => encoding = Some(BString::from(value)),
                b"gpgsig" => signature = Some(BString::from(value)),
                _ => extra_headers.push((BString::from(key), BString::from(value))),
            }
        }
        let message = BString::from(&content[fields.message_start()..]);

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField("tree"))?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField("author"))?,
            committer: committer.ok_or(ObjectError::MissingCommitField("committer"))?,
            encoding,
            signature,
            extra_headers,
            message,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.message.len());
        write_field(&mut out, b"tree", self.tree.to_hex().as_bytes());
        for p in &self.parents {
            write_field(&mut out, b"parent", p.to_hex().as_bytes());
        }
        write_field(&mut out, b"author", &self.author.to_bytes());
        write_field(&mut out, b"committer", &self.committer.to_bytes());
        if let Some(enc) = &self.encoding {
            write_field(&mut out, b"encoding", enc);
        }
        if let Some(sig) = &self.signature {
            write_field(&mut out, b"gpgsig", sig);
        }
        for (k, v) in &self.extra_headers {
            write_field(&mut out, k, v);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First paragraph of the message, with its lines joined by spaces.
    pub fn summary(&self) -> BString {
        let msg = self.message.trim_start_with(|c| c == '\n');
        let mut out = BString::default();
        for line in msg.lines() {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if !out.is_empty() {
                out.push(b' ');
            }
            out.extend_from_slice(line);
        }
        out
    }

    /// Everything after the first blank line, trimmed; `None` if empty.
    pub fn body(&self) -> Option<&BStr> {
        let msg = self.message.as_bytes();
        let start = msg.find(b"\n\n")?;
        let body = msg[start + 2..].trim();
        (!body.is_empty()).then(|| body.as_bstr())
    }
}
