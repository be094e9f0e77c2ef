//! The `"<type> <size>\0"` prefix hashed in front of every object.

use crate::{ObjectError, ObjectType};

/// Split a loose-object header: `(type, content size, header length)`.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("no NUL terminator".into()))?;
    let head = &data[..nul];
    let space = head
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("no space between type and size".into()))?;

    let kind = ObjectType::from_bytes(&head[..space])?;
    let size_text = &head[space + 1..];
    if size_text.is_empty() || !size_text.iter().all(u8::is_ascii_digit) {
        return Err(ObjectError::InvalidHeader(format!(
            "bad size '{}'",
            String::from_utf8_lossy(size_text)
        )));
    }
    let size = std::str::from_utf8(size_text)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ObjectError::InvalidHeader("size out of range".into()))?;
    Ok((kind, size, nul + 1))
}

pub fn write_header(kind: ObjectType, size: usize) -> Vec<u8> {
    format!("{kind} {size}\0").into_bytes()
}
