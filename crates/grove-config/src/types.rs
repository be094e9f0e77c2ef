//! Typed readings of raw values.

use bstr::{BStr, ByteSlice};

use crate::error::ConfigError;

/// git's boolean rules: a bare key is true, `""` is false, then
/// yes/no, on/off, true/false (any case) and integers (non-zero is true).
pub fn parse_bool(key: &str, value: Option<&BStr>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(true);
    };
    let text = value.to_str_lossy();
    let text = text.trim();
    match text.to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "off" => Ok(false),
        "true" | "yes" | "on" => Ok(true),
        other => other.parse::<i64>().map(|n| n != 0).map_err(|_| ConfigError::InvalidBool {
            key: key.to_owned(),
            value: text.to_owned(),
        }),
    }
}

/// Integer with an optional `k`, `m` or `g` suffix (powers of 1024).
pub fn parse_int(key: &str, value: &BStr) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::InvalidInt {
        key: key.to_owned(),
        value: value.to_str_lossy().into_owned(),
    };
    let text = value.to_str().map_err(|_| invalid())?.trim();
    let (digits, scale) = match text.as_bytes().last().map(u8::to_ascii_lowercase) {
        Some(b'k') => (&text[..text.len() - 1], 1i64 << 10),
        Some(b'm') => (&text[..text.len() - 1], 1 << 20),
        Some(b'g') => (&text[..text.len() - 1], 1 << 30),
        _ => (text, 1),
    };
    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(invalid)
}
