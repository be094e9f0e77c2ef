//! Binary detection: an explicit attribute wins, otherwise a NUL byte in
//! the first `max_binary_scan` bytes marks the content binary.

use bstr::BStr;
use grove_repository::FilterRegistry;

/// Bytes scanned for a NUL unless the options say otherwise.
pub const DEFAULT_BINARY_SCAN: usize = 8000;

pub fn looks_binary(data: &[u8], max_scan: usize) -> bool {
    data[..data.len().min(max_scan)].contains(&0)
}

/// Whether a file with these contents is shown as binary.
pub(crate) fn is_binary(
    filters: Option<&FilterRegistry>,
    path: &BStr,
    sides: [&[u8]; 2],
    max_scan: usize,
) -> bool {
    if let Some(declared) = filters.and_then(|f| f.is_binary(path)) {
        return declared;
    }
    sides.iter().any(|data| looks_binary(data, max_scan))
}
