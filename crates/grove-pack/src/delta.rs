//! Git's copy/insert delta format.
//!
//! A delta is `<base size varint><result size varint>` followed by
//! instructions. A byte with the high bit set copies a range of the base;
//! its low seven bits select which offset (bits 0-3) and size (bits 4-6)
//! bytes follow. A byte `1..=127` inserts that many literal bytes.

use crate::PackError;

fn read_size(data: &[u8], pos: &mut usize) -> Result<u64, PackError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let b = *data
            .get(*pos)
            .ok_or_else(|| PackError::InvalidDelta("size varint truncated".into()))?;
        *pos += 1;
        if shift > 63 {
            return Err(PackError::InvalidDelta("size varint too long".into()));
        }
        value |= u64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
}

fn write_size(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// `(base size, result size)` from the front of a delta.
pub fn delta_sizes(delta: &[u8]) -> Result<(u64, u64), PackError> {
    let mut pos = 0;
    let base = read_size(delta, &mut pos)?;
    let result = read_size(delta, &mut pos)?;
    Ok((base, result))
}

/// Reconstruct the target of `delta` from `base`.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut pos = 0;
    let base_size = read_size(delta, &mut pos)?;
    let result_size = read_size(delta, &mut pos)?;
    if base_size != base.len() as u64 {
        return Err(PackError::InvalidDelta(format!(
            "delta expects a {base_size}-byte base, got {}",
            base.len()
        )));
    }
    let result_size = usize::try_from(result_size)
        .map_err(|_| PackError::InvalidDelta("result too large".into()))?;
    let mut out = Vec::with_capacity(result_size);

    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;
        if op & 0x80 != 0 {
            // Offset bytes for bits 0-3, then size bytes for bits 4-6.
            let mut fields = [0u64; 2];
            for (bit, shift_base) in (0u32..7).map(|i| (i, if i < 4 { i * 8 } else { (i - 4) * 8 })) {
                if op & (1 << bit) == 0 {
                    continue;
                }
                let b = *delta
                    .get(pos)
                    .ok_or_else(|| PackError::InvalidDelta("copy operand truncated".into()))?;
                pos += 1;
                fields[usize::from(bit >= 4)] |= u64::from(b) << shift_base;
            }
            let [offset, mut size] = fields;
            if size == 0 {
                size = 0x10000;
            }
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            let end = start.saturating_add(size as usize);
            let chunk = base.get(start..end).ok_or_else(|| {
                PackError::InvalidDelta(format!(
                    "copy of {size} bytes at {offset} exceeds {}-byte base",
                    base.len()
                ))
            })?;
            out.extend_from_slice(chunk);
        } else if op != 0 {
            let n = usize::from(op);
            let chunk = delta
                .get(pos..pos + n)
                .ok_or_else(|| PackError::InvalidDelta("insert data truncated".into()))?;
            out.extend_from_slice(chunk);
            pos += n;
        } else {
            return Err(PackError::InvalidDelta("reserved opcode 0".into()));
        }
        if out.len() > result_size {
            return Err(PackError::InvalidDelta("result overruns declared size".into()));
        }
    }

    if out.len() != result_size {
        return Err(PackError::InvalidDelta(format!(
            "delta declared {result_size} bytes, produced {}",
            out.len()
        )));
    }
    Ok(out)
}

/// Builds a delta instruction stream by hand.
#[derive(Debug, Clone)]
pub struct DeltaBuilder {
    base_size: u64,
    result_size: u64,
    ops: Vec<u8>,
}

impl DeltaBuilder {
    pub fn new(base_size: usize) -> Self {
        Self {
            base_size: base_size as u64,
            result_size: 0,
            ops: Vec::new(),
        }
    }

    /// Copy `len` bytes of the base starting at `offset`.
    pub fn copy(&mut self, offset: u32, len: u32) -> &mut Self {
        let mut remaining = len;
        let mut at = offset;
        while remaining > 0 {
            let chunk = remaining.min(0xff_ffff);
            let mut op = 0x80u8;
            let mut operands = Vec::with_capacity(7);
            for (i, byte) in at.to_le_bytes().into_iter().enumerate() {
                if byte != 0 {
                    op |= 1 << i;
                    operands.push(byte);
                }
            }
            for (i, byte) in chunk.to_le_bytes().into_iter().take(3).enumerate() {
                if byte != 0 {
                    op |= 1 << (4 + i);
                    operands.push(byte);
                }
            }
            self.ops.push(op);
            self.ops.extend_from_slice(&operands);
            self.result_size += u64::from(chunk);
            at = at.wrapping_add(chunk);
            remaining -= chunk;
        }
        self
    }

    /// Insert literal bytes.
    pub fn insert(&mut self, data: &[u8]) -> &mut Self {
        for chunk in data.chunks(0x7f) {
            self.ops.push(chunk.len() as u8);
            self.ops.extend_from_slice(chunk);
        }
        self.result_size += data.len() as u64;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ops.len() + 20);
        write_size(&mut out, self.base_size);
        write_size(&mut out, self.result_size);
        out.extend_from_slice(&self.ops);
        out
    }
}
