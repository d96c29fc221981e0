// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Delta record kernels.
//!
//! A delta record is a sequence of 10-byte notes: a little-endian `u16`
//! block index followed by the 8 bytes of the changed block. Blocks are
//! 8 bytes, so a record can describe at most `0x80000` bytes of input.

/// Size of one compared block.
pub const BLOCK_SIZE: usize = 8;

/// Size of one delta note (index + block data).
pub const NOTE_SIZE: usize = 10;

/// Largest input the 16-bit block index can describe.
pub const MAX_INPUT_SIZE: usize = (u16::MAX as usize + 1) * BLOCK_SIZE;

/// Outcome of [`create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaResult {
    /// Both inputs are identical; the record is empty.
    Equal,
    /// The inputs differ; the record describes every difference.
    NotEqual,
    /// The record did not fit; it holds the notes written so far.
    Overflow,
}

impl DeltaResult {
    /// Result byte as reported in a completion record.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Equal => 0,
            Self::NotEqual => 1,
            Self::Overflow => 2,
        }
    }
}

/// Build a delta record that turns `reference` into `target`.
///
/// Both inputs must have the same length, a multiple of [`BLOCK_SIZE`].
/// Notes carry the `target` data. Returns the outcome and the number of
/// bytes written to `record`; no note is written past `record.len()`.
pub fn create(reference: &[u8], target: &[u8], record: &mut [u8]) -> (DeltaResult, usize) {
    debug_assert_eq!(reference.len(), target.len());

    let mut written = 0usize;
    let blocks = reference
        .chunks_exact(BLOCK_SIZE)
        .zip(target.chunks_exact(BLOCK_SIZE))
        .enumerate();

    for (index, (old, new)) in blocks {
        if old == new {
            continue;
        }
        if written + NOTE_SIZE > record.len() {
            return (DeltaResult::Overflow, written);
        }
        let note = &mut record[written..written + NOTE_SIZE];
        note[..2].copy_from_slice(&(index as u16).to_le_bytes());
        note[2..].copy_from_slice(new);
        written += NOTE_SIZE;
    }

    let result = if written == 0 { DeltaResult::Equal } else { DeltaResult::NotEqual };
    (result, written)
}

/// A note of a delta record that could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    /// Block indices must be strictly ascending; carries the offending note.
    OutOfOrder(usize),
    /// The block lies outside the target; carries the offending note.
    OutOfRange(usize),
}

impl ApplyError {
    /// Byte offset of the offending note within the record.
    pub const fn record_offset(self) -> usize {
        match self {
            Self::OutOfOrder(n) | Self::OutOfRange(n) => n * NOTE_SIZE,
        }
    }
}

/// Apply a delta `record` to `target` in place.
///
/// Notes before the offending one have been applied when an error is returned.
pub fn apply(record: &[u8], target: &mut [u8]) -> Result<(), ApplyError> {
    let mut previous: Option<usize> = None;
    for (n, note) in record.chunks_exact(NOTE_SIZE).enumerate() {
        let index = u16::from_le_bytes([note[0], note[1]]) as usize;
        if previous.is_some_and(|p| index <= p) {
            return Err(ApplyError::OutOfOrder(n));
        }
        let start = index * BLOCK_SIZE;
        let block = target
            .get_mut(start..start + BLOCK_SIZE)
            .ok_or(ApplyError::OutOfRange(n))?;
        block.copy_from_slice(&note[2..]);
        previous = Some(index);
    }
    Ok(())
}
