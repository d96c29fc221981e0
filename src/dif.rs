// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! T10 Data Integrity Field kernels.
//!
//! Protected data is a sequence of blocks, each followed by an 8-byte DIF:
//! a CRC16 guard, a 16-bit application tag and a 32-bit reference tag, all
//! stored big-endian. Offsets reported on failure are byte offsets of the
//! failing block in the protected (source) stream.

use crate::crc::crc16_t10dif;
use crate::descriptor::DifTags;
use crate::flags::{DifFlags, DifResult};

/// Size of one data integrity field.
pub const DIF_SIZE: usize = 8;

/// Size of the data blocks protected by DIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DifBlockSize {
    #[default]
    B512 = 0,
    B520 = 1,
    B4096 = 2,
    B4104 = 3,
}

impl DifBlockSize {
    /// Block size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::B512 => 512,
            Self::B520 => 520,
            Self::B4096 => 4096,
            Self::B4104 => 4104,
        }
    }

    /// Two-bit code stored in descriptor byte 42.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode the two-bit code; only the low two bits are looked at.
    pub const fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0 => Self::B512,
            1 => Self::B520,
            2 => Self::B4096,
            _ => Self::B4104,
        }
    }

    /// Size of a block plus its DIF.
    pub const fn protected(self) -> usize {
        self.bytes() + DIF_SIZE
    }
}

/// Parameters of one DIF operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DifParams {
    pub flags: DifFlags,
    pub block_size: DifBlockSize,
    /// Tag seeds the source is checked against.
    pub src: DifTags,
    /// Tag seeds written to the destination.
    pub dst: DifTags,
}

/// A block failed its check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifError {
    /// Offset of the failing block in the source stream.
    pub offset: usize,
    /// Mismatch bits.
    pub result: DifResult,
}

#[derive(Debug, Clone, Copy)]
struct Field {
    guard: u16,
    app: u16,
    reference: u32,
}

impl Field {
    fn read(bytes: &[u8]) -> Self {
        Self {
            guard: u16::from_be_bytes([bytes[0], bytes[1]]),
            app: u16::from_be_bytes([bytes[2], bytes[3]]),
            reference: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Running tag generator for one side of an operation.
#[derive(Debug, Clone, Copy)]
struct TagSequence {
    app: u16,
    reference: u32,
    keep: u16,
    app_step: u16,
    ref_step: u32,
}

impl TagSequence {
    fn source(params: &DifParams) -> Self {
        Self {
            app: params.src.app_tag,
            reference: params.src.ref_tag,
            keep: !params.src.app_tag_mask,
            app_step: params.flags.contains(DifFlags::SRC_INC_APP_TAG) as u16,
            ref_step: (!params.flags.contains(DifFlags::SRC_FIX_REF_TAG)) as u32,
        }
    }

    fn destination(params: &DifParams) -> Self {
        Self {
            app: params.dst.app_tag,
            reference: params.dst.ref_tag,
            keep: !params.dst.app_tag_mask,
            app_step: params.flags.contains(DifFlags::DST_INC_APP_TAG) as u16,
            ref_step: (!params.flags.contains(DifFlags::DST_FIX_REF_TAG)) as u32,
        }
    }

    fn advance(&mut self) {
        self.app = self.app.wrapping_add(self.app_step);
        self.reference = self.reference.wrapping_add(self.ref_step);
    }

    fn tags(&self) -> DifTags {
        DifTags {
            ref_tag: self.reference,
            app_tag_mask: !self.keep,
            app_tag: self.app,
        }
    }
}

fn guard(flags: DifFlags, block: &[u8]) -> u16 {
    let seed = if flags.contains(DifFlags::INVERT_CRC_SEED) { 0xFFFF } else { 0 };
    let crc = crc16_t10dif(block, seed);
    if flags.contains(DifFlags::INVERT_CRC_RESULT) {
        !crc
    } else {
        crc
    }
}

/// Check every block of `src`.
///
/// `src.len()` must be a multiple of the protected block size. On success
/// the returned tags are the source tags that would follow the last block.
pub fn check(src: &[u8], params: &DifParams) -> Result<DifTags, DifError> {
    let flags = params.flags;
    let block_size = params.block_size.bytes();
    let step = params.block_size.protected();
    let mut tags = TagSequence::source(params);

    for (index, chunk) in src.chunks_exact(step).enumerate() {
        let (data, raw) = chunk.split_at(block_size);
        let field = Field::read(raw);
        let offset = index * step;

        if flags.contains(DifFlags::SRC_DETECT_ALL | DifFlags::SRC_ENABLE_ERROR)
            && raw.iter().all(|&b| b == 0xFF)
        {
            return Err(DifError { offset, result: DifResult::ALL_BITS_SET });
        }

        let tags_all_ones = flags.contains(DifFlags::SRC_DETECT_TAGS)
            && field.app == 0xFFFF
            && field.reference == 0xFFFF_FFFF;
        let app_all_ones = flags.contains(DifFlags::SRC_DETECT_APP_TAG) && field.app == 0xFFFF;

        if !tags_all_ones && !app_all_ones {
            let mut result = DifResult::empty();
            if !flags.contains(DifFlags::SRC_GUARD_CHECK_DISABLE) && guard(flags, data) != field.guard {
                result |= DifResult::GUARD_MISMATCH;
            }
            if !flags.contains(DifFlags::SRC_REF_TAG_CHECK_DISABLE) && tags.reference != field.reference {
                result |= DifResult::REF_TAG_MISMATCH;
            }
            if tags.keep != 0 && (tags.app & tags.keep) != (field.app & tags.keep) {
                result |= DifResult::APP_TAG_MISMATCH;
            }
            if !result.is_empty() {
                return Err(DifError { offset, result });
            }
        }

        tags.advance();
    }

    Ok(tags.tags())
}

/// Copy `src` into `dst`, appending a freshly computed DIF to every block.
///
/// `src.len()` must be a multiple of the block size and `dst` must hold
/// one protected block per source block. Returns the destination tags that
/// would follow the last block.
pub fn insert(src: &[u8], dst: &mut [u8], params: &DifParams) -> DifTags {
    let block_size = params.block_size.bytes();
    let mut tags = TagSequence::destination(params);

    for (data, out) in src
        .chunks_exact(block_size)
        .zip(dst.chunks_exact_mut(params.block_size.protected()))
    {
        out[..block_size].copy_from_slice(data);
        write_field(&mut out[block_size..], guard(params.flags, data), &tags);
        tags.advance();
    }

    tags.tags()
}

/// Check `src` and copy its data blocks to `dst` without the DIF.
pub fn strip(src: &[u8], dst: &mut [u8], params: &DifParams) -> Result<DifTags, DifError> {
    let source_tags = check(src, params)?;
    let block_size = params.block_size.bytes();

    for (chunk, out) in src
        .chunks_exact(params.block_size.protected())
        .zip(dst.chunks_exact_mut(block_size))
    {
        out.copy_from_slice(&chunk[..block_size]);
    }

    Ok(source_tags)
}

/// Check `src`, copy it to `dst` and regenerate the destination DIF.
///
/// Fields whose `DST_PASS_*` flag is set keep the source value.
pub fn update(src: &[u8], dst: &mut [u8], params: &DifParams) -> Result<(DifTags, DifTags), DifError> {
    let source_tags = check(src, params)?;
    let flags = params.flags;
    let block_size = params.block_size.bytes();
    let step = params.block_size.protected();
    let mut tags = TagSequence::destination(params);

    for (chunk, out) in src.chunks_exact(step).zip(dst.chunks_exact_mut(step)) {
        out.copy_from_slice(chunk);
        let (data, field) = out.split_at_mut(block_size);
        if !flags.contains(DifFlags::DST_PASS_GUARD) {
            field[0..2].copy_from_slice(&guard(flags, data).to_be_bytes());
        }
        if !flags.contains(DifFlags::DST_PASS_APP_TAG) {
            field[2..4].copy_from_slice(&(tags.app & tags.keep).to_be_bytes());
        }
        if !flags.contains(DifFlags::DST_PASS_REF_TAG) {
            field[4..8].copy_from_slice(&tags.reference.to_be_bytes());
        }
        tags.advance();
    }

    Ok((source_tags, tags.tags()))
}

fn write_field(field: &mut [u8], guard: u16, tags: &TagSequence) {
    field[0..2].copy_from_slice(&guard.to_be_bytes());
    field[2..4].copy_from_slice(&(tags.app & tags.keep).to_be_bytes());
    field[4..8].copy_from_slice(&tags.reference.to_be_bytes());
}
