// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Caller-facing flag sets.
//!
//! [`JobFlags`] is the 64-bit flag word of a job. Its low 16 bits are the
//! hardware general flags verbatim (see [`DescriptorFlags`]); bits 16..24
//! select operation-specific behavior and are shifted into descriptor byte 6.
//!
//! [`DescriptorFlags`]: crate::descriptor::DescriptorFlags

use bitflags::bitflags;

bitflags! {
    /// Flags carried by a job record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JobFlags: u64 {
        /// Wait for all previous descriptors of the batch to complete.
        const FENCE = 0x0001;
        /// Enable the overlap check of mem_move; never forwarded to hardware.
        const COPY_ONLY = 0x0020;
        /// Turn a result mismatch into a false-predicate status.
        const CHECK_RESULT = 0x0080;
        /// Cache control (allocate destination writes in the LLC).
        const CACHE_CONTROL = 0x0100;
        /// Traffic class B for reads from the first address.
        const ADDRESS1_TCB = 0x0200;
        /// Traffic class B for the second address.
        const ADDRESS2_TCB = 0x0400;
        /// Traffic class B for the third address.
        const ADDRESS3_TCB = 0x0800;
        /// Writes to the first destination go to durable memory.
        const DST1_DURABLE = 0x8000;

        /// Load the CRC seed from `*crc_checksum` instead of using zero.
        const CRC_READ_SEED = 0x1_0000;
        /// Do not reflect the CRC seed and result.
        const CRC_BYPASS_REFLECTION = 0x2_0000;
        /// Bit 7 of each data byte is the MSB in the CRC computation.
        const CRC_BYPASS_DATA_REFLECTION = 0x4_0000;
        /// Writes to the second dualcast destination go to durable memory.
        const DUALCAST_DST2_DURABLE = 0x1_0000;
    }
}

impl JobFlags {
    /// Mask of bits that map one-to-one onto descriptor general flags.
    pub const GENERAL_MASK: u64 = 0xFFFF;

    /// Hardware general flags, with software-only bits removed.
    #[inline]
    pub const fn general(self) -> u16 {
        ((self.bits() & Self::GENERAL_MASK) & !Self::COPY_ONLY.bits()) as u16
    }

    /// Operation-specific byte (descriptor byte 6).
    #[inline]
    pub const fn op_specific(self) -> u8 {
        ((self.bits() >> 16) & 0xFF) as u8
    }
}

bitflags! {
    /// CRC operation flags in descriptor byte 6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CrcFlags: u8 {
        /// Do not reflect seed and result.
        const BYPASS_REFLECTION = 0x02;
        /// Do not reflect the data bytes.
        const BYPASS_DATA_REFLECTION = 0x04;
    }
}

bitflags! {
    /// DIF configuration flags (`DifConfig::flags`).
    ///
    /// The low byte holds the source flags and the second byte the
    /// destination flags (descriptor bytes 40 and 41). Bits 18 and 19 land in
    /// descriptor byte 42 next to the block-size code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DifFlags: u32 {
        /// Report an error when the all-bits-set condition is detected.
        const SRC_ENABLE_ERROR = 0x00_0001;
        /// Detect all DIF bytes equal to 0xFF in the source.
        const SRC_DETECT_ALL = 0x00_0002;
        /// Skip a block whose application tag is 0xFFFF.
        const SRC_DETECT_APP_TAG = 0x00_0004;
        /// Skip a block whose application and reference tags are all ones.
        const SRC_DETECT_TAGS = 0x00_0008;
        /// Source application tag increments per block.
        const SRC_INC_APP_TAG = 0x00_0010;
        /// Do not check the source guard.
        const SRC_GUARD_CHECK_DISABLE = 0x00_0020;
        /// Do not check the source reference tag.
        const SRC_REF_TAG_CHECK_DISABLE = 0x00_0040;
        /// Source reference tag is fixed instead of incrementing.
        const SRC_FIX_REF_TAG = 0x00_0080;

        /// Copy the application tag from the source.
        const DST_PASS_APP_TAG = 0x00_0800;
        /// Destination application tag increments per block.
        const DST_INC_APP_TAG = 0x00_1000;
        /// Copy the guard from the source.
        const DST_PASS_GUARD = 0x00_2000;
        /// Copy the reference tag from the source.
        const DST_PASS_REF_TAG = 0x00_4000;
        /// Destination reference tag is fixed instead of incrementing.
        const DST_FIX_REF_TAG = 0x00_8000;

        /// Start the guard CRC from 0xFFFF.
        const INVERT_CRC_SEED = 0x04_0000;
        /// Invert the guard CRC result.
        const INVERT_CRC_RESULT = 0x08_0000;
    }
}

impl DifFlags {
    /// Source flags (descriptor byte 40).
    #[inline]
    pub const fn source_byte(self) -> u8 {
        self.bits() as u8
    }

    /// Destination flags (descriptor byte 41).
    #[inline]
    pub const fn destination_byte(self) -> u8 {
        (self.bits() >> 8) as u8
    }

    /// General DIF flags as they appear in byte 42 (block size bits clear).
    #[inline]
    pub const fn general_byte(self) -> u8 {
        ((self.bits() >> 16) & 0x0C) as u8
    }

    /// Reassembles flags from the three descriptor bytes.
    pub const fn from_descriptor(src: u8, dst: u8, general: u8) -> Self {
        Self::from_bits_truncate(src as u32 | (dst as u32) << 8 | ((general & 0x0C) as u32) << 16)
    }
}

bitflags! {
    /// DIF check error bits reported in the `result` byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DifResult: u8 {
        const GUARD_MISMATCH = 0x01;
        const APP_TAG_MISMATCH = 0x02;
        const REF_TAG_MISMATCH = 0x04;
        const ALL_BITS_SET = 0x08;
    }
}

/// Expected-result bits for compare and delta operations.
pub mod expect {
    pub const EQUAL: u8 = 0x01;
    pub const NOT_EQUAL: u8 = 0x02;
    pub const OVERFLOW: u8 = 0x04;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_strips_copy_only() {
        let flags = JobFlags::FENCE | JobFlags::COPY_ONLY | JobFlags::CACHE_CONTROL;
        assert_eq!(flags.general(), 0x0101);
    }

    #[test]
    fn test_op_specific_byte() {
        let flags = JobFlags::CRC_BYPASS_REFLECTION | JobFlags::CRC_BYPASS_DATA_REFLECTION;
        assert_eq!(flags.op_specific(), 0x06);
        assert_eq!(
            CrcFlags::from_bits_truncate(flags.op_specific()),
            CrcFlags::BYPASS_REFLECTION | CrcFlags::BYPASS_DATA_REFLECTION
        );
    }

    #[test]
    fn test_dif_flag_bytes() {
        let flags = DifFlags::SRC_INC_APP_TAG
            | DifFlags::DST_PASS_GUARD
            | DifFlags::INVERT_CRC_SEED
            | DifFlags::INVERT_CRC_RESULT;
        assert_eq!(flags.source_byte(), 0x10);
        assert_eq!(flags.destination_byte(), 0x20);
        assert_eq!(flags.general_byte(), 0x0C);
        assert_eq!(
            DifFlags::from_descriptor(
                flags.source_byte(),
                flags.destination_byte(),
                flags.general_byte() | 0x02
            ),
            flags
        );
    }
}
