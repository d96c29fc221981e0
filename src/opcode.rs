// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! DSA operation codes.
//!
//! These opcodes are defined in the Intel DSA Architecture Specification
//! and match the Linux kernel's `include/uapi/linux/idxd.h` definitions.

/// DSA operations.
///
/// Each operation has a unique 8-bit opcode that is placed in byte 7 of the
/// descriptor. The same enum selects the operation of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Operation {
    /// No operation - used for testing/synchronization.
    #[default]
    Nop = 0x00,

    /// Batch operation - submit multiple descriptors at once.
    Batch = 0x01,

    /// Drain - wait for all previous operations to complete.
    Drain = 0x02,

    /// Memory move (copy) operation.
    MemMove = 0x03,

    /// Memory fill operation.
    Fill = 0x04,

    /// Memory compare operation.
    Compare = 0x05,

    /// Compare against an 8-byte pattern.
    ComparePattern = 0x06,

    /// Create delta record between two buffers.
    CreateDelta = 0x07,

    /// Apply delta record to a buffer.
    ApplyDelta = 0x08,

    /// Dual-cast memory copy (copy to two destinations).
    Dualcast = 0x09,

    /// CRC32C generation.
    Crc = 0x10,

    /// Copy with CRC32C generation.
    CopyCrc = 0x11,

    /// DIF (Data Integrity Field) check.
    DifCheck = 0x12,

    /// DIF insert.
    DifInsert = 0x13,

    /// DIF strip.
    DifStrip = 0x14,

    /// DIF update.
    DifUpdate = 0x15,

    /// Cache flush.
    CacheFlush = 0x20,
}

impl Operation {
    /// Returns the opcode as a u8 value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a raw opcode byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Nop,
            0x01 => Self::Batch,
            0x02 => Self::Drain,
            0x03 => Self::MemMove,
            0x04 => Self::Fill,
            0x05 => Self::Compare,
            0x06 => Self::ComparePattern,
            0x07 => Self::CreateDelta,
            0x08 => Self::ApplyDelta,
            0x09 => Self::Dualcast,
            0x10 => Self::Crc,
            0x11 => Self::CopyCrc,
            0x12 => Self::DifCheck,
            0x13 => Self::DifInsert,
            0x14 => Self::DifStrip,
            0x15 => Self::DifUpdate,
            0x20 => Self::CacheFlush,
            _ => return None,
        })
    }

    /// Operations that may appear inside a batch descriptor list.
    #[inline]
    pub const fn is_batchable(self) -> bool {
        !matches!(self, Self::Batch | Self::Drain)
    }

    /// Block-on-fault is meaningless for operations that touch no user memory.
    #[inline]
    pub const fn accepts_block_on_fault(self) -> bool {
        !matches!(self, Self::Nop | Self::Batch | Self::Drain)
    }

    /// Returns a human-readable name for the opcode.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Batch => "BATCH",
            Self::Drain => "DRAIN",
            Self::MemMove => "MEMMOVE",
            Self::Fill => "FILL",
            Self::Compare => "COMPARE",
            Self::ComparePattern => "COMPARE_PATTERN",
            Self::CreateDelta => "CREATE_DELTA",
            Self::ApplyDelta => "APPLY_DELTA",
            Self::Dualcast => "DUALCAST",
            Self::Crc => "CRC",
            Self::CopyCrc => "COPY_CRC",
            Self::DifCheck => "DIF_CHECK",
            Self::DifInsert => "DIF_INSERT",
            Self::DifStrip => "DIF_STRIP",
            Self::DifUpdate => "DIF_UPDATE",
            Self::CacheFlush => "CACHE_FLUSH",
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(value)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(Operation::Nop.as_u8(), 0x00);
        assert_eq!(Operation::Batch.as_u8(), 0x01);
        assert_eq!(Operation::Drain.as_u8(), 0x02);
        assert_eq!(Operation::MemMove.as_u8(), 0x03);
        assert_eq!(Operation::Fill.as_u8(), 0x04);
        assert_eq!(Operation::Compare.as_u8(), 0x05);
        assert_eq!(Operation::Dualcast.as_u8(), 0x09);
        assert_eq!(Operation::Crc.as_u8(), 0x10);
        assert_eq!(Operation::CopyCrc.as_u8(), 0x11);
        assert_eq!(Operation::DifUpdate.as_u8(), 0x15);
        assert_eq!(Operation::CacheFlush.as_u8(), 0x20);
    }

    #[test]
    fn test_opcode_decode() {
        for raw in 0u8..=0xFF {
            if let Some(op) = Operation::from_u8(raw) {
                assert_eq!(op.as_u8(), raw);
            }
        }
        assert_eq!(Operation::try_from(0x0A), Err(0x0A));
        assert_eq!(Operation::try_from(0x14), Ok(Operation::DifStrip));
    }

    #[test]
    fn test_batchable() {
        assert!(!Operation::Batch.is_batchable());
        assert!(!Operation::Drain.is_batchable());
        assert!(Operation::MemMove.is_batchable());
        assert!(!Operation::Nop.accepts_block_on_fault());
        assert!(Operation::Crc.accepts_block_on_fault());
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(format!("{}", Operation::Crc), "CRC (0x10)");
        assert_eq!(format!("{}", Operation::MemMove), "MEMMOVE (0x03)");
    }
}
