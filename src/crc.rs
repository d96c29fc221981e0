// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software CRC kernels matching the accelerator's bit conventions.
//!
//! The device computes CRC-32C (polynomial `0x1EDC6F41`) MSB-first and, by
//! default, reflects the input bytes, the seed and the result. With a zero
//! seed and no bypass flags the value equals the standard (iSCSI) CRC-32C,
//! and feeding the result of one call back as the seed of the next continues
//! the checksum over the concatenated data.
//!
//! DIF guards use CRC16 T10-DIF (polynomial `0x8BB7`, MSB-first, no reflection).

use crate::flags::CrcFlags;

/// CRC-32C (Castagnoli) polynomial, normal form.
pub const CRC32C_POLYNOMIAL: u32 = 0x1EDC_6F41;

/// CRC16 T10-DIF polynomial.
pub const CRC16_T10DIF_POLYNOMIAL: u16 = 0x8BB7;

static CRC32C_TABLE: [u32; 256] = crc32_msb_table(CRC32C_POLYNOMIAL);
static CRC16_TABLE: [u16; 256] = crc16_msb_table(CRC16_T10DIF_POLYNOMIAL);

const fn crc32_msb_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ poly } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc16_msb_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ poly } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Raw MSB-first CRC-32C update without any seed/result transformation.
#[inline]
fn crc32_msb(data: &[u8], mut crc: u32, reflect_data: bool) -> u32 {
    for &byte in data {
        let byte = if reflect_data { byte.reverse_bits() } else { byte };
        crc = (crc << 8) ^ CRC32C_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

/// CRC-32C of `data` as the accelerator computes it.
///
/// # Arguments
///
/// * `data` - Bytes to checksum
/// * `seed` - Initial value; pass a previous result to continue a checksum
/// * `flags` - Reflection bypass flags (descriptor byte 6)
///
/// # Example
///
/// ```
/// use dsa_offload::crc::dsa_crc32;
/// use dsa_offload::flags::CrcFlags;
///
/// assert_eq!(dsa_crc32(b"123456789", 0, CrcFlags::empty()), 0xE306_9283);
/// ```
pub fn dsa_crc32(data: &[u8], seed: u32, flags: CrcFlags) -> u32 {
    let bypass_reflection = flags.contains(CrcFlags::BYPASS_REFLECTION);
    let reflect_data = !flags.contains(CrcFlags::BYPASS_DATA_REFLECTION);

    let mut crc = seed;
    if !bypass_reflection {
        crc = (!crc).reverse_bits();
    }
    crc = crc32_msb(data, crc, reflect_data);
    if !bypass_reflection {
        crc = !crc.reverse_bits();
    }
    crc
}

/// CRC16 T10-DIF of `data` starting from `seed`.
pub fn crc16_t10dif(data: &[u8], seed: u16) -> u16 {
    data.iter().fold(seed, |crc, &byte| {
        (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ byte) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_check_value() {
        assert_eq!(dsa_crc32(b"123456789", 0, CrcFlags::empty()), 0xE306_9283);
    }

    #[test]
    fn test_crc32c_empty_keeps_seed() {
        assert_eq!(dsa_crc32(&[], 0, CrcFlags::empty()), 0);
        assert_eq!(dsa_crc32(&[], 0x1234_5678, CrcFlags::empty()), 0x1234_5678);
    }

    #[test]
    fn test_crc32c_chaining() {
        let whole = dsa_crc32(b"123456789", 0, CrcFlags::empty());
        let first = dsa_crc32(b"12345", 0, CrcFlags::empty());
        assert_eq!(dsa_crc32(b"6789", first, CrcFlags::empty()), whole);
    }

    #[test]
    fn test_crc32c_bypass_flags() {
        assert_eq!(
            dsa_crc32(b"123456789", 0, CrcFlags::BYPASS_REFLECTION),
            0x045F_C71A
        );
        assert_eq!(
            dsa_crc32(b"123456789", 0, CrcFlags::BYPASS_DATA_REFLECTION),
            0xA8F0_22A0
        );
    }

    #[test]
    fn test_crc16_t10dif() {
        assert_eq!(crc16_t10dif(b"123456789", 0), 0xD0DB);
        assert_eq!(crc16_t10dif(&[0u8; 512], 0), 0);
        assert_eq!(crc16_t10dif(&[0u8; 512], 0xFFFF), 0x72BB);
    }
}
