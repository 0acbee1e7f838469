//! Fourcc helpers for formats reported by decoders.
//!
//! Decoders hand out raw fourcc codes, some of which predate (or never made it into)
//! the kernel's `drm_fourcc.h`. [`normalize`] maps those onto the code the display
//! engine expects, and [`FourccName`] prints any code the way the kernel does.
//!
//! ```
//! # use kms_overlay::backend::allocator::format::{normalize, FourccName, NV12_10, NV15};
//! assert_eq!(normalize(NV12_10), NV15);
//! assert_eq!(FourccName(NV15).to_string(), "NV15");
//! ```

use std::fmt;

/// Build a fourcc code out of its four characters
pub const fn fourcc_code(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24
}

/// Flag marking a big-endian variant of a format
pub const BIG_ENDIAN: u32 = 1 << 31;

/// 2x2 subsampled Cr:Cb plane, 10 bit per component, as reported by Rockchip decoders
pub const NV12_10: u32 = fourcc_code(b'N', b'A', b'1', b'2');

/// 2x2 subsampled Cr:Cb plane, 10 bit per component, tightly packed
pub const NV15: u32 = fourcc_code(b'N', b'V', b'1', b'5');

/// Map a decoder fourcc onto the code the display engine understands
pub fn normalize(code: u32) -> u32 {
    match code {
        NV12_10 => NV15,
        code => code,
    }
}

/// Display wrapper printing a raw fourcc code as its four characters
///
/// Big-endian variants get a `-BE` suffix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourccName(pub u32);

impl fmt::Display for FourccName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for shift in [0, 8, 16, 24] {
            let c = ((self.0 >> shift) & 0x7f) as u8;
            write!(f, "{}", c as char)?;
        }
        if self.0 & BIG_ENDIAN != 0 {
            f.write_str("-BE")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourccName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self, self.0)
    }
}
