//! Common utilities shared by every decoder in the crate.
//!
//! - [`BitReader`]: sequential, resumable bit-granularity reads
//! - [`Crc32Mpeg2`]: MPEG-2 CRC-32 for PSI/SI section validation

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
