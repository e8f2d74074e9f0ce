use crate::error::{Result, TsError};

/// A bit-level reader for parsing binary data streams.
///
/// Reads are big-endian, most-significant-bit first, matching the wire
/// order of every format this crate parses. The reader is `Clone`: a
/// sub-parser can copy the cursor, read ahead speculatively, and the
/// caller rolls back by simply discarding the copy.
///
/// Running out of data yields [`TsError::Truncated`]; callers treat it
/// as "malformed/truncated input" scoped to the current sub-unit.
///
/// Example:
/// ```
/// use tsprobe::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
#[derive(Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader over a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Creates a BitReader starting at a byte offset into `data`.
    pub fn at(data: &'a [u8], byte_offset: usize) -> Self {
        BitReader {
            data,
            byte_offset,
            bit_offset: 0,
        }
    }

    fn truncated(&self, needed: usize) -> TsError {
        TsError::Truncated {
            needed,
            remaining: self.remaining_bits(),
        }
    }

    /// Reads a single bit. Returns true for 1, false for 0.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(self.truncated(1));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits (n <= 64) and returns them as a number.
    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(TsError::InvalidData("too many bits requested".into()));
        }
        if (n as usize) > self.remaining_bits() {
            return Err(self.truncated(n as usize));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | (self.read_bit()? as u64);
        }
        Ok(value)
    }

    /// Reads n bits without consuming them.
    pub fn peek_bits(&self, n: u32) -> Result<u64> {
        let mut probe = self.clone();
        probe.read_bits(n)
    }

    /// Reads an unsigned exponential Golomb code (ue(v)) as specified
    /// in H.264/H.265.
    ///
    /// Format:
    /// 1. M leading zeros followed by a 1
    /// 2. M more INFO bits
    /// 3. Value = 2^M + INFO - 1
    pub fn read_golomb(&mut self) -> Result<u64> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 63 {
                return Err(TsError::InvalidData("invalid Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok((1u64 << leading_zeros) + info - 1)
    }

    /// Reads a signed exponential Golomb code (se(v)).
    ///
    /// The mapping from unsigned (k) to signed is:
    /// - k=0 -> 0
    /// - For k>0: magnitude = (k+1)>>1, odd k positive, even k negative.
    pub fn read_signed_golomb(&mut self) -> Result<i64> {
        let k = self.read_golomb()?;
        if k == 0 {
            return Ok(0);
        }

        let magnitude = ((k + 1) >> 1) as i64;
        let sign = if k & 1 == 1 { 1 } else { -1 };
        Ok(sign * magnitude)
    }

    /// Skips n bits.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.remaining_bits() {
            return Err(self.truncated(n as usize));
        }
        let total = self.bit_offset as usize + n as usize;
        self.byte_offset += total / 8;
        self.bit_offset = (total % 8) as u8;
        Ok(())
    }

    /// Aligns reader to the next byte boundary.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// True when the cursor sits on a byte boundary.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// Returns the number of bits left to read.
    pub fn remaining_bits(&self) -> usize {
        if self.byte_offset >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }

    /// Current position in bits from the start of the slice.
    pub fn position_bits(&self) -> usize {
        self.byte_offset * 8 + self.bit_offset as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // Cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        // Reading zero bits
        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        // 33..64 bit reads
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x80];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(33).unwrap(), 0x1_FFFF_FFFF);

        // Error past 64 bits
        let data = [0xFF; 16];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(65).is_err());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let data = [0b11001010];
        let reader = BitReader::new(&data);
        assert_eq!(reader.peek_bits(4).unwrap(), 0b1100);
        assert_eq!(reader.peek_bits(4).unwrap(), 0b1100);
        assert_eq!(reader.remaining_bits(), 8);
    }

    #[test]
    fn test_cursor_copy_rollback() {
        let data = [0xAB, 0xCD];
        let mut reader = BitReader::new(&data);
        reader.read_bits(4).unwrap();

        let mut speculative = reader.clone();
        speculative.read_bits(8).unwrap();

        // Original cursor unaffected by the speculative read.
        assert_eq!(reader.read_bits(4).unwrap(), 0xB);
    }

    #[test]
    fn test_truncated_reports_counts() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        match reader.read_bits(8) {
            Err(TsError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 8);
                assert_eq!(remaining, 5);
            }
            other => panic!("expected Truncated, got {:?}", other.map(|_| ())),
        }
        // Failed read must not consume anything.
        assert_eq!(reader.remaining_bits(), 5);
    }

    #[test]
    fn test_read_golomb() {
        // Known patterns from the H.264 spec
        let test_cases = [
            ([0b10000000], 0, "1"),
            ([0b01000000], 1, "010"),
            ([0b01100000], 2, "011"),
            ([0b00100000], 3, "00100"),
            ([0b00110000], 5, "00110"),
            ([0b00101000], 4, "00101"),
            ([0b00111000], 6, "00111"),
            ([0b00010000], 7, "0001000"),
            ([0b00010010], 8, "0001001"),
        ];

        for (input, expected, pattern) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            let result = reader.read_golomb().unwrap();
            assert_eq!(result, *expected, "Failed for pattern {}", pattern);
        }

        // All zeros is not a valid code
        let data = [0x00];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_golomb().is_err());
    }

    #[test]
    fn test_signed_golomb() {
        let test_cases: [([u8; 1], i64); 5] = [
            ([0b10000000], 0),
            ([0b01000000], 1),
            ([0b01100000], -1),
            ([0b00100000], 2),
            ([0b00101000], 2),
        ];

        for (input, expected) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_signed_golomb().unwrap(), *expected);
        }
    }

    #[test]
    fn test_skip_and_alignment() {
        let data = [0xFF, 0x00, 0xAA];
        let mut reader = BitReader::new(&data);
        reader.skip_bits(3).unwrap();
        assert!(!reader.is_byte_aligned());
        reader.align_byte();
        assert!(reader.is_byte_aligned());
        assert_eq!(reader.remaining_bits(), 16);
        reader.skip_bits(9).unwrap();
        assert_eq!(reader.read_bits(7).unwrap(), 0b0101010);
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        if data.is_empty() {
            return true;
        }

        let n = (n % 64) as u32;
        let mut reader = BitReader::new(&data);

        match reader.read_bits(n) {
            Ok(result) => {
                let mut expected = 0u64;
                for i in 0..n as usize {
                    let byte_idx = i / 8;
                    let bit_idx = 7 - (i % 8);
                    if byte_idx >= data.len() {
                        return true;
                    }
                    let bit = (data[byte_idx] >> bit_idx) & 1;
                    expected = (expected << 1) | bit as u64;
                }
                result == expected
            }
            Err(_) => (n as usize) > data.len() * 8,
        }
    }

    #[quickcheck]
    fn prop_skip_equals_read(data: Vec<u8>, n: u8) -> bool {
        let n = (n % 64) as u32;
        let mut a = BitReader::new(&data);
        let mut b = BitReader::new(&data);

        let skipped = a.skip_bits(n).is_ok();
        let read = b.read_bits(n).is_ok();
        if skipped != read {
            return false;
        }
        a.position_bits() == b.position_bits()
    }
}
