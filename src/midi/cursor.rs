use crate::error::DecodeError;

/// Read position over a borrowed byte buffer.
///
/// All reads are bounds checked and fail with `UnexpectedEndOfStream`
/// instead of panicking. Offsets reported in errors are relative to the
/// start of the buffer the cursor was created over.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, offset: 0 }
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::UnexpectedEndOfStream {
                offset: self.offset,
                needed: needed - self.remaining(),
            });
        }
        Ok(())
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        let byte = self.data[self.offset];
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(n)?;
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    /// Decode a variable-length quantity: 7-bit groups, most significant
    /// first, high bit set on every byte but the last.
    ///
    /// The group count is only bounded by the stream. Bits shifted past 64
    /// are discarded.
    pub fn read_vlq(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset;
        let mut result = 0u64;
        loop {
            let Some(byte) = self.peek_u8() else {
                return Err(DecodeError::MalformedVlq { offset: start });
            };
            self.offset += 1;
            result = (result << 7) | u64::from(byte & 0x7F);
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
        }
    }
}

/// Encode `value` as a variable-length quantity.
pub fn encode_vlq(mut value: u64) -> Vec<u8> {
    let mut groups = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        groups.push(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    groups.reverse();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads_are_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 0x12);
        assert_eq!(cursor.read_u16_be().unwrap(), 0x3456);
        assert_eq!(cursor.read_u32_be().unwrap(), 0x789A_BCDE);
        assert!(cursor.is_empty());
    }

    #[test]
    fn short_reads_fail_without_advancing() {
        let data = [0x00, 0x01, 0x02];
        let mut cursor = ByteCursor::new(&data);
        cursor.read_u8().unwrap();
        assert_eq!(
            cursor.read_u32_be(),
            Err(DecodeError::UnexpectedEndOfStream {
                offset: 1,
                needed: 2
            })
        );
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_bytes(2).unwrap(), &[0x01, 0x02]);
        assert!(matches!(
            cursor.read_u8(),
            Err(DecodeError::UnexpectedEndOfStream { offset: 3, needed: 1 })
        ));
    }

    #[test]
    fn vlq_known_encodings() {
        let cases: [(&[u8], u64); 6] = [
            (&[0x00], 0),
            (&[0x7F], 0x7F),
            (&[0x81, 0x00], 0x80),
            (&[0xC0, 0x00], 0x2000),
            (&[0xFF, 0x7F], 0x3FFF),
            (&[0xFF, 0xFF, 0xFF, 0x7F], 0x0FFF_FFFF),
        ];
        for (bytes, expected) in cases {
            let mut cursor = ByteCursor::new(bytes);
            assert_eq!(cursor.read_vlq().unwrap(), expected);
            assert!(cursor.is_empty());
            assert_eq!(encode_vlq(expected), bytes);
        }
    }

    #[test]
    fn vlq_round_trip_sampled_range() {
        let mut value = 0u64;
        while value <= 0x0FFF_FFFF {
            let encoded = encode_vlq(value);
            assert!(encoded.len() <= 4);
            let mut cursor = ByteCursor::new(&encoded);
            assert_eq!(cursor.read_vlq().unwrap(), value);
            value = value * 3 + 1;
        }
    }

    #[test]
    fn vlq_accepts_more_than_four_groups() {
        let encoded = encode_vlq(0x7_0000_0000);
        assert_eq!(encoded.len(), 6);
        assert_eq!(ByteCursor::new(&encoded).read_vlq().unwrap(), 0x7_0000_0000);
    }

    #[test]
    fn vlq_truncated_mid_sequence() {
        let data = [0x10, 0x81, 0x80];
        let mut cursor = ByteCursor::new(&data);
        cursor.read_u8().unwrap();
        assert_eq!(
            cursor.read_vlq(),
            Err(DecodeError::MalformedVlq { offset: 1 })
        );
    }
}
