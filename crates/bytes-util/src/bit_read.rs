use std::io;

/// MSB-first bit reader over any [`io::Read`].
#[derive(Debug)]
pub struct BitReader<R> {
    inner: R,
    current: u8,
    /// Number of bits of `current` already consumed (8 means "load next byte").
    bit_pos: u8,
}

impl<R: io::Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            current: 0,
            bit_pos: 8,
        }
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> io::Result<bool> {
        if self.bit_pos == 8 {
            let mut buf = [0u8; 1];
            self.inner.read_exact(&mut buf)?;
            self.current = buf[0];
            self.bit_pos = 0;
        }

        let bit = (self.current >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads `count` bits (at most 64) as an unsigned big-endian value.
    pub fn read_bits(&mut self, count: u8) -> io::Result<u64> {
        if count > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot read more than 64 bits at once",
            ));
        }

        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }
}
