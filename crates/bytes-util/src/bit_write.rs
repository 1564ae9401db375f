use std::io;

/// MSB-first bit writer over any [`io::Write`].
///
/// Partial bytes are only emitted by [`BitWriter::finish`] (zero-padded), so
/// callers must finish the writer before using the sink.
#[derive(Debug)]
pub struct BitWriter<W: io::Write> {
    inner: W,
    current: u8,
    bit_pos: u8,
}

impl<W: io::Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            current: 0,
            bit_pos: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) -> io::Result<()> {
        if bit {
            self.current |= 1 << (7 - self.bit_pos);
        }
        self.bit_pos += 1;

        if self.bit_pos == 8 {
            self.inner.write_all(&[self.current])?;
            self.current = 0;
            self.bit_pos = 0;
        }
        Ok(())
    }

    /// Writes the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, count: u8) -> io::Result<()> {
        if count > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot write more than 64 bits at once",
            ));
        }

        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 == 1)?;
        }
        Ok(())
    }

    /// Pads the current byte with zero bits and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.bit_pos != 0 {
            self.inner.write_all(&[self.current])?;
        }
        Ok(self.inner)
    }
}
