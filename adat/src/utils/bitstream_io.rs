//! Packing of line levels into bytes for storage.
//!
//! One line level per bit, most significant bit first. The final byte is
//! zero-padded; readers that need an exact level count carry it separately.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

/// Streams line levels into a byte writer.
pub struct LevelWriter<W: io::Write> {
    bs: BitWriter<W, BigEndian>,
    written: u64,
}

impl<W: io::Write> LevelWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            bs: BitWriter::new(writer),
            written: 0,
        }
    }

    #[inline(always)]
    pub fn put(&mut self, level: bool) -> io::Result<()> {
        self.written += 1;
        self.bs.write_bit(level)
    }

    pub fn put_all(&mut self, levels: &[bool]) -> io::Result<()> {
        levels.iter().try_for_each(|&level| self.put(level))
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Pads to a byte boundary and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.bs.byte_align()?;
        Ok(self.bs.into_writer())
    }
}

pub fn pack_levels(levels: &[bool]) -> io::Result<Vec<u8>> {
    let mut writer = LevelWriter::new(Vec::with_capacity(levels.len().div_ceil(8)));
    writer.put_all(levels)?;
    writer.finish()
}

/// Expands every bit of `bytes` into a line level.
pub fn unpack_levels(bytes: &[u8]) -> io::Result<Vec<bool>> {
    let mut bs = BitReader::<_, BigEndian>::new(io::Cursor::new(bytes));
    (0..bytes.len() * 8).map(|_| bs.read_bit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_msb_first_with_padding() -> anyhow::Result<()> {
        let levels = [true, false, false, true, true, true, false, true, true, false];
        let bytes = pack_levels(&levels)?;
        assert_eq!(bytes, [0b1001_1101, 0b1000_0000]);

        let unpacked = unpack_levels(&bytes)?;
        assert_eq!(&unpacked[..levels.len()], &levels);
        assert!(unpacked[levels.len()..].iter().all(|&l| !l));
        Ok(())
    }

    #[test]
    fn writer_counts_levels() -> anyhow::Result<()> {
        let mut writer = LevelWriter::new(Vec::new());
        writer.put_all(&[true; 13])?;
        assert_eq!(writer.written(), 13);
        assert_eq!(writer.finish()?, [0xFF, 0xF8]);
        Ok(())
    }
}
