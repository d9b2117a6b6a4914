use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use adat::process::CHANNELS;
use adat::structs::frame::Frame;
use adatd_macros::{ToBytes, w64_chunk};

use crate::byteorder::WriteBytesLe;

const W64_GUID_SUFFIX: [u8; 12] = [
    0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];

pub const W64_RIFF_GUID: [u8; 16] = [
    0x72, 0x69, 0x66, 0x66, 0x2E, 0x91, 0xCF, 0x11, 0xA5, 0xD6, 0x28, 0xDB, 0x04, 0xC1, 0x00, 0x00,
];
pub const W64_WAVE_GUID: [u8; 16] = w64_guid(*b"wave");
pub const W64_DATA_GUID: [u8; 16] = w64_guid(*b"data");

/// GUID of a Wave64 chunk whose first four bytes spell `tag`.
pub const fn w64_guid(tag: [u8; 4]) -> [u8; 16] {
    let mut guid = [0; 16];
    let mut i = 0;
    while i < 16 {
        guid[i] = if i < 4 { tag[i] } else { W64_GUID_SUFFIX[i - 4] };
        i += 1;
    }
    guid
}

/// GUID plus the 64-bit size field.
const CHUNK_HEADER_BYTES: u64 = 24;
const BYTES_PER_SAMPLE: u16 = 3;

pub trait W64Chunk {
    fn guid(&self) -> [u8; 16];
    fn chunk_data(&self) -> Vec<u8>;
}

#[w64_chunk(b"fmt ")]
#[derive(Debug, Clone, ToBytes)]
pub struct FmtChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FmtChunk {
    /// Integer PCM, eight 24-bit channels.
    pub fn adat(sample_rate: u32) -> Self {
        let block_align = CHANNELS as u16 * BYTES_PER_SAMPLE;
        Self {
            format_tag: 1,
            channels: CHANNELS as u16,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample: BYTES_PER_SAMPLE * 8,
        }
    }
}

/// Sony Wave64 writer for decoded frames.
///
/// Sizes are patched in by [`finish`](Self::finish), so the target must be
/// seekable.
pub struct W64Writer<W: Write + Seek> {
    writer: BufWriter<W>,
    fmt: FmtChunk,
    file_size_position: u64,
    data_size_position: u64,
    data_written: u64,
}

impl<W: Write + Seek> W64Writer<W> {
    /// Writes the RIFF, fmt and data chunk headers.
    pub fn new(writer: W, sample_rate: u32) -> io::Result<Self> {
        let mut writer = Self {
            writer: BufWriter::new(writer),
            fmt: FmtChunk::adat(sample_rate),
            file_size_position: 0,
            data_size_position: 0,
            data_written: 0,
        };
        writer.write_header()?;
        Ok(writer)
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.writer.write_all(&W64_RIFF_GUID)?;
        self.file_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u64.to_le_bytes())?;
        self.writer.write_all(&W64_WAVE_GUID)?;

        let fmt = self.fmt.clone();
        self.write_chunk(&fmt)?;

        self.writer.write_all(&W64_DATA_GUID)?;
        self.data_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u64.to_le_bytes())?;
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &impl W64Chunk) -> io::Result<()> {
        let data = chunk.chunk_data();
        let mut header = Vec::with_capacity(CHUNK_HEADER_BYTES as usize);
        chunk.guid().write_le(&mut header);
        (CHUNK_HEADER_BYTES + data.len() as u64).write_le(&mut header);

        self.writer.write_all(&header)?;
        self.writer.write_all(&data)?;

        // Chunks are 8-byte aligned.
        let padding = (8 - data.len() % 8) % 8;
        self.writer.write_all(&[0; 8][..padding])
    }

    pub fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let mut bytes = [0u8; CHANNELS * BYTES_PER_SAMPLE as usize];
        for (dst, sample) in bytes.chunks_exact_mut(3).zip(frame.samples) {
            dst.copy_from_slice(&sample.to_le_bytes()[..3]);
        }
        self.writer.write_all(&bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// Patches the chunk sizes and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer
            .write_all(&(self.data_written + CHUNK_HEADER_BYTES).to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(self.file_size_position))?;
        self.writer.write_all(&end.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adat::structs::frame::UserBits;
    use std::io::Cursor;

    #[test]
    fn header_layout() -> io::Result<()> {
        let buffer = W64Writer::new(Cursor::new(Vec::new()), 48_000)?
            .finish()?
            .into_inner();

        assert_eq!(&buffer[0..16], &W64_RIFF_GUID);
        assert_eq!(&buffer[24..40], &W64_WAVE_GUID);
        assert_eq!(&buffer[40..44], b"fmt ");
        assert_eq!(&buffer[44..56], &W64_GUID_SUFFIX);
        // 24-byte header, 16-byte body.
        assert_eq!(buffer[56], 40);
        // Channels, sample rate, block align.
        assert_eq!(&buffer[66..68], &8u16.to_le_bytes());
        assert_eq!(&buffer[68..72], &48_000u32.to_le_bytes());
        assert_eq!(&buffer[76..78], &24u16.to_le_bytes());
        assert_eq!(&buffer[80..96], &W64_DATA_GUID);
        assert_eq!(buffer.len(), 104);
        assert_eq!(&buffer[16..24], &104u64.to_le_bytes());
        Ok(())
    }

    #[test]
    fn frames_are_packed_24_bit() -> io::Result<()> {
        let mut samples = [0; CHANNELS];
        samples[0] = 0x123456;
        samples[7] = 0xFEDCBA;
        let frame = Frame::new(UserBits::new(0), samples);

        let mut writer = W64Writer::new(Cursor::new(Vec::new()), 44_100)?;
        writer.write_frame(&frame)?;
        writer.write_frame(&frame)?;

        let buffer = writer.finish()?.into_inner();
        let data = &buffer[104..];
        assert_eq!(data.len(), 48);
        assert_eq!(&data[0..3], &[0x56, 0x34, 0x12]);
        assert_eq!(&data[21..24], &[0xBA, 0xDC, 0xFE]);
        assert_eq!(&buffer[96..104], &(48u64 + 24).to_le_bytes());
        Ok(())
    }
}
