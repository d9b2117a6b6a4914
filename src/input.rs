use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// File or stdin input read in fixed-size chunks.
pub struct InputReader {
    reader: Box<dyn Read>,
    size: Option<u64>,
}

impl InputReader {
    /// Opens `input_path`; "-" reads from stdin.
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();

        if path.as_os_str() == "-" {
            return Ok(Self {
                reader: Box::new(io::stdin().lock()),
                size: None,
            });
        }

        let file = File::open(path)?;
        let size = file.metadata().ok().map(|meta| meta.len());
        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            size,
        })
    }

    /// Total input length when reading a regular file.
    pub fn size_hint(&self) -> Option<u64> {
        self.size
    }

    /// Calls `callback` with each chunk until EOF or until it returns
    /// `Ok(false)`.
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            if !callback(&buffer[..bytes_read])? {
                break;
            }
        }

        Ok(())
    }

    /// Like [`process_chunks`](Self::process_chunks), but every slice handed
    /// to `callback` holds whole records of `record_len` bytes.
    ///
    /// Returns the length of the incomplete record left at EOF.
    pub fn process_records<F>(
        &mut self,
        record_len: usize,
        records_per_chunk: usize,
        mut callback: F,
    ) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut carry = Vec::with_capacity(record_len * (records_per_chunk + 1));

        self.process_chunks(record_len * records_per_chunk, |chunk| {
            carry.extend_from_slice(chunk);
            let whole = carry.len() - carry.len() % record_len;
            if whole == 0 {
                return Ok(true);
            }

            let keep_going = callback(&carry[..whole])?;
            carry.drain(..whole);
            Ok(keep_going)
        })?;

        Ok(carry.len())
    }
}
