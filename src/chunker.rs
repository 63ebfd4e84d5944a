//! Splits a payload stream into fixed-size chunks and tags each with its
//! SHA-256 hash and byte range. Generalizes
//! `race-storage::merkle::generate_leaves`, which requires the whole
//! payload resident as a `Vec<u8>`, to stream from any seekable source so
//! the upload engine can re-seek and resume without holding the file in
//! memory.

use crate::error::Result;
use openssl::sha;
use std::io::{Read, Seek, SeekFrom};

pub const CHUNK_SIZE: u64 = 256 * 1024;

/// A `Read + Seek` object the chunker and upload engine can share; `Send` so
/// an upload engine holding one can cross an `await` point.
pub trait ReadAndSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadAndSeek for T {}

/// Owned handle to a payload's byte source plus its known length.
pub type PayloadSource = Box<dyn ReadAndSeek>;

/// A contiguous byte range of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub data_hash: [u8; 32],
    pub data_size: u32,
    pub min_byte_range: u64,
    pub max_byte_range: u64,
}

/// Reads `source` from the start in [`CHUNK_SIZE`]-byte windows, hashing
/// each as it goes. `total_len` bounds the final, possibly-shorter chunk.
///
/// An empty payload yields zero chunks. A payload whose length is an exact
/// multiple of `CHUNK_SIZE` never produces a trailing zero-length chunk:
/// reading stops at EOF, which lands exactly on the last full chunk. The
/// defensive drop below guards against a differently-shaped chunking loop
/// emitting one anyway.
pub fn chunk_stream(source: &mut dyn ReadAndSeek, total_len: u64) -> Result<Vec<Chunk>> {
    source.seek(SeekFrom::Start(0))?;

    let mut chunks = Vec::new();
    let mut min_byte_range: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE as usize];

    while min_byte_range < total_len {
        let want = (total_len - min_byte_range).min(CHUNK_SIZE) as usize;
        source.read_exact(&mut buf[..want])?;

        let data_hash = sha::sha256(&buf[..want]);
        let max_byte_range = min_byte_range + want as u64;

        chunks.push(Chunk {
            data_hash,
            data_size: want as u32,
            min_byte_range,
            max_byte_range,
        });
        min_byte_range = max_byte_range;
    }

    if let Some(last) = chunks.last() {
        if last.max_byte_range == last.min_byte_range {
            chunks.pop();
        }
    }

    Ok(chunks)
}

/// Reads exactly chunk `index`'s bytes back out of `source`, for the
/// upload engine to pair with its proof before POSTing.
pub fn read_chunk_bytes(source: &mut dyn ReadAndSeek, chunk: &Chunk) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(chunk.min_byte_range))?;
    let mut buf = vec![0u8; chunk.data_size as usize];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_empty_payload_has_no_chunks() {
        let mut src = Cursor::new(Vec::<u8>::new());
        let chunks = chunk_stream(&mut src, 0).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_exact_single_chunk_boundary() {
        let data = vec![0u8; CHUNK_SIZE as usize];
        let mut src = Cursor::new(data);
        let chunks = chunk_stream(&mut src, CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].max_byte_range, CHUNK_SIZE);
    }

    #[test]
    fn test_two_chunk_payload() {
        let data = vec![7u8; 300_000];
        let mut src = Cursor::new(data);
        let chunks = chunk_stream(&mut src, 300_000).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].max_byte_range, CHUNK_SIZE);
        assert_eq!(chunks[1].max_byte_range, 300_000);
    }

    #[test]
    fn test_odd_leaf_count() {
        let data = vec![1u8; 700_000];
        let mut src = Cursor::new(data);
        let chunks = chunk_stream(&mut src, 700_000).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].max_byte_range, 700_000);
    }

    #[test]
    fn test_chunk_coverage() {
        let data: Vec<u8> = (0..500_000u32).map(|i| (i % 251) as u8).collect();
        let mut src = Cursor::new(data.clone());
        let chunks = chunk_stream(&mut src, data.len() as u64).unwrap();

        let mut rebuilt = Vec::new();
        for chunk in &chunks {
            rebuilt.extend(read_chunk_bytes(&mut src, chunk).unwrap());
        }
        assert_eq!(rebuilt, data);
        assert_eq!(
            chunks.iter().map(|c| c.data_size as u64).sum::<u64>(),
            data.len() as u64
        );
    }
}
