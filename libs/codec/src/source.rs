//! Random-access byte sources backing a stream
//!
//! The decoder only needs two things from a stream file: its total length and a borrowed
//! view of an arbitrary byte range. In-memory buffers and memory-mapped files both satisfy
//! that without copying, and `Arc`-wrapped sources let several readers share one mapping.

use crate::error::SourceError;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Random-access, read-only view of a stream's bytes, shareable across reader threads
pub trait ByteSource: Send + Sync {
    /// Total length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow `length` bytes starting at `offset`
    fn read(&self, offset: u64, length: u64) -> Result<&[u8], SourceError>;
}

fn slice_range(data: &[u8], offset: u64, length: u64) -> Result<&[u8], SourceError> {
    let source_len = data.len() as u64;
    let end = offset
        .checked_add(length)
        .filter(|&end| end <= source_len)
        .ok_or_else(|| SourceError::out_of_range(offset, length, source_len))?;
    Ok(&data[offset as usize..end as usize])
}

impl ByteSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read(&self, offset: u64, length: u64) -> Result<&[u8], SourceError> {
        slice_range(self, offset, length)
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read(&self, offset: u64, length: u64) -> Result<&[u8], SourceError> {
        slice_range(self, offset, length)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read(&self, offset: u64, length: u64) -> Result<&[u8], SourceError> {
        (**self).read(offset, length)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read(&self, offset: u64, length: u64) -> Result<&[u8], SourceError> {
        (**self).read(offset, length)
    }
}

/// Read-only memory mapping of a stream file
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    // Zero-length files cannot be mapped on every platform
    map: Option<Mmap>,
}

impl MappedFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let map_error = |e: std::io::Error| SourceError::Map {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let file = File::open(path).map_err(map_error)?;
        let size = file.metadata().map_err(map_error)?.len();

        let map = if size == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only; trace files are not modified while a reader
            // holds them open, and every access goes through bounds-checked slices.
            Some(unsafe { MmapOptions::new().map(&file) }.map_err(map_error)?)
        };

        debug!("Mapped stream file {:?} ({} bytes)", path, size);
        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl ByteSource for MappedFile {
    fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    fn read(&self, offset: u64, length: u64) -> Result<&[u8], SourceError> {
        slice_range(self.as_bytes(), offset, length)
    }
}
