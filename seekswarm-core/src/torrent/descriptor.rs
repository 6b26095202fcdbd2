//! Torrent layout as supplied by the engine or indexer

use serde::{Deserialize, Serialize};

use super::InfoHash;

/// One file inside a torrent, in announce order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the torrent root, `/`-separated
    pub path: String,
    /// File length in bytes
    pub length: u64,
}

/// Location of a file inside the torrent's single logical address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileSpan {
    /// Absolute offset of the file's first byte
    pub offset: u64,
    /// File length in bytes
    pub length: u64,
}

impl FileSpan {
    /// Absolute offset one past the file's last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Immutable description of a torrent's content layout.
///
/// Files are laid out contiguously in order; a file's offset is the sum of
/// the lengths of every file before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentDescriptor {
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u64,
    pub files: Vec<FileEntry>,
}

impl TorrentDescriptor {
    /// Total payload size across all files.
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }

    /// Number of pieces needed to hold the payload.
    pub fn piece_count(&self) -> u64 {
        if self.piece_length == 0 {
            return 0;
        }
        self.total_length().div_ceil(self.piece_length)
    }

    /// Locates `path` inside the torrent address space.
    pub fn file(&self, path: &str) -> Option<FileSpan> {
        let mut offset = 0u64;
        for file in &self.files {
            if file.path == path {
                return Some(FileSpan {
                    offset,
                    length: file.length,
                });
            }
            offset += file.length;
        }
        None
    }

    /// Absolute offset of the first byte of `path`.
    pub fn file_offset(&self, path: &str) -> Option<u64> {
        self.file(path).map(|span| span.offset)
    }
}
