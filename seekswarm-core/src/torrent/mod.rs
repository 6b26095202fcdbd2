//! Torrent identity, layout, and piece arithmetic

pub mod descriptor;
pub mod info_hash;
pub mod piece_map;

pub use descriptor::{FileEntry, FileSpan, TorrentDescriptor};
pub use info_hash::{InfoHash, InfoHashError};
pub use piece_map::{MappingError, PieceRange, map_range, map_range_signed};

#[cfg(test)]
pub(crate) mod test_data;
