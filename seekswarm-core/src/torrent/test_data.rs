//! Shared fixtures for unit tests

use super::{FileEntry, InfoHash, TorrentDescriptor};

/// Hex form of [`create_test_info_hash`].
pub const TEST_INFO_HASH_HEX: &str = "0123456789abcdef0123456789abcdef01234567";

/// Deterministic info hash shared by unit tests.
pub fn create_test_info_hash() -> InfoHash {
    InfoHash::new([
        0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
        0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
    ])
}

/// Two-file torrent with the song starting at byte 500000 on 256 KiB pieces.
pub fn create_test_descriptor() -> TorrentDescriptor {
    TorrentDescriptor {
        info_hash: create_test_info_hash(),
        name: "Test Album".to_string(),
        piece_length: 262_144,
        files: vec![
            FileEntry {
                path: "cover.jpg".to_string(),
                length: 500_000,
            },
            FileEntry {
                path: "Music/Artist/song.mp3".to_string(),
                length: 1_000_000,
            },
        ],
    }
}
