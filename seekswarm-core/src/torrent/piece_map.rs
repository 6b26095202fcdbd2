//! Byte range to piece range mapping.
//!
//! Every piece-boundary calculation in the crate goes through [`map_range`].
//! Callers translate a file-relative window into an absolute torrent offset
//! first and then ask this module which pieces cover it.

use serde::Serialize;

/// Inclusive span of pieces covering a byte window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PieceRange {
    /// First piece containing any byte of the window
    pub start_piece: u64,
    /// Last piece containing any byte of the window (inclusive)
    pub end_piece: u64,
    /// Offset of the window's first byte inside `start_piece`
    pub offset_in_first_piece: u64,
}

impl PieceRange {
    /// Number of pieces covered, always at least one.
    pub fn piece_count(&self) -> u64 {
        self.end_piece - self.start_piece + 1
    }

    /// Checks whether `piece` lies inside the range.
    pub fn contains(&self, piece: u64) -> bool {
        (self.start_piece..=self.end_piece).contains(&piece)
    }
}

/// Caller contract violations rejected by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// Maps `[offset, offset + length)` onto the pieces that hold it.
///
/// A zero-length window still resolves to the single piece containing
/// `offset`, so callers always get a usable range to prioritize.
///
/// # Errors
///
/// - `MappingError::InvalidArgument` - `piece_length` is zero or `offset + length` overflows
pub fn map_range(offset: u64, length: u64, piece_length: u64) -> Result<PieceRange, MappingError> {
    if piece_length == 0 {
        return Err(MappingError::InvalidArgument {
            reason: "piece length must be positive".to_string(),
        });
    }

    let last_byte = offset
        .checked_add(length.max(1) - 1)
        .ok_or_else(|| MappingError::InvalidArgument {
            reason: format!("range {offset}+{length} overflows the address space"),
        })?;

    Ok(PieceRange {
        start_piece: offset / piece_length,
        end_piece: last_byte / piece_length,
        offset_in_first_piece: offset % piece_length,
    })
}

/// Signed entry point for untyped boundaries (JSON, CLI) that may carry negatives.
///
/// # Errors
///
/// - `MappingError::InvalidArgument` - Any input is negative, `piece_length` is zero, or the range overflows
pub fn map_range_signed(
    offset: i64,
    length: i64,
    piece_length: i64,
) -> Result<PieceRange, MappingError> {
    let non_negative = |name: &str, value: i64| {
        u64::try_from(value).map_err(|_| MappingError::InvalidArgument {
            reason: format!("{name} must not be negative (got {value})"),
        })
    };

    map_range(
        non_negative("offset", offset)?,
        non_negative("length", length)?,
        non_negative("piece length", piece_length)?,
    )
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_range_inside_torrent() {
        let range = map_range(500_000, 1_000_000, 262_144).unwrap();
        assert_eq!(range.start_piece, 1);
        assert_eq!(range.end_piece, 5);
        assert_eq!(range.offset_in_first_piece, 500_000 - 262_144);
        assert_eq!(range.piece_count(), 5);
    }

    #[test]
    fn test_zero_length_resolves_to_one_piece() {
        let range = map_range(700, 0, 256).unwrap();
        assert_eq!(range.start_piece, 2);
        assert_eq!(range.end_piece, 2);

        let origin = map_range(0, 0, 256).unwrap();
        assert_eq!(origin.start_piece, 0);
        assert_eq!(origin.end_piece, 0);
    }

    #[test]
    fn test_range_straddling_one_boundary() {
        let range = map_range(255, 2, 256).unwrap();
        assert_eq!(range.start_piece, 0);
        assert_eq!(range.end_piece, 1);
        assert_eq!(range.offset_in_first_piece, 255);
    }

    #[test]
    fn test_range_ending_exactly_on_boundary() {
        let range = map_range(0, 256, 256).unwrap();
        assert_eq!(range.end_piece, 0);

        let range = map_range(0, 257, 256).unwrap();
        assert_eq!(range.end_piece, 1);
    }

    #[test]
    fn test_zero_piece_length_rejected() {
        assert!(matches!(
            map_range(0, 10, 0),
            Err(MappingError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(map_range(u64::MAX, 2, 16).is_err());
        assert!(map_range(u64::MAX, 1, 16).is_ok());
    }

    #[test]
    fn test_signed_negatives_rejected() {
        assert!(map_range_signed(-1, 10, 16).is_err());
        assert!(map_range_signed(0, -10, 16).is_err());
        assert!(map_range_signed(0, 10, -16).is_err());
        assert_eq!(
            map_range_signed(255, 2, 256).unwrap(),
            map_range(255, 2, 256).unwrap()
        );
    }

    #[test]
    fn test_contains() {
        let range = map_range(300, 600, 256).unwrap();
        assert!(!range.contains(0));
        assert!(range.contains(1));
        assert!(range.contains(3));
        assert!(!range.contains(4));
    }

    proptest! {
        #[test]
        fn test_start_piece_contains_offset(
            offset in 0u64..1 << 40,
            length in 0u64..1 << 32,
            piece_length in 1u64..1 << 24,
        ) {
            let range = map_range(offset, length, piece_length).unwrap();
            prop_assert!(range.start_piece * piece_length <= offset);
            prop_assert!(offset < (range.start_piece + 1) * piece_length);
            prop_assert!(range.start_piece <= range.end_piece);
            prop_assert_eq!(range, map_range(offset, length, piece_length).unwrap());
        }

        #[test]
        fn test_end_piece_contains_last_byte(
            offset in 0u64..1 << 40,
            length in 1u64..1 << 32,
            piece_length in 1u64..1 << 24,
        ) {
            let range = map_range(offset, length, piece_length).unwrap();
            let last_byte = offset + length - 1;
            prop_assert!(range.end_piece * piece_length <= last_byte);
            prop_assert!(last_byte < (range.end_piece + 1) * piece_length);
        }
    }
}
