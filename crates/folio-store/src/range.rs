//! Byte-range resolution for partial reads.
//!
//! A partial read is described by a signed `offset` and a signed `max_size`:
//!
//! - `offset >= 0` addresses from the start of the content; a negative
//!   `offset` addresses `-offset` bytes before the end.
//! - `max_size >= 0` caps the number of returned bytes; a negative
//!   `max_size` means "everything from the offset to the end".
//!
//! Offsets outside the content are clamped, so the result is always a valid
//! (possibly empty) sub-range. The same rules apply to inline values and to
//! object store content.

use std::ops::Range;

use bytes::Bytes;

/// Resolve `(offset, max_size)` against content of length `len`.
pub fn resolve_range(len: usize, offset: i64, max_size: i64) -> Range<usize> {
    let start = if offset >= 0 {
        usize::try_from(offset).unwrap_or(usize::MAX).min(len)
    } else {
        let back = usize::try_from(offset.unsigned_abs()).unwrap_or(usize::MAX);
        len.saturating_sub(back)
    };
    let end = if max_size < 0 {
        len
    } else {
        let max = usize::try_from(max_size).unwrap_or(usize::MAX);
        start.saturating_add(max).min(len)
    };
    start..end
}

/// Slice `data` according to [`resolve_range`]. Shares the underlying buffer.
pub fn slice_range(data: &Bytes, offset: i64, max_size: i64) -> Bytes {
    data.slice(resolve_range(data.len(), offset, max_size))
}
