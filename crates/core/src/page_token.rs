//! Opaque pagination cursor for medical resource reads.
//!
//! A token packs the sort direction, the ordering timestamp of the next row and the number of
//! rows at that timestamp already returned into one non-negative `i64`:
//!
//! ```text
//!  63   62        61 ........................ 18   17 ............ 0
//! [ 0 | asc ] [ time_millis (44 bits)         ] [ offset (18 bits) ]
//! ```
//!
//! Bit 63 is always clear so every packed token is non-negative. A token with no timestamp
//! encodes to [`DEFAULT_LONG`] instead of a packed value.

use crate::constants::DEFAULT_LONG;
use crate::error::PageTokenError;

const OFFSET_BITS: u32 = 18;
const TIMESTAMP_BITS: u32 = 44;

const OFFSET_SHIFT: u32 = 0;
const TIMESTAMP_SHIFT: u32 = OFFSET_SHIFT + OFFSET_BITS;
const ASCENDING_SHIFT: u32 = TIMESTAMP_SHIFT + TIMESTAMP_BITS;

const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Largest timestamp a token can carry (`2^44 - 1`).
pub const MAX_TIME_MILLIS: i64 = TIMESTAMP_MASK as i64;

/// Largest offset a token can carry (`2^18 - 1`). Larger offsets are clamped.
pub const MAX_OFFSET: i64 = OFFSET_MASK as i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTokenWrapper {
    is_ascending: bool,
    time_millis: u64,
    offset: u32,
    is_timestamp_set: bool,
    is_empty: bool,
}

impl PageTokenWrapper {
    /// The token of a request that has no page token at all.
    pub const EMPTY: PageTokenWrapper = PageTokenWrapper {
        is_ascending: true,
        time_millis: 0,
        offset: 0,
        is_timestamp_set: false,
        is_empty: true,
    };

    /// Builds a token positioned at `time_millis`, skipping `offset` rows with that timestamp.
    ///
    /// An `offset` above [`MAX_OFFSET`] is clamped rather than rejected.
    ///
    /// # Errors
    ///
    /// - [`PageTokenError::NegativeTimestamp`] if `time_millis < 0`
    /// - [`PageTokenError::NegativeOffset`] if `offset < 0`
    /// - [`PageTokenError::TimestampTooLarge`] if `time_millis > MAX_TIME_MILLIS`
    pub fn of(is_ascending: bool, time_millis: i64, offset: i64) -> Result<Self, PageTokenError> {
        if time_millis < 0 {
            return Err(PageTokenError::NegativeTimestamp);
        }
        if offset < 0 {
            return Err(PageTokenError::NegativeOffset);
        }
        if time_millis > MAX_TIME_MILLIS {
            return Err(PageTokenError::TimestampTooLarge);
        }

        Ok(Self {
            is_ascending,
            time_millis: time_millis as u64,
            offset: offset.min(MAX_OFFSET) as u32,
            is_timestamp_set: true,
            is_empty: false,
        })
    }

    /// A token that only carries a direction: no timestamp, offset 0.
    pub fn of_ascending(is_ascending: bool) -> Self {
        Self {
            is_ascending,
            time_millis: 0,
            offset: 0,
            is_timestamp_set: false,
            is_empty: false,
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.is_ascending
    }

    pub fn time_millis(&self) -> u64 {
        self.time_millis
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn is_timestamp_set(&self) -> bool {
        self.is_timestamp_set
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Packs the token. Tokens without a timestamp encode to [`DEFAULT_LONG`].
    pub fn encode(&self) -> i64 {
        if !self.is_timestamp_set {
            return DEFAULT_LONG;
        }

        let ascending = u64::from(self.is_ascending) << ASCENDING_SHIFT;
        let time = (self.time_millis & TIMESTAMP_MASK) << TIMESTAMP_SHIFT;
        let offset = (u64::from(self.offset) & OFFSET_MASK) << OFFSET_SHIFT;

        // Bit 63 is never set, so the cast cannot produce a negative value.
        (ascending | time | offset) as i64
    }

    /// Unpacks a token produced by [`Self::encode`].
    ///
    /// [`DEFAULT_LONG`] decodes to `of_ascending(default_is_ascending)`.
    ///
    /// # Errors
    ///
    /// Returns [`PageTokenError::NegativeToken`] for any other negative value.
    pub fn decode(token: i64, default_is_ascending: bool) -> Result<Self, PageTokenError> {
        if token == DEFAULT_LONG {
            return Ok(Self::of_ascending(default_is_ascending));
        }
        if token < 0 {
            return Err(PageTokenError::NegativeToken);
        }

        let raw = token as u64;
        let is_ascending = (raw >> ASCENDING_SHIFT) & 1 == 1;
        let time_millis = (raw >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK;
        let offset = (raw >> OFFSET_SHIFT) & OFFSET_MASK;

        Ok(Self {
            is_ascending,
            time_millis,
            offset: offset as u32,
            is_timestamp_set: true,
            is_empty: false,
        })
    }
}
