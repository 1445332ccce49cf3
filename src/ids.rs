use std::fmt;

use crate::error::Error;

/// A stream identifier.
///
/// Stream 0 is the implicit root of the priority tree; every other stream identifier is a
/// positive integer assigned by the HTTP/2 framing layer. Translating the wire's 31-bit stream
/// ID (and stripping the reserved top bit) is the framing layer's job, not this crate's — by the
/// time an identifier reaches [`crate::PriorityTree`] it is already a plain `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

impl StreamId {
    /// The implicit root of every priority tree.
    pub const ROOT: StreamId = StreamId(0);

    /// Returns `true` for the implicit root.
    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        StreamId(id)
    }
}

impl From<StreamId> for u32 {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A validated stream weight in `[1, 256]`.
///
/// The wire encoding of a `PRIORITY`/`HEADERS` dependency uses a `u8` meaning `1..=256`
/// (`0` on the wire means weight `1`); that translation happens in the framing layer before a
/// weight ever reaches this crate, so the in-memory representation here is the direct `1..=256`
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weight(u16);

/// The default weight assigned when a caller does not specify one.
pub const DEFAULT_WEIGHT: Weight = Weight(16);

impl Weight {
    /// Validates and constructs a weight, rejecting anything outside `[1, 256]`.
    pub fn new(weight: u16) -> Result<Weight, Error> {
        if (1..=256).contains(&weight) {
            Ok(Weight(weight))
        } else {
            Err(Error::BadWeight(weight))
        }
    }

    pub(crate) fn get(self) -> u16 {
        self.0
    }

    /// The deficit step size for a child of this weight: `⌊256 / weight⌋`.
    ///
    /// A weight of 256 steps by 1 per turn; a weight of 1 steps by 256.
    pub(crate) fn step(self) -> u64 {
        256u64 / u64::from(self.0)
    }
}

impl Default for Weight {
    fn default() -> Self {
        DEFAULT_WEIGHT
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
