//! Holds the content id type and its reserved values.

use std::num::TryFromIntError;

/// The content id describes the _material_ a `MapNode` is made of.
///
/// Ids other than the reserved ones are assigned when the node registry is
/// finalized and are stable for the lifetime of the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ContentId(pub u16);

impl Default for ContentId {
    fn default() -> Self {
        Self::IGNORE
    }
}

impl ContentId {
    /// The common material through which everything can move and which
    /// is fully transparent to light.
    pub const AIR: Self = Self(0);

    /// A solid placeholder material used for node names that were present
    /// in a stored world but were never registered in this session.
    pub const UNKNOWN: Self = Self(1);

    /// Ignored node.
    ///
    /// Unloaded blocks are considered to consist of this. Several methods
    /// return this when an error occurs. During map generation this means
    /// the node has not been decided yet.
    pub const IGNORE: Self = Self(0x7fff);

    /// First id handed out to regular registrations at finalize.
    pub(crate) const FIRST_FREE: u16 = 2;

    /// Whether this id is one of the three built-in reserved contents.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self == Self::AIR || self == Self::UNKNOWN || self == Self::IGNORE
    }
}

impl From<ContentId> for usize {
    fn from(value: ContentId) -> Self {
        usize::from(value.0)
    }
}

impl From<ContentId> for u16 {
    fn from(value: ContentId) -> Self {
        value.0
    }
}

impl TryFrom<usize> for ContentId {
    type Error = TryFromIntError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        value.try_into().map(Self)
    }
}
