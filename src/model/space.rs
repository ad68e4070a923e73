use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a space. Zero never names a real space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(u64);

impl SpaceId {
    pub const UNKNOWN: SpaceId = SpaceId(0);

    pub const fn new(id: u64) -> SpaceId { SpaceId(id) }

    pub const fn get(self) -> u64 { self.0 }

    pub const fn is_unknown(self) -> bool { self.0 == 0 }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for SpaceId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { s.trim().parse().map(SpaceId) }
}

/// 1-based position of a space in the canonical layout.
pub type SpaceOrder = u32;
