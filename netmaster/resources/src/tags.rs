use crate::{
    ranges::{self, TagRange},
    Bitset, Error, Result,
};
use serde::{Deserialize, Serialize};

/// The kind of value a [`TagPool`] hands out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagKind {
    Vlan,
    Vxlan,
    /// Host-local VLANs paired with VXLANs.
    LocalVlan,
    /// Numeric endpoint group ids.
    EndpointGroup,
}

/// A pool of tags drawn from a set of permitted ranges.
///
/// Tags index the bitset directly, so a tag's bit is set while it is in use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPool {
    kind: TagKind,
    ranges: Vec<TagRange>,
    used: Bitset,
}

/// A VXLAN id and the local VLAN it is carried on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VxlanPair {
    pub vxlan: u32,
    pub local_vlan: u32,
}

/// Allocates VXLANs, pairing each with a local VLAN.
///
/// Local VLANs are every usable VLAN not claimed by the tenant's VLAN ranges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VxlanPool {
    vxlans: TagPool,
    local_vlans: TagPool,
}

const MAX_VLAN: u32 = 4095;
const MAX_VXLAN: u32 = 65535;

// === impl TagKind ===

impl TagKind {
    /// The largest value a range of this kind may name.
    pub fn limit(self) -> u32 {
        match self {
            Self::Vlan | Self::LocalVlan | Self::EndpointGroup => MAX_VLAN,
            Self::Vxlan => MAX_VXLAN,
        }
    }

    fn is_vlan(self) -> bool {
        matches!(self, Self::Vlan | Self::LocalVlan)
    }
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vlan => "vlan".fmt(f),
            Self::Vxlan => "vxlan".fmt(f),
            Self::LocalVlan => "local vlan".fmt(f),
            Self::EndpointGroup => "epg".fmt(f),
        }
    }
}

// === impl TagPool ===

impl TagPool {
    pub fn new(kind: TagKind, ranges: Vec<TagRange>) -> Result<Self> {
        if let Some(r) = ranges.iter().find(|r| r.max > kind.limit()) {
            return Err(Error::InvalidRange {
                range: r.to_string(),
                reason: format!("{kind} values exceed {} max allowed", kind.limit()),
            });
        }
        Ok(Self {
            kind,
            ranges,
            used: Bitset::new(kind.limit() + 1),
        })
    }

    /// Builds a pool from a range string such as `"11-1000,2001-3000"`.
    pub fn parse(kind: TagKind, s: &str) -> Result<Self> {
        Self::new(kind, ranges::parse_tag_ranges(s, kind.limit())?)
    }

    pub fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn ranges(&self) -> &[TagRange] {
        &self.ranges
    }

    /// Whether `tag` may ever be handed out by this pool.
    pub fn contains(&self, tag: u32) -> bool {
        if self.kind.is_vlan() && (tag == 0 || tag == MAX_VLAN) {
            return false;
        }
        self.ranges.iter().any(|r| r.contains(tag))
    }

    pub fn is_used(&self, tag: u32) -> bool {
        self.used.test(tag)
    }

    /// The number of tags the pool can hand out.
    pub fn capacity(&self) -> u32 {
        self.ranges
            .iter()
            .map(|r| (r.min..=r.max).filter(|t| self.contains(*t)).count() as u32)
            .sum()
    }

    /// Allocates `requested`, or the lowest free tag when `requested` is zero.
    pub fn allocate(&mut self, requested: u32) -> Result<u32> {
        if requested != 0 {
            if !self.contains(requested) || self.used.set(requested) {
                return Err(Error::TagUnavailable {
                    kind: self.kind,
                    tag: requested,
                });
            }
            return Ok(requested);
        }

        for r in &self.ranges {
            let mut from = r.min;
            while let Some(tag) = self.used.next_clear(from).filter(|t| *t <= r.max) {
                if self.contains(tag) {
                    self.used.set(tag);
                    return Ok(tag);
                }
                from = tag + 1;
            }
        }
        Err(Error::PoolExhausted {
            pool: format!("{} pool {}", self.kind, ranges::format_ranges(&self.ranges)),
        })
    }

    /// Returns `tag` to the pool, returning whether it was in use.
    pub fn free(&mut self, tag: u32) -> bool {
        self.used.clear(tag)
    }

    /// Returns the number of tags in use and a compact listing of them.
    pub fn in_use(&self) -> (u32, String) {
        let listing = ranges::format_values(self.used.iter_set());
        (self.used.count(), listing)
    }
}

// === impl VxlanPool ===

impl VxlanPool {
    pub fn new(vxlans: Vec<TagRange>, vlans: &[TagRange]) -> Result<Self> {
        let vxlans = TagPool::new(TagKind::Vxlan, vxlans)?;
        let local_vlans = TagPool::new(TagKind::LocalVlan, complement(vlans, 1, MAX_VLAN - 1))?;

        let (available, required) = (local_vlans.capacity(), vxlans.capacity());
        if available < required {
            return Err(Error::InsufficientLocalVlans {
                available,
                required,
            });
        }
        Ok(Self {
            vxlans,
            local_vlans,
        })
    }

    pub fn vxlans(&self) -> &TagPool {
        &self.vxlans
    }

    pub fn local_vlans(&self) -> &TagPool {
        &self.local_vlans
    }

    /// Allocates a VXLAN (`requested`, or the lowest free one when zero) along
    /// with a local VLAN. Nothing is consumed if either allocation fails.
    pub fn allocate(&mut self, requested: u32) -> Result<VxlanPair> {
        let vxlan = self.vxlans.allocate(requested)?;
        match self.local_vlans.allocate(0) {
            Ok(local_vlan) => Ok(VxlanPair { vxlan, local_vlan }),
            Err(error) => {
                self.vxlans.free(vxlan);
                Err(error)
            }
        }
    }

    /// Returns both halves of `pair` to their pools.
    pub fn free(&mut self, pair: VxlanPair) -> bool {
        let vxlan = self.vxlans.free(pair.vxlan);
        let local = self.local_vlans.free(pair.local_vlan);
        vxlan && local
    }
}

/// Returns the parts of `lo..=hi` not covered by the sorted `ranges`.
fn complement(ranges: &[TagRange], lo: u32, hi: u32) -> Vec<TagRange> {
    let mut out = Vec::new();
    let mut next = lo;
    for r in ranges {
        if r.max < next {
            continue;
        }
        if r.min > hi {
            break;
        }
        if r.min > next {
            out.push(TagRange::new(next, r.min - 1));
        }
        next = r.max + 1;
    }
    if next <= hi {
        out.push(TagRange::new(next, hi));
    }
    out
}
