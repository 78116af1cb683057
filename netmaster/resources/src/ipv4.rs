use crate::{Bitset, Error, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Allocates IPv4 addresses from a contiguous block.
///
/// Bit `n` of the bitset tracks the `n`th address after `first`. Reserved
/// addresses (the network and broadcast addresses and the gateway of a subnet
/// pool) are set when the pool is built and are never handed out or released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Pool {
    first: Ipv4Addr,
    bits: Bitset,
    #[serde(default)]
    reserved: Vec<u32>,
}

const MIN_PREFIX_LEN: u8 = 8;
const MAX_PREFIX_LEN: u8 = 30;

// === impl Ipv4Pool ===

impl Ipv4Pool {
    /// Builds a pool covering `subnet`, reserving its network and broadcast
    /// addresses and, if given, its gateway.
    pub fn for_subnet(subnet: Ipv4Net, gateway: Option<Ipv4Addr>) -> Result<Self> {
        if !(MIN_PREFIX_LEN..=MAX_PREFIX_LEN).contains(&subnet.prefix_len()) {
            return Err(Error::InvalidSubnet {
                subnet: subnet.to_string(),
                reason: format!(
                    "prefix length must be between {MIN_PREFIX_LEN} and {MAX_PREFIX_LEN}"
                ),
            });
        }
        let subnet = subnet.trunc();
        let len = 1u32 << (32 - subnet.prefix_len());
        let mut pool = Self {
            first: subnet.network(),
            bits: Bitset::new(len),
            reserved: Vec::new(),
        };

        pool.reserve(0);
        pool.reserve(len - 1);
        if let Some(gw) = gateway {
            let i = pool.index(gw)?;
            pool.reserve(i);
        }
        Ok(pool)
    }

    /// Builds a pool over the inclusive range `first..=last` with nothing
    /// reserved.
    pub fn for_range(first: Ipv4Addr, last: Ipv4Addr) -> Result<Self> {
        let (lo, hi) = (u32::from(first), u32::from(last));
        if lo > hi {
            return Err(Error::InvalidRange {
                range: format!("{first}-{last}"),
                reason: "range must be increasing".to_string(),
            });
        }
        let len = hi - lo + 1;
        if len > 1 << (32 - MIN_PREFIX_LEN) {
            return Err(Error::InvalidRange {
                range: format!("{first}-{last}"),
                reason: "range is too large".to_string(),
            });
        }
        Ok(Self {
            first,
            bits: Bitset::new(len),
            reserved: Vec::new(),
        })
    }

    fn reserve(&mut self, i: u32) {
        if !self.bits.set(i) {
            self.reserved.push(i);
        }
    }

    fn index(&self, addr: Ipv4Addr) -> Result<u32> {
        u32::from(addr)
            .checked_sub(u32::from(self.first))
            .filter(|i| *i < self.bits.len())
            .ok_or_else(|| Error::AddressOutOfRange {
                addr: IpAddr::V4(addr),
                pool: self.to_string(),
            })
    }

    fn addr(&self, i: u32) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.first) + i)
    }

    pub fn first(&self) -> Ipv4Addr {
        self.first
    }

    pub fn last(&self) -> Ipv4Addr {
        self.addr(self.bits.len() - 1)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.index(addr).is_ok()
    }

    pub fn is_allocated(&self, addr: Ipv4Addr) -> bool {
        self.index(addr).map(|i| self.bits.test(i)).unwrap_or(false)
    }

    fn is_reserved(&self, i: u32) -> bool {
        self.reserved.contains(&i)
    }

    /// The number of addresses handed out, not counting reserved addresses.
    pub fn allocated(&self) -> u32 {
        self.bits.count() - self.reserved.len() as u32
    }

    /// The number of addresses that may be handed out.
    pub fn capacity(&self) -> u32 {
        self.bits.len() - self.reserved.len() as u32
    }

    /// Allocates the lowest free address.
    pub fn allocate_next(&mut self) -> Result<Ipv4Addr> {
        let i = self
            .bits
            .next_clear(0)
            .ok_or_else(|| Error::PoolExhausted {
                pool: self.to_string(),
            })?;
        self.bits.set(i);
        Ok(self.addr(i))
    }

    /// Marks `addr` as allocated, returning whether it was newly consumed.
    ///
    /// Setting an address that is already allocated is not an error; reserved
    /// addresses are never handed out.
    pub fn allocate_specific(&mut self, addr: Ipv4Addr) -> Result<bool> {
        let i = self.index(addr)?;
        if self.is_reserved(i) {
            return Err(Error::AddressInUse(IpAddr::V4(addr)));
        }
        Ok(!self.bits.set(i))
    }

    /// Returns `addr` to the pool, returning whether it was allocated.
    pub fn release(&mut self, addr: Ipv4Addr) -> Result<bool> {
        let i = self.index(addr)?;
        if self.is_reserved(i) {
            return Ok(false);
        }
        Ok(self.bits.clear(i))
    }

    /// Marks every address of `first..=last` as allocated. Fails without
    /// changing the pool if any of them is already taken.
    pub fn reserve_range(&mut self, first: Ipv4Addr, last: Ipv4Addr) -> Result<()> {
        let (lo, hi) = (self.index(first)?, self.index(last)?);
        if let Some(i) = self.bits.next_set(lo).filter(|i| *i <= hi) {
            return Err(Error::AddressInUse(IpAddr::V4(self.addr(i))));
        }
        for i in lo..=hi {
            self.bits.set(i);
        }
        Ok(())
    }

    /// Releases every non-reserved address of `first..=last`.
    pub fn release_range(&mut self, first: Ipv4Addr, last: Ipv4Addr) -> Result<()> {
        let (lo, hi) = (self.index(first)?, self.index(last)?);
        for i in lo..=hi {
            if !self.is_reserved(i) {
                self.bits.clear(i);
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Ipv4Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last())
    }
}
