use crate::{Error, Result};
use ipnet::Ipv6Net;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    net::{IpAddr, Ipv6Addr},
};

/// Allocates IPv6 addresses from a subnet.
///
/// An IPv6 subnet is too large for a bitset, so consumed host identifiers are
/// kept in a set keyed by the host part of the address (e.g. `"::5"`). Host id
/// zero is never allocated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Pool {
    subnet: Ipv6Net,
    gateway: Option<Ipv6Addr>,
    allocated: BTreeSet<String>,
    /// The most recently issued host id. Scans for a free id resume after it.
    last_host: Option<String>,
}

// === impl Ipv6Pool ===

impl Ipv6Pool {
    pub fn new(subnet: Ipv6Net, gateway: Option<Ipv6Addr>) -> Result<Self> {
        if subnet.prefix_len() == 0 || subnet.prefix_len() > 126 {
            return Err(Error::InvalidSubnet {
                subnet: subnet.to_string(),
                reason: "prefix length must be between 1 and 126".to_string(),
            });
        }
        let mut pool = Self {
            subnet: subnet.trunc(),
            gateway,
            allocated: BTreeSet::new(),
            last_host: None,
        };
        if let Some(gw) = gateway {
            let id = pool.host_id(gw)?;
            if id == 0 {
                return Err(Error::InvalidSubnet {
                    subnet: subnet.to_string(),
                    reason: format!("gateway {gw} is the subnet address"),
                });
            }
            pool.allocated.insert(key(id));
        }
        Ok(pool)
    }

    pub fn subnet(&self) -> Ipv6Net {
        self.subnet
    }

    fn max_host(&self) -> u128 {
        u128::MAX >> self.subnet.prefix_len()
    }

    fn host_id(&self, addr: Ipv6Addr) -> Result<u128> {
        if !self.subnet.contains(&addr) {
            return Err(Error::AddressOutOfRange {
                addr: IpAddr::V6(addr),
                pool: self.subnet.to_string(),
            });
        }
        Ok(u128::from(addr) & self.max_host())
    }

    fn addr(&self, id: u128) -> Ipv6Addr {
        Ipv6Addr::from(u128::from(self.subnet.network()) | id)
    }

    /// The number of host ids in use, including the gateway.
    pub fn allocated(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_allocated(&self, addr: Ipv6Addr) -> bool {
        self.host_id(addr)
            .map(|id| self.allocated.contains(&key(id)))
            .unwrap_or(false)
    }

    /// Allocates the first free host id after the last one issued, wrapping
    /// around to `::1`.
    pub fn allocate_next(&mut self) -> Result<Ipv6Addr> {
        let max = self.max_host();
        if self.allocated.len() as u128 >= max {
            return Err(Error::PoolExhausted {
                pool: self.subnet.to_string(),
            });
        }

        let mut id = self
            .last_host
            .as_deref()
            .and_then(|k| k.parse::<Ipv6Addr>().ok())
            .map(u128::from)
            .unwrap_or(0);
        loop {
            id = if id >= max { 1 } else { id + 1 };
            let k = key(id);
            if !self.allocated.contains(&k) {
                self.allocated.insert(k.clone());
                self.last_host = Some(k);
                return Ok(self.addr(id));
            }
        }
    }

    /// Marks `addr` as allocated, returning whether it was newly consumed.
    pub fn allocate_specific(&mut self, addr: Ipv6Addr) -> Result<bool> {
        let id = self.host_id(addr)?;
        if id == 0 || Some(addr) == self.gateway {
            return Err(Error::AddressInUse(IpAddr::V6(addr)));
        }
        Ok(self.allocated.insert(key(id)))
    }

    /// Returns `addr` to the pool, returning whether it was allocated. The
    /// gateway is never released.
    pub fn release(&mut self, addr: Ipv6Addr) -> Result<bool> {
        let id = self.host_id(addr)?;
        if Some(addr) == self.gateway {
            return Ok(false);
        }
        Ok(self.allocated.remove(&key(id)))
    }
}

fn key(id: u128) -> String {
    Ipv6Addr::from(id).to_string()
}
