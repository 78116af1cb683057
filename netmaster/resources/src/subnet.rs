use crate::{Bitset, Error, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Carves fixed-size subnets out of a larger address pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPool {
    pool: Ipv4Net,
    alloc_len: u8,
    used: Bitset,
}

const MAX_SUBNETS_BITS: u8 = 16;

// === impl SubnetPool ===

impl SubnetPool {
    pub fn new(pool: Ipv4Net, alloc_len: u8) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSubnet {
            subnet: pool.to_string(),
            reason,
        };
        if alloc_len < pool.prefix_len() || alloc_len > 30 {
            return Err(invalid(format!(
                "allocation length {alloc_len} must be between {} and 30",
                pool.prefix_len()
            )));
        }
        let bits = alloc_len - pool.prefix_len();
        if bits > MAX_SUBNETS_BITS {
            return Err(invalid(format!(
                "allocation length {alloc_len} yields more than 2^{MAX_SUBNETS_BITS} subnets"
            )));
        }
        Ok(Self {
            pool: pool.trunc(),
            alloc_len,
            used: Bitset::new(1 << bits),
        })
    }

    pub fn pool(&self) -> Ipv4Net {
        self.pool
    }

    pub fn alloc_len(&self) -> u8 {
        self.alloc_len
    }

    fn subnet(&self, i: u32) -> Ipv4Net {
        let step = 1u32 << (32 - self.alloc_len);
        let network = u32::from(self.pool.network()) + i * step;
        // The prefix length was validated when the pool was built.
        Ipv4Net::new(network.into(), self.alloc_len).unwrap_or(self.pool)
    }

    fn index(&self, subnet: Ipv4Net) -> Result<u32> {
        if subnet.prefix_len() != self.alloc_len || !self.pool.contains(&subnet) {
            return Err(Error::InvalidSubnet {
                subnet: subnet.to_string(),
                reason: format!("not a /{} subnet of {}", self.alloc_len, self.pool),
            });
        }
        let offset = u32::from(subnet.network()) - u32::from(self.pool.network());
        Ok(offset >> (32 - self.alloc_len))
    }

    /// Allocates the lowest free subnet.
    pub fn allocate(&mut self) -> Result<Ipv4Net> {
        let i = self.used.next_clear(0).ok_or_else(|| Error::PoolExhausted {
            pool: format!("subnet pool {}", self.pool),
        })?;
        self.used.set(i);
        Ok(self.subnet(i))
    }

    /// Returns `subnet` to the pool, returning whether it was allocated.
    pub fn free(&mut self, subnet: Ipv4Net) -> Result<bool> {
        let i = self.index(subnet)?;
        Ok(self.used.clear(i))
    }
}
