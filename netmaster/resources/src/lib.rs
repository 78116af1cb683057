//! Resource pools for the network control plane.
//!
//! Every scarce value handed out by the netmaster comes from one of the pools
//! in this crate:
//!
//! - [`Ipv4Pool`] is a dense bitset over a subnet (or over an endpoint group's
//!   private range). Bit `n` is the `n`th address after the pool's first address.
//! - [`Ipv6Pool`] tracks consumed host identifiers in a sparse set, since an
//!   IPv6 subnet is far too large for a bitset.
//! - [`TagPool`] hands out VLAN tags, VXLAN identifiers and endpoint group ids
//!   from a set of permitted ranges. [`VxlanPool`] pairs every VXLAN with a local
//!   VLAN used for multiplexing on the host.
//! - [`SubnetPool`] carves fixed-size subnets out of a tenant's address pool.
//!
//! Pools are plain values: they are serialized into the state store by their
//! owners, and their owners serialize access to them.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod bitset;
mod ipv4;
mod ipv6;
pub mod ranges;
mod subnet;
mod tags;

pub use self::{
    bitset::Bitset,
    ipv4::Ipv4Pool,
    ipv6::Ipv6Pool,
    ranges::{parse_tag_ranges, TagRange},
    subnet::SubnetPool,
    tags::{TagKind, TagPool, VxlanPair, VxlanPool},
};
use std::net::IpAddr;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No free value is left in the pool. The pool is unchanged.
    #[error("allocation failed - {pool} exhausted")]
    PoolExhausted { pool: String },

    /// A specific tag was requested that is outside the configured ranges or
    /// already in use.
    #[error("requested {kind} not available - {kind}:{tag}")]
    TagUnavailable { kind: TagKind, tag: u32 },

    #[error("address {addr} is outside of {pool}")]
    AddressOutOfRange { addr: IpAddr, pool: String },

    #[error("ip address {0} is not available")]
    AddressInUse(IpAddr),

    #[error("invalid range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("invalid subnet {subnet}: {reason}")]
    InvalidSubnet { subnet: String, reason: String },

    #[error("available local vlans ({available}) is less than possible vxlans ({required})")]
    InsufficientLocalVlans { available: u32, required: u32 },
}
