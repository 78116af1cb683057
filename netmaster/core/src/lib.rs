#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
pub mod intent;
pub mod policy;
pub mod rule;
pub mod store;

pub use self::{
    error::{Error, Result},
    policy::{Action, Policy, Rule, RuleDirection},
    rule::{Direction, DirectionalRule, GroupResolver, RuleEngine},
    store::{MemStore, Record, RecordStore, StateStore, StoreError},
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
pub use netmaster_resources as resources;

/// Packet-tag type names accepted for networks and tenants.
pub const PKT_TAG_VLAN: &str = "vlan";
pub const PKT_TAG_VXLAN: &str = "vxlan";

/// Network type of infrastructure networks. Their endpoints are managed
/// externally and they do not guard deletion on endpoint counts.
pub const NW_TYPE_INFRA: &str = "infra";
