use netmaster_core::{Ipv4Net, Ipv6Net, Record, NW_TYPE_INFRA};
use netmaster_resources::{Ipv4Pool, Ipv6Pool, SubnetPool, TagPool, VxlanPool};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantState {
    pub name: String,
    pub default_net_type: Option<PktTagType>,
    pub subnet_pool: Option<Ipv4Net>,
    pub alloc_subnet_len: Option<u8>,
    pub vlans: String,
    pub vxlans: String,
}

/// The tag and subnet pools of a tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantResources {
    pub tenant: String,
    pub vlans: TagPool,
    pub vxlans: VxlanPool,
    pub epg_ids: TagPool,
    pub subnets: Option<SubnetPool>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PktTagType {
    Vlan,
    Vxlan,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    /// `<name>.<tenant>`
    pub id: String,
    pub tenant: String,
    pub name: String,
    pub nw_type: String,

    /// Untagged networks carry no packet tag.
    pub pkt_tag_type: Option<PktTagType>,
    /// The VLAN of a VLAN network, or the local VLAN of a VXLAN network.
    pub pkt_tag: u32,
    /// The VXLAN id of a VXLAN network.
    pub ext_pkt_tag: u32,

    pub subnet: Ipv4Net,
    /// Set when the subnet was carved from the tenant's subnet pool.
    pub subnet_is_allocated: bool,
    pub gateway: Option<Ipv4Addr>,
    pub ipv4_pool: Ipv4Pool,

    pub ipv6_subnet: Option<Ipv6Net>,
    pub ipv6_gateway: Option<Ipv6Addr>,
    pub ipv6_pool: Option<Ipv6Pool>,

    pub ep_count: u32,
    /// Endpoints holding an address from the network's own pool.
    pub ep_addr_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointGroupState {
    /// `<group>:<tenant>`
    pub id: String,
    pub tenant: String,
    pub name: String,
    pub network_id: String,
    pub group_id: u32,

    pub pkt_tag_type: Option<PktTagType>,
    pub pkt_tag: u32,
    /// Set when the group holds its own VLAN (fabric mode).
    pub owns_pkt_tag: bool,

    pub ip_range: Option<(Ipv4Addr, Ipv4Addr)>,
    pub ip_pool: Option<Ipv4Pool>,

    pub ep_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointState {
    /// `<networkID>-<containerID>`, or `<networkID>-<host>-native-intf` for
    /// host endpoints.
    pub id: String,
    pub network_id: String,
    pub container: String,
    pub host: String,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub mac: String,
    /// `<group>:<tenant>` of the endpoint's group, if any.
    pub group_key: Option<String>,
    pub group_id: u32,
    /// Set when the address came from the endpoint group's private pool.
    pub from_group_pool: bool,
}

// === impl Record ===

impl Record for TenantState {
    const PREFIX: &'static str = "/netmaster/state/tenants/";

    fn id(&self) -> String {
        self.name.clone()
    }
}

impl Record for TenantResources {
    const PREFIX: &'static str = "/netmaster/state/resources/";

    fn id(&self) -> String {
        self.tenant.clone()
    }
}

impl Record for NetworkState {
    const PREFIX: &'static str = "/netmaster/state/networks/";

    fn id(&self) -> String {
        self.id.clone()
    }
}

impl Record for EndpointGroupState {
    const PREFIX: &'static str = "/netmaster/state/epg/";

    fn id(&self) -> String {
        self.id.clone()
    }
}

impl Record for EndpointState {
    const PREFIX: &'static str = "/netmaster/state/endpoints/";

    fn id(&self) -> String {
        self.id.clone()
    }
}

// === impl PktTagType ===

impl std::str::FromStr for PktTagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vlan" => Ok(Self::Vlan),
            "vxlan" => Ok(Self::Vxlan),
            _ => Err(format!("invalid packet tag type {s:?}")),
        }
    }
}

impl std::fmt::Display for PktTagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vlan => "vlan".fmt(f),
            Self::Vxlan => "vxlan".fmt(f),
        }
    }
}

// === impl NetworkState ===

impl NetworkState {
    pub fn is_infra(&self) -> bool {
        self.nw_type == NW_TYPE_INFRA
    }
}

pub fn network_id(tenant: &str, network: &str) -> String {
    format!("{network}.{tenant}")
}

pub fn endpoint_group_id(tenant: &str, group: &str) -> String {
    format!("{group}:{tenant}")
}

/// The endpoint id of a container, or of a host's native interface when no
/// container is named.
pub fn endpoint_id(network_id: &str, container: &str, host: &str) -> String {
    if container.is_empty() {
        format!("{network_id}-{host}-native-intf")
    } else {
        format!("{network_id}-{container}")
    }
}

/// Derives an endpoint's MAC address from its IPv4 address.
pub fn mac_for(addr: Ipv4Addr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("02:02:{a:02x}:{b:02x}:{c:02x}:{d:02x}")
}
