//! Desired configuration.
//!
//! An intent document describes every tenant with its networks, endpoint
//! groups, endpoints and policies. It drives both the create side of
//! reconciliation and `DeleteDelta`.

use crate::policy::Policy;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub tenants: Vec<ConfigTenant>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigTenant {
    pub name: String,
    /// `vlan` or `vxlan`; applies to networks that leave their tag type unset.
    pub default_net_type: String,
    /// Address pool that subnet-less networks are carved from.
    pub subnet_pool: Option<String>,
    pub alloc_subnet_len: Option<u8>,
    pub vlans: String,
    pub vxlans: String,
    pub networks: Vec<ConfigNetwork>,
    pub endpoint_groups: Vec<ConfigEndpointGroup>,
    pub policies: Vec<Policy>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigNetwork {
    pub name: String,
    /// `infra` marks an infrastructure network.
    pub nw_type: String,
    pub pkt_tag_type: String,
    /// Zero requests automatic allocation.
    pub pkt_tag: u32,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub ipv6_subnet: Option<String>,
    pub ipv6_gateway: Option<String>,
    pub endpoints: Vec<ConfigEndpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigEndpointGroup {
    pub name: String,
    pub network: String,
    /// Zero requests automatic allocation.
    pub group_id: u32,
    /// A private address range, `a.b.c.d-a.b.c.e`, inside the network subnet.
    pub ip_pool: Option<String>,
    /// Names of tenant policies attached to the group.
    pub policies: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigEndpoint {
    pub container: String,
    pub host: String,
    pub ip_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub group: Option<String>,
}

// === impl Config ===

impl Config {
    pub fn tenant(&self, name: &str) -> Option<&ConfigTenant> {
        self.tenants.iter().find(|t| t.name == name)
    }
}

// === impl ConfigTenant ===

impl ConfigTenant {
    pub fn network(&self, name: &str) -> Option<&ConfigNetwork> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn endpoint_group(&self, name: &str) -> Option<&ConfigEndpointGroup> {
        self.endpoint_groups.iter().find(|g| g.name == name)
    }

    /// Returns the tenant's policies with their tenant field filled in.
    pub fn policies(&self) -> impl Iterator<Item = Policy> + '_ {
        self.policies.iter().map(move |p| Policy {
            tenant: self.name.clone(),
            ..p.clone()
        })
    }
}
