use crate::{
    network_id, parse_field, EndpointGroupState, NetworkState, NetworkStateStore, PktTagType,
    TenantResources,
};
use netmaster_core::{
    intent::ConfigNetwork, Error, Ipv4Net, Ipv6Net, RecordStore, Result, NW_TYPE_INFRA,
};
use netmaster_resources::{Ipv4Pool, Ipv6Pool, VxlanPair};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Network intent that passed validation.
struct NetworkSpec {
    id: String,
    tenant: String,
    name: String,
    nw_type: String,
    /// `None` when unset; `Some(None)` for an explicitly untagged network.
    pkt_tag_type: Option<Option<PktTagType>>,
    pkt_tag: u32,
    subnet: Option<Ipv4Net>,
    gateway: Option<Ipv4Addr>,
    ipv6_subnet: Option<Ipv6Net>,
    ipv6_gateway: Option<Ipv6Addr>,
}

// === impl NetworkStateStore ===

impl NetworkStateStore {
    /// Creates a network in `tenant`.
    ///
    /// The intent is validated before any pool is touched. Creating a network
    /// that already exists returns the existing record unchanged; changed
    /// fields are not applied.
    pub fn create_network(&self, tenant: &str, config: &ConfigNetwork) -> Result<NetworkState> {
        let spec = NetworkSpec::validate(tenant, config)?;

        let _guard = self.lock_tenant(tenant);

        if let Some(existing) = self.store.read_record::<NetworkState>(&spec.id)? {
            tracing::debug!(network = %existing.id, "Network exists");
            return Ok(existing);
        }

        let tenant_state = self.get_tenant(tenant)?;
        let original = self.read_resources(tenant)?;
        let mut resources = original.clone();

        let (subnet, subnet_is_allocated) = match spec.subnet {
            Some(subnet) => (subnet, false),
            None => match resources.subnets.as_mut() {
                Some(pool) => (pool.allocate()?, true),
                None => {
                    return Err(Error::invalid(format!(
                        "network {}: a subnet is required when tenant {tenant} has no subnet pool",
                        spec.id
                    )))
                }
            },
        };
        let ipv4_pool = Ipv4Pool::for_subnet(subnet, spec.gateway)?;
        let ipv6_pool = spec
            .ipv6_subnet
            .map(|net| Ipv6Pool::new(net, spec.ipv6_gateway))
            .transpose()?;

        // An unset tag type falls back to the tenant default, then to VLAN.
        let pkt_tag_type = spec
            .pkt_tag_type
            .unwrap_or(Some(tenant_state.default_net_type.unwrap_or(PktTagType::Vlan)));
        let (pkt_tag, ext_pkt_tag) = match pkt_tag_type {
            Some(PktTagType::Vlan) => (resources.vlans.allocate(spec.pkt_tag)?, 0),
            Some(PktTagType::Vxlan) => {
                let VxlanPair { vxlan, local_vlan } = resources.vxlans.allocate(spec.pkt_tag)?;
                (local_vlan, vxlan)
            }
            None => (0, 0),
        };

        let network = NetworkState {
            id: spec.id,
            tenant: spec.tenant,
            name: spec.name,
            nw_type: spec.nw_type,
            pkt_tag_type,
            pkt_tag,
            ext_pkt_tag,
            subnet,
            subnet_is_allocated,
            gateway: spec.gateway,
            ipv4_pool,
            ipv6_subnet: spec.ipv6_subnet,
            ipv6_gateway: spec.ipv6_gateway,
            ipv6_pool,
            ep_count: 0,
            ep_addr_count: 0,
        };

        self.store.write_record(&resources)?;
        if let Err(error) = self.store.write_record(&network) {
            // Put back the tags taken for the unrecorded network.
            if let Err(restore) = self.store.write_record(&original) {
                tracing::error!(error = %restore, tenant, "Failed to restore tenant resources");
            }
            return Err(error.into());
        }

        if network.is_infra() {
            tracing::debug!(
                network = %network.id,
                "Infrastructure network; skipping dataplane network"
            );
        }
        tracing::info!(
            network = %network.id,
            subnet = %network.subnet,
            pkt_tag_type = ?network.pkt_tag_type,
            pkt_tag = network.pkt_tag,
            ext_pkt_tag = network.ext_pkt_tag,
            "Created network"
        );
        Ok(network)
    }

    /// Deletes a network, returning its tags and subnet to the tenant.
    ///
    /// Fails while a non-infrastructure network has endpoints, or while
    /// endpoint groups reference it.
    pub fn delete_network(&self, id: &str) -> Result<()> {
        let _alloc = self.alloc_lock.lock();

        let network = self.read_network(id)?;
        if !network.is_infra() && network.ep_count != 0 {
            return Err(Error::NetworkHasActiveEndpoints {
                network: network.id,
                endpoints: network.ep_count,
            });
        }
        if let Some(group) = self
            .store
            .read_all_records::<EndpointGroupState>()?
            .into_iter()
            .find(|g| g.network_id == network.id)
        {
            return Err(Error::invalid(format!(
                "network {} is in use by endpoint group {}",
                network.id, group.id
            )));
        }

        let _guard = self.lock_tenant(&network.tenant);

        match self.store.read_record::<TenantResources>(&network.tenant)? {
            Some(mut resources) => {
                match network.pkt_tag_type {
                    Some(PktTagType::Vlan) => {
                        resources.vlans.free(network.pkt_tag);
                    }
                    Some(PktTagType::Vxlan) => {
                        resources.vxlans.free(VxlanPair {
                            vxlan: network.ext_pkt_tag,
                            local_vlan: network.pkt_tag,
                        });
                    }
                    None => {}
                }
                if network.subnet_is_allocated {
                    if let Some(pool) = resources.subnets.as_mut() {
                        pool.free(network.subnet)?;
                    }
                }
                self.store.write_record(&resources)?;
            }
            None => {
                tracing::warn!(
                    network = %network.id,
                    tenant = %network.tenant,
                    "Tenant resources missing; tags not returned"
                );
            }
        }

        self.store.clear_record::<NetworkState>(id)?;
        tracing::info!(network = %id, "Deleted network");
        Ok(())
    }
}

// === impl NetworkSpec ===

impl NetworkSpec {
    fn validate(tenant: &str, config: &ConfigNetwork) -> Result<Self> {
        if tenant.is_empty() || config.name.is_empty() {
            return Err(Error::invalid("network and tenant names must not be empty"));
        }
        let id = network_id(tenant, &config.name);
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            Error::invalid(format!("network {id}: invalid {what}: {e}"))
        };

        if !config.nw_type.is_empty()
            && config.nw_type != NW_TYPE_INFRA
            && config.nw_type != "data"
        {
            return Err(invalid("network type", &config.nw_type));
        }

        let pkt_tag_type = match config.pkt_tag_type.as_str() {
            "" => None,
            "none" => Some(None),
            s => Some(Some(
                s.parse::<PktTagType>()
                    .map_err(|e| invalid("packet tag type", &e))?,
            )),
        };
        if config.pkt_tag != 0 && pkt_tag_type == Some(None) {
            return Err(invalid(
                "packet tag",
                &"untagged networks cannot request a tag",
            ));
        }

        let subnet: Option<Ipv4Net> = parse_field(config.subnet.as_deref(), "subnet", &invalid)?;
        let gateway: Option<Ipv4Addr> =
            parse_field(config.gateway.as_deref(), "gateway", &invalid)?;
        match (subnet, gateway) {
            (Some(subnet), Some(gw)) if !subnet.contains(&gw) => {
                return Err(invalid("gateway", &format!("{gw} is not in {subnet}")));
            }
            (None, Some(gw)) => {
                return Err(invalid(
                    "gateway",
                    &format!("{gw} requires an explicit subnet"),
                ));
            }
            _ => {}
        }

        let ipv6_subnet: Option<Ipv6Net> =
            parse_field(config.ipv6_subnet.as_deref(), "ipv6 subnet", &invalid)?;
        let ipv6_gateway: Option<Ipv6Addr> =
            parse_field(config.ipv6_gateway.as_deref(), "ipv6 gateway", &invalid)?;
        match (ipv6_subnet, ipv6_gateway) {
            (Some(subnet), Some(gw)) if !subnet.contains(&gw) => {
                return Err(invalid("ipv6 gateway", &format!("{gw} is not in {subnet}")));
            }
            (None, Some(gw)) => {
                return Err(invalid(
                    "ipv6 gateway",
                    &format!("{gw} requires an ipv6 subnet"),
                ));
            }
            _ => {}
        }

        Ok(Self {
            id,
            tenant: tenant.to_string(),
            name: config.name.clone(),
            nw_type: config.nw_type.clone(),
            pkt_tag_type,
            pkt_tag: config.pkt_tag,
            subnet,
            gateway,
            ipv6_subnet,
            ipv6_gateway,
        })
    }
}
