use crate::{
    endpoint_group_id, network_id, EndpointGroupState, NetworkState, NetworkStateStore,
    PktTagType, TenantResources,
};
use netmaster_core::{intent::ConfigEndpointGroup, Error, RecordStore, Result};
use netmaster_resources::Ipv4Pool;
use std::net::Ipv4Addr;

// === impl NetworkStateStore ===

impl NetworkStateStore {
    /// Creates an endpoint group on one of `tenant`'s networks.
    ///
    /// The group draws a numeric id from the tenant (the requested one, if
    /// any). A private address range is carved out of the network's pool. In
    /// fabric mode the group also gets its own VLAN.
    pub fn create_endpoint_group(
        &self,
        tenant: &str,
        config: &ConfigEndpointGroup,
    ) -> Result<EndpointGroupState> {
        if config.name.is_empty() || config.network.is_empty() {
            return Err(Error::invalid(
                "endpoint group and network names must not be empty",
            ));
        }
        let id = endpoint_group_id(tenant, &config.name);
        let ip_range = match config.ip_pool.as_deref().filter(|s| !s.is_empty()) {
            Some(pool) => {
                let range = parse_ip_range(pool)
                    .map_err(|e| Error::invalid(format!("endpoint group {id}: {e}")))?;
                Some(range)
            }
            None => None,
        };

        let _alloc = self.alloc_lock.lock();
        let _guard = self.lock_tenant(tenant);

        if let Some(existing) = self.store.read_record::<EndpointGroupState>(&id)? {
            tracing::debug!(group = %existing.id, "Endpoint group exists");
            return Ok(existing);
        }

        let mut network = self.read_network(&network_id(tenant, &config.network))?;
        let fabric_vlan = self.config.fabric_mode && !network.is_infra();
        if fabric_vlan && network.pkt_tag_type != Some(PktTagType::Vlan) {
            return Err(Error::invalid(format!(
                "endpoint group {id}: fabric mode requires a vlan network, {} is not",
                network.id
            )));
        }
        let mut resources = self.read_resources(tenant)?;

        let ip_pool = match ip_range {
            Some((first, last)) => {
                network.ipv4_pool.reserve_range(first, last)?;
                Some(Ipv4Pool::for_range(first, last)?)
            }
            None => None,
        };
        let group_id = resources.epg_ids.allocate(config.group_id)?;
        let (pkt_tag_type, pkt_tag) = if fabric_vlan {
            match resources.vlans.allocate(0) {
                Ok(vlan) => (Some(PktTagType::Vlan), vlan),
                Err(error) => {
                    resources.epg_ids.free(group_id);
                    return Err(error.into());
                }
            }
        } else {
            (network.pkt_tag_type, network.pkt_tag)
        };

        let group = EndpointGroupState {
            id,
            tenant: tenant.to_string(),
            name: config.name.clone(),
            network_id: network.id.clone(),
            group_id,
            pkt_tag_type,
            pkt_tag,
            owns_pkt_tag: fabric_vlan,
            ip_range,
            ip_pool,
            ep_count: 0,
        };

        self.store.write_record(&resources)?;
        if ip_range.is_some() {
            self.store.write_record(&network)?;
        }
        self.store.write_record(&group)?;
        tracing::info!(
            group = %group.id,
            network = %group.network_id,
            group_id = group.group_id,
            pkt_tag = group.pkt_tag,
            "Created endpoint group"
        );
        Ok(group)
    }

    /// Deletes an endpoint group, returning its id, its VLAN (fabric mode) and
    /// its private address range.
    ///
    /// Fails without changing anything while the group has endpoints.
    pub fn delete_endpoint_group(&self, tenant: &str, name: &str) -> Result<()> {
        let id = endpoint_group_id(tenant, name);

        let _alloc = self.alloc_lock.lock();
        let _guard = self.lock_tenant(tenant);

        let group = self
            .store
            .read_record::<EndpointGroupState>(&id)?
            .ok_or_else(|| Error::GroupNotFound { group: id.clone() })?;
        if group.ep_count != 0 {
            return Err(Error::GroupHasActiveEndpoints {
                group: group.id,
                endpoints: group.ep_count,
            });
        }

        match self.store.read_record::<TenantResources>(tenant)? {
            Some(mut resources) => {
                resources.epg_ids.free(group.group_id);
                if group.owns_pkt_tag {
                    resources.vlans.free(group.pkt_tag);
                }
                self.store.write_record(&resources)?;
            }
            None => tracing::warn!(group = %id, "Tenant resources missing; group id not returned"),
        }

        if let Some((first, last)) = group.ip_range {
            match self.store.read_record::<NetworkState>(&group.network_id)? {
                Some(mut network) => {
                    network.ipv4_pool.release_range(first, last)?;
                    self.store.write_record(&network)?;
                }
                None => {
                    tracing::warn!(
                        group = %id,
                        network = %group.network_id,
                        "Network missing; range not returned"
                    );
                }
            }
        }

        self.store.clear_record::<EndpointGroupState>(&id)?;
        tracing::info!(group = %id, "Deleted endpoint group");
        Ok(())
    }
}

/// Reads an inclusive range such as `10.1.1.10-10.1.1.20`.
fn parse_ip_range(s: &str) -> std::result::Result<(Ipv4Addr, Ipv4Addr), String> {
    let (first, last) = s
        .split_once('-')
        .ok_or_else(|| format!("invalid ip pool {s:?}: expected <first>-<last>"))?;
    let parse = |a: &str| {
        a.trim()
            .parse::<Ipv4Addr>()
            .map_err(|e| format!("invalid ip pool {s:?}: {e}"))
    };
    let (first, last) = (parse(first)?, parse(last)?);
    if first > last {
        return Err(format!("invalid ip pool {s:?}: range must be increasing"));
    }
    Ok((first, last))
}
