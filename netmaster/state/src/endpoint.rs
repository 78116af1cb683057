use crate::{
    endpoint_group_id, endpoint_id, mac_for, parse_field, EndpointGroupState, EndpointState,
    NetworkState, NetworkStateStore,
};
use netmaster_core::{intent::ConfigEndpoint, Error, RecordStore, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

// === impl NetworkStateStore ===

impl NetworkStateStore {
    /// Creates an endpoint on `network_id`, allocating its addresses.
    ///
    /// Creating an endpoint that already exists returns the existing record
    /// unchanged. The network, its endpoint group and the endpoint are written
    /// only after every allocation has succeeded.
    pub fn create_endpoint(
        &self,
        network_id: &str,
        config: &ConfigEndpoint,
    ) -> Result<EndpointState> {
        if config.container.is_empty() && config.host.is_empty() {
            return Err(Error::invalid(format!(
                "endpoint on {network_id}: a container or host is required"
            )));
        }
        let id = endpoint_id(network_id, &config.container, &config.host);
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            Error::invalid(format!("endpoint {id}: invalid {what}: {e}"))
        };
        let req_ipv4: Option<Ipv4Addr> =
            parse_field(config.ip_address.as_deref(), "ip address", &invalid)?;
        let req_ipv6: Option<Ipv6Addr> =
            parse_field(config.ipv6_address.as_deref(), "ipv6 address", &invalid)?;

        let _alloc = self.alloc_lock.lock();

        if let Some(existing) = self.store.read_record::<EndpointState>(&id)? {
            tracing::debug!(endpoint = %existing.id, "Endpoint exists");
            return Ok(existing);
        }

        let mut network = self.read_network(network_id)?;
        let mut group = match config.group.as_deref().filter(|g| !g.is_empty()) {
            Some(name) if !network.is_infra() => {
                let group_id = endpoint_group_id(&network.tenant, name);
                let group = self
                    .store
                    .read_record::<EndpointGroupState>(&group_id)?
                    .ok_or(Error::GroupNotFound { group: group_id })?;
                if group.network_id != network.id {
                    return Err(invalid(
                        "endpoint group",
                        &format!("{} belongs to {}", group.id, group.network_id),
                    ));
                }
                Some(group)
            }
            _ => None,
        };

        // Prefer the endpoint group's private pool when it has one.
        let (ipv4, from_group_pool) = match group.as_mut().and_then(|g| g.ip_pool.as_mut()) {
            Some(pool) => {
                let addr = match req_ipv4 {
                    Some(addr) => claim(pool.allocate_specific(addr)?, addr)?,
                    None => pool.allocate_next()?,
                };
                (addr, true)
            }
            None => {
                let pool = &mut network.ipv4_pool;
                let addr = match req_ipv4 {
                    Some(addr) => claim(pool.allocate_specific(addr)?, addr)?,
                    None => pool.allocate_next()?,
                };
                (addr, false)
            }
        };
        let ipv6 = match network.ipv6_pool.as_mut() {
            Some(pool) => Some(match req_ipv6 {
                Some(addr) => claim(pool.allocate_specific(addr)?, addr)?,
                None => pool.allocate_next()?,
            }),
            None => None,
        };

        network.ep_count += 1;
        if !from_group_pool {
            network.ep_addr_count += 1;
        }
        if let Some(group) = group.as_mut() {
            group.ep_count += 1;
        }

        let endpoint = EndpointState {
            id,
            network_id: network.id.clone(),
            container: config.container.clone(),
            host: config.host.clone(),
            ipv4: Some(ipv4),
            ipv6,
            mac: mac_for(ipv4),
            group_key: group.as_ref().map(|g| g.id.clone()),
            group_id: group.as_ref().map(|g| g.group_id).unwrap_or(0),
            from_group_pool,
        };

        self.store.write_record(&network)?;
        if let Some(group) = group.as_ref() {
            self.store.write_record(group)?;
        }
        self.store.write_record(&endpoint)?;
        tracing::info!(
            endpoint = %endpoint.id,
            ipv4 = %ipv4,
            mac = %endpoint.mac,
            group_id = endpoint.group_id,
            "Created endpoint"
        );
        Ok(endpoint)
    }

    /// Deletes an endpoint, returning its addresses.
    ///
    /// The endpoint record is cleared even when its network is already gone.
    pub fn delete_endpoint(&self, id: &str) -> Result<()> {
        let _alloc = self.alloc_lock.lock();
        self.delete_endpoint_locked(id)
    }

    fn delete_endpoint_locked(&self, id: &str) -> Result<()> {
        let endpoint = self
            .store
            .read_record::<EndpointState>(id)?
            .ok_or_else(|| Error::not_found("endpoint", id))?;

        let group = endpoint
            .group_key
            .as_deref()
            .and_then(|key| self.read_group_of(&endpoint, key));
        match self.store.read_record::<NetworkState>(&endpoint.network_id) {
            Ok(Some(network)) => self.release_endpoint(&endpoint, network, group)?,
            Ok(None) => {
                tracing::warn!(
                    endpoint = %id,
                    network = %endpoint.network_id,
                    "Network missing; clearing endpoint"
                );
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    endpoint = %id,
                    network = %endpoint.network_id,
                    "Failed to read network; clearing endpoint"
                );
            }
        }

        self.store.clear_record::<EndpointState>(id)?;
        tracing::info!(endpoint = %id, "Deleted endpoint");
        Ok(())
    }

    fn read_group_of(&self, endpoint: &EndpointState, key: &str) -> Option<EndpointGroupState> {
        match self.store.read_record::<EndpointGroupState>(key) {
            Ok(group) => group,
            Err(error) => {
                tracing::warn!(
                    %error,
                    endpoint = %endpoint.id,
                    group = %key,
                    "Failed to read endpoint group"
                );
                None
            }
        }
    }

    fn release_endpoint(
        &self,
        endpoint: &EndpointState,
        mut network: NetworkState,
        mut group: Option<EndpointGroupState>,
    ) -> Result<()> {
        if let Some(addr) = endpoint.ipv4 {
            let pool = match group.as_mut().and_then(|g| g.ip_pool.as_mut()) {
                Some(pool) if endpoint.from_group_pool => pool,
                _ => &mut network.ipv4_pool,
            };
            if let Err(error) = pool.release(addr) {
                tracing::warn!(%error, endpoint = %endpoint.id, "Failed to release address");
            }
            if !endpoint.from_group_pool {
                network.ep_addr_count = network.ep_addr_count.saturating_sub(1);
            }
        }
        if let (Some(addr), Some(pool)) = (endpoint.ipv6, network.ipv6_pool.as_mut()) {
            if let Err(error) = pool.release(addr) {
                tracing::warn!(%error, endpoint = %endpoint.id, "Failed to release ipv6 address");
            }
        }

        network.ep_count = network.ep_count.saturating_sub(1);
        self.store.write_record(&network)?;
        if let Some(mut group) = group {
            group.ep_count = group.ep_count.saturating_sub(1);
            self.store.write_record(&group)?;
        }
        Ok(())
    }

    /// Deletes every endpoint homed on `host`, returning their ids.
    pub fn delete_endpoints_on_host(&self, host: &str) -> Result<Vec<String>> {
        let _alloc = self.alloc_lock.lock();

        let mut deleted = Vec::new();
        let mut errors = Vec::new();
        let endpoints = self.list_endpoints()?;
        for endpoint in endpoints.into_iter().filter(|ep| ep.host == host) {
            match self.delete_endpoint_locked(&endpoint.id) {
                Ok(()) => deleted.push(endpoint.id),
                Err(error) => {
                    tracing::error!(
                        %error,
                        endpoint = %endpoint.id,
                        %host,
                        "Failed to delete endpoint"
                    );
                    errors.push(error);
                }
            }
        }
        Error::aggregate(errors)?;
        Ok(deleted)
    }

    pub fn read_endpoint(&self, id: &str) -> Result<EndpointState> {
        self.store
            .read_record(id)?
            .ok_or_else(|| Error::not_found("endpoint", id))
    }

    pub fn list_endpoints(&self) -> Result<Vec<EndpointState>> {
        Ok(self.store.read_all_records()?)
    }
}

/// Rejects an explicitly requested address that another endpoint holds.
fn claim<A: Copy + Into<IpAddr>>(newly: bool, addr: A) -> Result<A> {
    if !newly {
        return Err(netmaster_resources::Error::AddressInUse(addr.into()).into());
    }
    Ok(addr)
}
