use crate::{endpoint_group_id, endpoint_id, network_id, NetworkStateStore};
use ahash::AHashSet as HashSet;
use netmaster_core::{intent::Config, Error, Result};

// === impl NetworkStateStore ===

impl NetworkStateStore {
    /// Creates everything `config` names that does not exist yet: tenants,
    /// then their networks, endpoint groups and endpoints.
    ///
    /// Existing records are left unchanged. A failure is logged and does not
    /// stop the remaining items; the failures are returned together. Items
    /// beneath a tenant that could not be created are skipped.
    pub fn process_additions(&self, config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        for tenant in &config.tenants {
            if let Err(error) = self.create_tenant(tenant) {
                tracing::error!(%error, tenant = %tenant.name, "Failed to create tenant");
                errors.push(error);
                continue;
            }

            for network in &tenant.networks {
                if let Err(error) = self.create_network(&tenant.name, network) {
                    tracing::error!(
                        %error,
                        tenant = %tenant.name,
                        network = %network.name,
                        "Failed to create network"
                    );
                    errors.push(error);
                }
            }

            for group in &tenant.endpoint_groups {
                if let Err(error) = self.create_endpoint_group(&tenant.name, group) {
                    tracing::error!(
                        %error,
                        tenant = %tenant.name,
                        group = %group.name,
                        "Failed to create endpoint group"
                    );
                    errors.push(error);
                }
            }

            for network in &tenant.networks {
                let net_id = network_id(&tenant.name, &network.name);
                for endpoint in &network.endpoints {
                    if let Err(error) = self.create_endpoint(&net_id, endpoint) {
                        tracing::error!(
                            %error,
                            network = %net_id,
                            container = %endpoint.container,
                            "Failed to create endpoint"
                        );
                        errors.push(error);
                    }
                }
            }
        }

        Error::aggregate(errors)
    }

    /// Removes every persisted record that `config` does not name.
    ///
    /// Endpoints are removed first, then endpoint groups, then networks, then
    /// tenants, so that parents are empty by the time they are deleted. A
    /// failed deletion is logged and does not stop the rest; the failures are
    /// returned together.
    pub fn delete_delta(&self, config: &Config) -> Result<()> {
        let mut tenants = HashSet::new();
        let mut networks = HashSet::new();
        let mut groups = HashSet::new();
        let mut endpoints = HashSet::new();
        for tenant in &config.tenants {
            tenants.insert(tenant.name.clone());
            for network in &tenant.networks {
                let net_id = network_id(&tenant.name, &network.name);
                for ep in &network.endpoints {
                    endpoints.insert(endpoint_id(&net_id, &ep.container, &ep.host));
                }
                networks.insert(net_id);
            }
            for group in &tenant.endpoint_groups {
                groups.insert(endpoint_group_id(&tenant.name, &group.name));
            }
        }

        let mut errors = Vec::new();

        for ep in self.list_endpoints()? {
            if !endpoints.contains(&ep.id) {
                if let Err(error) = self.delete_endpoint(&ep.id) {
                    tracing::error!(%error, endpoint = %ep.id, "Failed to delete endpoint");
                    errors.push(error);
                }
            }
        }

        for group in self.list_endpoint_groups()? {
            if !groups.contains(&group.id) {
                if let Err(error) = self.delete_endpoint_group(&group.tenant, &group.name) {
                    tracing::error!(%error, group = %group.id, "Failed to delete endpoint group");
                    errors.push(error);
                }
            }
        }

        for network in self.list_networks()? {
            if !networks.contains(&network.id) {
                if let Err(error) = self.delete_network(&network.id) {
                    tracing::error!(%error, network = %network.id, "Failed to delete network");
                    errors.push(error);
                }
            }
        }

        for tenant in self.list_tenants()? {
            if !tenants.contains(&tenant.name) {
                if let Err(error) = self.delete_tenant(&tenant.name) {
                    tracing::error!(%error, tenant = %tenant.name, "Failed to delete tenant");
                    errors.push(error);
                }
            }
        }

        Error::aggregate(errors)
    }
}
