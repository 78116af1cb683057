use crate::{
    parse_field, NetworkState, NetworkStateStore, PktTagType, TenantResources, TenantState,
};
use netmaster_core::{intent::ConfigTenant, Error, Ipv4Net, RecordStore, Result};
use netmaster_resources::{parse_tag_ranges, SubnetPool, TagKind, TagPool, VxlanPool};

/// Endpoint group ids are drawn from this range in every tenant.
const EPG_ID_RANGE: &str = "1-4095";

// === impl NetworkStateStore ===

impl NetworkStateStore {
    /// Creates a tenant and its resource pools.
    ///
    /// Creating a tenant that already exists returns the existing record
    /// unchanged.
    pub fn create_tenant(&self, config: &ConfigTenant) -> Result<TenantState> {
        let (tenant, resources) = build_tenant(config)?;

        let _guard = self.lock_tenant(&tenant.name);

        if let Some(existing) = self.store.read_record::<TenantState>(&tenant.name)? {
            tracing::debug!(tenant = %existing.name, "Tenant exists");
            return Ok(existing);
        }

        self.store.write_record(&resources)?;
        self.store.write_record(&tenant)?;
        tracing::info!(
            tenant = %tenant.name,
            vlans = %tenant.vlans,
            vxlans = %tenant.vxlans,
            "Created tenant"
        );
        Ok(tenant)
    }

    /// Deletes a tenant. Fails while any of its networks remain.
    pub fn delete_tenant(&self, name: &str) -> Result<()> {
        let _guard = self.lock_tenant(name);

        if self.store.read_record::<TenantState>(name)?.is_none() {
            self.unindex_tenant_lock(name);
            return Err(Error::not_found("tenant", name));
        }
        let networks = self
            .store
            .read_all_records::<NetworkState>()?
            .into_iter()
            .filter(|n| n.tenant == name)
            .count();
        if networks != 0 {
            return Err(Error::TenantHasNetworks {
                tenant: name.to_string(),
                networks,
            });
        }

        self.store.clear_record::<TenantResources>(name)?;
        self.store.clear_record::<TenantState>(name)?;
        self.unindex_tenant_lock(name);
        tracing::info!(tenant = %name, "Deleted tenant");
        Ok(())
    }

    /// Returns the number of VLANs in use by `tenant` and a listing of them.
    pub fn vlans_in_use(&self, tenant: &str) -> Result<(u32, String)> {
        Ok(self.read_resources(tenant)?.vlans.in_use())
    }

    /// Returns the number of VXLANs in use by `tenant` and a listing of them.
    pub fn vxlans_in_use(&self, tenant: &str) -> Result<(u32, String)> {
        Ok(self.read_resources(tenant)?.vxlans.vxlans().in_use())
    }
}

/// Validates tenant intent and builds its records. Nothing is persisted.
fn build_tenant(config: &ConfigTenant) -> Result<(TenantState, TenantResources)> {
    if config.name.is_empty() {
        return Err(Error::invalid("tenant name must not be empty"));
    }
    let invalid = |what: &str, e: &dyn std::fmt::Display| {
        Error::invalid(format!("tenant {}: invalid {what}: {e}", config.name))
    };

    let default_net_type = match config.default_net_type.as_str() {
        "" => None,
        s => Some(
            s.parse::<PktTagType>()
                .map_err(|e| invalid("default network type", &e))?,
        ),
    };

    let subnet_pool: Option<Ipv4Net> =
        parse_field(config.subnet_pool.as_deref(), "subnet pool", &invalid)?;
    let subnets = match (subnet_pool, config.alloc_subnet_len) {
        (Some(pool), Some(len)) => {
            let pool = SubnetPool::new(pool, len).map_err(|e| invalid("subnet pool", &e))?;
            Some(pool)
        }
        (Some(pool), None) => {
            return Err(invalid(
                "subnet pool",
                &format!("{pool} requires an allocation length"),
            ))
        }
        (None, _) => None,
    };

    let vlan_ranges = parse_tag_ranges(&config.vlans, TagKind::Vlan.limit())
        .map_err(|e| invalid("vlans", &e))?;
    let vxlan_ranges = parse_tag_ranges(&config.vxlans, TagKind::Vxlan.limit())
        .map_err(|e| invalid("vxlans", &e))?;
    let vxlans = VxlanPool::new(vxlan_ranges, &vlan_ranges).map_err(|e| invalid("vxlans", &e))?;
    let vlans = TagPool::new(TagKind::Vlan, vlan_ranges)?;
    let epg_ids = TagPool::parse(TagKind::EndpointGroup, EPG_ID_RANGE)?;

    let tenant = TenantState {
        name: config.name.clone(),
        default_net_type,
        subnet_pool,
        alloc_subnet_len: config.alloc_subnet_len,
        vlans: config.vlans.clone(),
        vxlans: config.vxlans.clone(),
    };
    let resources = TenantResources {
        tenant: config.name.clone(),
        vlans,
        vxlans,
        epg_ids,
        subnets,
    };
    Ok((tenant, resources))
}
