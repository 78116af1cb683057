//! Network state lifecycle.
//!
//! [`NetworkStateStore`] owns the tenant, network, endpoint group and endpoint
//! records kept in the state store. It validates intent, drives the resource
//! pools to satisfy allocations and persists the results.
//!
//! ```text
//! [ Tenant ] <- [ Network ] <- [ EndpointGroup ]
//!                    ^                ^
//!                    +-- [ Endpoint ] +
//! ```
//!
//! Every mutation reads a local copy of the records it touches, modifies the
//! copy and writes it back. There is no compare-and-swap at the store, so this
//! is only safe with a single active writer process. Within the process two
//! critical sections are serialized:
//!
//! - the allocation lock guards address pools and endpoint counters of networks
//!   and endpoint groups;
//! - a per-tenant lock guards the tenant's tag and subnet pools.
//!
//! When both are needed, the allocation lock is taken first.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoint;
mod endpoint_group;
pub mod metrics;
mod network;
mod reconcile;
mod records;
mod tenant;


pub use self::records::{
    endpoint_group_id, endpoint_id, mac_for, network_id, EndpointGroupState, EndpointState,
    NetworkState, PktTagType, TenantResources, TenantState,
};
use ahash::AHashMap as HashMap;
use netmaster_core::{Error, GroupResolver, IpNet, RecordStore, Result, StateStore};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::{fmt, str::FromStr, sync::Arc};

/// Process-wide settings of the state store.
#[derive(Clone, Debug, Default)]
pub struct StateConfig {
    /// In fabric mode every endpoint group on a VLAN network gets its own VLAN.
    pub fabric_mode: bool,
}

type TenantGuard = ArcMutexGuard<RawMutex, ()>;

pub struct NetworkStateStore {
    store: Arc<dyn StateStore>,
    config: StateConfig,
    alloc_lock: Mutex<()>,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

// === impl NetworkStateStore ===

impl NetworkStateStore {
    pub fn new(store: Arc<dyn StateStore>, config: StateConfig) -> Self {
        Self {
            store,
            config,
            alloc_lock: Mutex::new(()),
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared(store: Arc<dyn StateStore>, config: StateConfig) -> Arc<Self> {
        Arc::new(Self::new(store, config))
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Locks `tenant`'s tag and subnet pools.
    ///
    /// A lock that was unindexed by `delete_tenant` while this caller waited
    /// on it is abandoned for the current one.
    fn lock_tenant(&self, tenant: &str) -> TenantGuard {
        loop {
            let lock = self
                .tenant_locks
                .lock()
                .entry(tenant.to_string())
                .or_default()
                .clone();
            let guard = lock.lock_arc();
            let indexed = self
                .tenant_locks
                .lock()
                .get(tenant)
                .is_some_and(|current| Arc::ptr_eq(current, &lock));
            if indexed {
                return guard;
            }
        }
    }

    /// Drops `tenant`'s lock from the index. The caller holds it.
    fn unindex_tenant_lock(&self, tenant: &str) {
        self.tenant_locks.lock().remove(tenant);
    }

    fn read_network(&self, id: &str) -> Result<NetworkState> {
        self.store
            .read_record(id)?
            .ok_or_else(|| Error::not_found("network", id))
    }

    fn read_resources(&self, tenant: &str) -> Result<TenantResources> {
        self.store
            .read_record(tenant)?
            .ok_or_else(|| Error::not_found("tenant", tenant))
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantState> {
        self.store
            .read_record(name)?
            .ok_or_else(|| Error::not_found("tenant", name))
    }

    pub fn get_network(&self, tenant: &str, name: &str) -> Result<NetworkState> {
        self.read_network(&network_id(tenant, name))
    }

    pub fn get_endpoint_group(&self, tenant: &str, name: &str) -> Result<EndpointGroupState> {
        let id = endpoint_group_id(tenant, name);
        self.store
            .read_record(&id)?
            .ok_or(Error::GroupNotFound { group: id })
    }

    pub fn list_tenants(&self) -> Result<Vec<TenantState>> {
        Ok(self.store.read_all_records()?)
    }

    pub fn list_networks(&self) -> Result<Vec<NetworkState>> {
        Ok(self.store.read_all_records()?)
    }

    pub fn list_endpoint_groups(&self) -> Result<Vec<EndpointGroupState>> {
        Ok(self.store.read_all_records()?)
    }
}

impl std::fmt::Debug for NetworkStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStateStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GroupResolver for NetworkStateStore {
    fn endpoint_group_id(&self, tenant: &str, group: &str) -> Result<u32> {
        Ok(self.get_endpoint_group(tenant, group)?.group_id)
    }

    fn network_subnet(&self, tenant: &str, network: &str) -> Result<IpNet> {
        Ok(self.get_network(tenant, network)?.subnet.into())
    }
}

/// Parses an optional intent field. An empty string is treated as unset.
fn parse_field<T>(
    value: Option<&str>,
    what: &str,
    invalid: &dyn Fn(&str, &dyn fmt::Display) -> Error,
) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|e| invalid(what, &e)))
        .transpose()
}
