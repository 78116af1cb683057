//! Policy compilation.
//!
//! Policies are attached to endpoint groups. Each attachment is an
//! [`EpgPolicy`] holding, for every rule of the policy, the directional rules
//! that were installed in the dataplane's [`RuleEngine`] on its behalf. The
//! attachment is persisted so that its rules can be re-installed after a
//! restart (see [`PolicyCompiler::restore`]).
//!
//! Operations on one attachment are serialized; operations on different
//! attachments may proceed concurrently.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod compile;
pub mod metrics;
mod record;


pub use self::{
    metrics::PolicyMetrics,
    record::{epg_policy_key, EpgPolicy, RuleMap},
};
use ahash::AHashMap as HashMap;
use netmaster_core::{
    policy::policy_key, Error, GroupResolver, Policy, RecordStore, Result, Rule, RuleEngine,
    StateStore,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Compiles policies into directional rules and tracks what was installed.
pub struct PolicyCompiler {
    store: Arc<dyn StateStore>,
    engine: Arc<dyn RuleEngine>,
    groups: Arc<dyn GroupResolver>,
    index: Mutex<HashMap<String, Slot>>,
    metrics: PolicyMetrics,
}

/// An attachment, or its absence, guarded for the duration of an operation.
type Slot = Arc<Mutex<Option<EpgPolicy>>>;

// === impl PolicyCompiler ===

impl PolicyCompiler {
    pub fn new(
        store: Arc<dyn StateStore>,
        engine: Arc<dyn RuleEngine>,
        groups: Arc<dyn GroupResolver>,
    ) -> Self {
        Self {
            store,
            engine,
            groups,
            index: Mutex::new(HashMap::new()),
            metrics: PolicyMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: PolicyMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Runs `f` with the attachment slot for `key` locked.
    ///
    /// Unless `create` is set, returns `None` when `key` is not indexed. The
    /// slot is re-checked against the index once locked, since a concurrent
    /// operation may have unindexed it in the meantime. A slot left empty by
    /// `f` is unindexed before its lock is released.
    fn with_slot<T>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(&mut Option<EpgPolicy>) -> T,
    ) -> Option<T> {
        loop {
            let slot = if create {
                self.index
                    .lock()
                    .entry(key.to_string())
                    .or_default()
                    .clone()
            } else {
                self.index.lock().get(key).cloned()?
            };

            let mut attachment = slot.lock();
            let indexed = self
                .index
                .lock()
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &slot));
            if !indexed {
                continue;
            }

            let out = f(&mut *attachment);
            if attachment.is_none() {
                self.index.lock().remove(key);
            }
            return Some(out);
        }
    }

    fn slots(&self) -> Vec<Slot> {
        self.index.lock().values().cloned().collect()
    }

    fn update_index_size(&self) {
        let size = self
            .slots()
            .iter()
            .filter(|slot| slot.lock().is_some())
            .count();
        self.metrics.set_index_size(size);
    }

    /// Attaches `policy` to endpoint group `group`, installing every rule.
    ///
    /// If a rule fails to install, the attachment is abandoned. Directional
    /// rules already installed for earlier rules of the policy stay in the
    /// rule engine.
    pub fn attach_policy(&self, group: &str, policy: &Policy) -> Result<EpgPolicy> {
        let key = epg_policy_key(&policy.tenant, group, &policy.name);
        let gp = self
            .with_slot(&key, true, |attachment| {
                if attachment.is_some() {
                    return Err(Error::AttachmentExists(key.clone()));
                }

                let group_id = self.groups.endpoint_group_id(&policy.tenant, group)?;
                let mut gp = EpgPolicy::new(&policy.tenant, group, &policy.name, group_id);
                tracing::info!(
                    epg_policy = %key,
                    group_id,
                    rules = policy.rules.len(),
                    "Attaching policy"
                );

                for rule in &policy.rules {
                    if let Err(error) = self.install(&mut gp, rule) {
                        tracing::error!(
                            %error,
                            epg_policy = %key,
                            rule = %rule.id,
                            "Failed to attach policy"
                        );
                        return Err(Error::AttachFailed {
                            epg_policy: key.clone(),
                            source: Box::new(error),
                        });
                    }
                }

                self.store.write_record(&gp)?;
                *attachment = Some(gp.clone());
                Ok(gp)
            })
            .unwrap_or_else(|| Err(Error::AttachmentNotFound(key.clone())))?;

        self.metrics
            .set_installed(&gp.tenant, &gp.endpoint_group, &gp.policy, gp.installed());
        self.update_index_size();
        Ok(gp)
    }

    /// Removes every rule of the attachment and then the attachment itself.
    pub fn detach_policy(&self, tenant: &str, group: &str, policy: &str) -> Result<()> {
        let key = epg_policy_key(tenant, group, policy);
        self.with_slot(&key, false, |attachment| {
            let mut gp = attachment
                .take()
                .ok_or_else(|| Error::AttachmentNotFound(key.clone()))?;

            let rules = gp.rule_maps.keys().cloned().collect::<Vec<_>>();
            for rule in rules {
                if let Err(error) = self.uninstall(&mut gp, &rule) {
                    *attachment = Some(gp);
                    return Err(error);
                }
            }
            if let Err(error) = self.store.clear_record::<EpgPolicy>(&key) {
                *attachment = Some(gp);
                return Err(error.into());
            }
            Ok(())
        })
        .unwrap_or_else(|| Err(Error::AttachmentNotFound(key.clone())))?;

        self.metrics.remove_attachment(tenant, group, policy);
        self.update_index_size();
        tracing::info!(epg_policy = %key, "Detached policy");
        Ok(())
    }

    /// Adds one rule to an existing attachment.
    pub fn add_rule(&self, epg_policy: &str, rule: &Rule) -> Result<()> {
        self.with_attachment(epg_policy, |gp| self.install(gp, rule))
    }

    /// Removes one rule from an existing attachment.
    pub fn del_rule(&self, epg_policy: &str, rule_id: &str) -> Result<()> {
        self.with_attachment(epg_policy, |gp| self.uninstall(gp, rule_id))
    }

    /// Adds `rule` to every attachment of `tenant`'s policy `policy`.
    ///
    /// Stops at the first attachment that fails.
    pub fn policy_add_rule(&self, tenant: &str, policy: &str, rule: &Rule) -> Result<()> {
        for key in self.attachments_of(tenant, policy) {
            self.add_rule(&key, rule)?;
        }
        Ok(())
    }

    /// Removes rule `rule_id` from every attachment of `tenant`'s policy
    /// `policy`.
    pub fn policy_del_rule(&self, tenant: &str, policy: &str, rule_id: &str) -> Result<()> {
        for key in self.attachments_of(tenant, policy) {
            self.del_rule(&key, rule_id)?;
        }
        Ok(())
    }

    /// Reloads persisted attachments and re-installs their rules.
    ///
    /// Rules that cannot be re-installed are dropped from the attachment and
    /// reported together once every attachment has been processed.
    pub fn restore(&self) -> Result<usize> {
        let mut errors = Vec::new();
        let records = self.store.read_all_records::<EpgPolicy>()?;
        let restored = records.len();

        for stored in records {
            let mut gp = EpgPolicy {
                rule_maps: Default::default(),
                ..stored.clone()
            };
            for map in stored.rule_maps.into_values() {
                tracing::debug!(epg_policy = %gp.key, rule = %map.rule.id, "Restoring rule");
                if let Err(error) = self.install(&mut gp, &map.rule) {
                    tracing::error!(
                        %error,
                        epg_policy = %gp.key,
                        rule = %map.rule.id,
                        "Failed to restore rule"
                    );
                    errors.push(error);
                }
            }
            self.store.write_record(&gp)?;
            self.metrics
                .set_installed(&gp.tenant, &gp.endpoint_group, &gp.policy, gp.installed());
            tracing::info!(
                epg_policy = %gp.key,
                rules = gp.rule_maps.len(),
                "Restored policy attachment"
            );
            let key = gp.key.clone();
            self.with_slot(&key, true, move |attachment| *attachment = Some(gp));
        }

        self.update_index_size();
        Error::aggregate(errors)?;
        Ok(restored)
    }

    pub fn attachment(&self, epg_policy: &str) -> Option<EpgPolicy> {
        let slot = self.index.lock().get(epg_policy).cloned()?;
        let gp = slot.lock().clone();
        gp
    }

    /// Returns every current attachment, ordered by key.
    pub fn attachments(&self) -> Vec<EpgPolicy> {
        let mut all = self
            .slots()
            .iter()
            .filter_map(|slot| slot.lock().clone())
            .collect::<Vec<_>>();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    fn attachments_of(&self, tenant: &str, policy: &str) -> Vec<String> {
        let policy = policy_key(tenant, policy);
        self.attachments()
            .into_iter()
            .filter(|gp| policy_key(&gp.tenant, &gp.policy) == policy)
            .map(|gp| gp.key)
            .collect()
    }

    /// Runs `f` against attachment `epg_policy` and persists the result.
    fn with_attachment(
        &self,
        epg_policy: &str,
        f: impl FnOnce(&mut EpgPolicy) -> Result<()>,
    ) -> Result<()> {
        let not_found = || Error::AttachmentNotFound(epg_policy.to_string());
        self.with_slot(epg_policy, false, |attachment| {
            let gp = attachment.as_mut().ok_or_else(not_found)?;
            let res = f(gp);
            // Installed or removed rules are recorded even when a later step
            // failed.
            self.store.write_record(&*gp)?;
            self.metrics
                .set_installed(&gp.tenant, &gp.endpoint_group, &gp.policy, gp.installed());
            res
        })
        .unwrap_or_else(|| Err(not_found()))
    }

    /// Compiles `rule` and installs its directional rules.
    fn install(&self, gp: &mut EpgPolicy, rule: &Rule) -> Result<()> {
        if gp.rule_maps.contains_key(&rule.id) {
            return Err(Error::RuleExists {
                rule: rule.id.clone(),
                epg_policy: gp.key.clone(),
            });
        }

        let protocol = rule.protocol_number()?;
        let remote = compile::resolve_remote(&gp.tenant, rule, &*self.groups)?;
        let mut directional = Vec::new();
        for &dir in compile::directions(rule, protocol) {
            let half = compile::directional(&gp.key, rule, protocol, gp.group_id, &remote, dir);
            if let Err(error) = self.engine.add_rule(&half) {
                self.metrics.rule_engine_error("add");
                return Err(Error::RuleEngine(error));
            }
            tracing::debug!(rule = %half.id, "Installed directional rule");
            directional.push(half);
        }

        tracing::info!(
            epg_policy = %gp.key,
            rule = %rule.id,
            directional = directional.len(),
            "Added rule"
        );
        gp.rule_maps.insert(
            rule.id.clone(),
            RuleMap {
                rule: rule.clone(),
                directional,
            },
        );
        Ok(())
    }

    /// Removes the directional rules installed for `rule_id`.
    ///
    /// Rule engine failures are logged and the rule is dropped regardless.
    fn uninstall(&self, gp: &mut EpgPolicy, rule_id: &str) -> Result<()> {
        let map = gp
            .rule_maps
            .remove(rule_id)
            .ok_or_else(|| Error::RuleNotFound {
                rule: rule_id.to_string(),
                epg_policy: gp.key.clone(),
            })?;

        for half in &map.directional {
            if let Err(error) = self.engine.del_rule(half) {
                self.metrics.rule_engine_error("del");
                tracing::warn!(%error, rule = %half.id, "Failed to remove directional rule");
            }
        }
        tracing::info!(epg_policy = %gp.key, rule = %rule_id, "Removed rule");
        Ok(())
    }
}

impl std::fmt::Debug for PolicyCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyCompiler")
            .field("attachments", &self.index.lock().len())
            .finish_non_exhaustive()
    }
}
