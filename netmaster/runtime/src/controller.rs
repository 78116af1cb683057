use ahash::AHashSet as HashSet;
use anyhow::Context;
use netmaster_core::{intent::Config, Error, Policy, Result, RuleEngine, StateStore};
use netmaster_policy::{epg_policy_key, PolicyCompiler, PolicyMetrics};
use netmaster_state::{NetworkStateStore, StateConfig};
use prometheus_client::registry::Registry;
use std::{collections::BTreeMap, path::Path, sync::Arc};

/// Drives the state store and policy compiler toward a desired [`Config`].
#[derive(Debug)]
pub struct Controller {
    state: Arc<NetworkStateStore>,
    policies: PolicyCompiler,
}

/// Reads an intent file.
pub fn load_intent(path: &Path) -> anyhow::Result<Config> {
    let display = path.display();
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {display}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {display}"))
}

// === impl Controller ===

impl Controller {
    pub fn new(
        store: Arc<dyn StateStore>,
        config: StateConfig,
        engine: Arc<dyn RuleEngine>,
        prom: &mut Registry,
    ) -> Self {
        let state = NetworkStateStore::shared(store.clone(), config);
        netmaster_state::metrics::register(prom, state.clone());
        let metrics = PolicyMetrics::register(prom);
        let policies = PolicyCompiler::new(store, engine, state.clone()).with_metrics(metrics);
        Self { state, policies }
    }

    pub fn state(&self) -> &Arc<NetworkStateStore> {
        &self.state
    }

    pub fn policies(&self) -> &PolicyCompiler {
        &self.policies
    }

    /// Re-installs persisted policy attachments.
    pub fn restore(&self) -> Result<usize> {
        self.policies.restore()
    }

    /// Runs one reconciliation pass.
    ///
    /// Everything `config` names is created, policy attachments are brought in
    /// line with the endpoint groups' policy lists, and then everything it
    /// does not name is removed. Every step runs even when an earlier one
    /// failed; the failures are returned together.
    pub fn apply(&self, config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        collect(&mut errors, self.state.process_additions(config));

        let desired = desired_attachments(config, &mut errors);
        self.update_rules(&desired, &mut errors);

        for (key, (group, policy)) in &desired {
            if self.policies.attachment(key).is_none() {
                let attached = self.policies.attach_policy(group, policy);
                collect(&mut errors, attached.map(|_| ()));
            }
        }
        for gp in self.policies.attachments() {
            if !desired.contains_key(&gp.key) {
                let res = self.policies.detach_policy(&gp.tenant, &gp.endpoint_group, &gp.policy);
                collect(&mut errors, res);
            }
        }

        collect(&mut errors, self.state.delete_delta(config));

        if !errors.is_empty() {
            tracing::warn!(failures = errors.len(), "Reconciliation incomplete");
        }
        Error::aggregate(errors)
    }

    /// Applies rule changes of already attached policies.
    fn update_rules(&self, desired: &BTreeMap<String, (String, Policy)>, errors: &mut Vec<Error>) {
        let mut seen = HashSet::new();
        for gp in self.policies.attachments() {
            let Some((_, policy)) = desired.get(&gp.key) else {
                continue;
            };
            if !seen.insert(policy.key()) {
                continue;
            }

            for (id, installed) in &gp.rule_maps {
                if policy.rule(id) != Some(&installed.rule) {
                    tracing::info!(policy = %policy.key(), rule = %id, "Removing rule");
                    let res = self.policies.policy_del_rule(&gp.tenant, &gp.policy, id);
                    collect(errors, res);
                }
            }
            for rule in &policy.rules {
                if gp.rule(&rule.id) != Some(rule) {
                    tracing::info!(policy = %policy.key(), rule = %rule.id, "Adding rule");
                    let res = self.policies.policy_add_rule(&gp.tenant, &gp.policy, rule);
                    collect(errors, res);
                }
            }
        }
    }
}

/// Returns the (group, policy) pair for every attachment `config` asks for,
/// keyed by attachment.
fn desired_attachments(
    config: &Config,
    errors: &mut Vec<Error>,
) -> BTreeMap<String, (String, Policy)> {
    let mut desired = BTreeMap::new();
    for tenant in &config.tenants {
        let policies = tenant
            .policies()
            .map(|p| (p.name.clone(), p))
            .collect::<BTreeMap<_, _>>();
        for group in &tenant.endpoint_groups {
            for name in &group.policies {
                match policies.get(name) {
                    Some(policy) => {
                        desired.insert(
                            epg_policy_key(&tenant.name, &group.name, name),
                            (group.name.clone(), policy.clone()),
                        );
                    }
                    None => {
                        let error = Error::invalid(format!(
                            "endpoint group {}:{} refers to unknown policy {name}",
                            group.name, tenant.name
                        ));
                        tracing::error!(%error, "Skipping policy attachment");
                        errors.push(error);
                    }
                }
            }
        }
    }
    desired
}

fn collect(errors: &mut Vec<Error>, res: Result<()>) {
    match res {
        Ok(()) => {}
        Err(Error::Aggregate(all)) => errors.extend(all),
        Err(error) => errors.push(error),
    }
}
