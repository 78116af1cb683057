use netmaster_core::{policy::policy_key, DirectionalRule, Record, Rule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A policy attached to an endpoint group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpgPolicy {
    /// `<tenant>:<group>:<tenant>:<policy>`
    pub key: String,
    pub tenant: String,
    pub endpoint_group: String,
    pub policy: String,
    pub group_id: u32,
    /// Installed rules by rule id.
    pub rule_maps: BTreeMap<String, RuleMap>,
}

/// A policy rule and the directional rules it was compiled into.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMap {
    pub rule: Rule,
    pub directional: Vec<DirectionalRule>,
}

pub fn epg_policy_key(tenant: &str, group: &str, policy: &str) -> String {
    format!("{tenant}:{group}:{}", policy_key(tenant, policy))
}

// === impl EpgPolicy ===

impl EpgPolicy {
    pub(crate) fn new(tenant: &str, group: &str, policy: &str, group_id: u32) -> Self {
        Self {
            key: epg_policy_key(tenant, group, policy),
            tenant: tenant.to_string(),
            endpoint_group: group.to_string(),
            policy: policy.to_string(),
            group_id,
            rule_maps: BTreeMap::new(),
        }
    }

    /// The number of directional rules installed for this attachment.
    pub fn installed(&self) -> usize {
        self.rule_maps.values().map(|m| m.directional.len()).sum()
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rule_maps.get(id).map(|m| &m.rule)
    }
}

impl Record for EpgPolicy {
    const PREFIX: &'static str = "/netmaster/state/policy/";

    fn id(&self) -> String {
        self.key.clone()
    }
}
