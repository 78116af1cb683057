use ahash::AHashMap as HashMap;
use netmaster_core::{DirectionalRule, RuleEngine};
use parking_lot::Mutex;

/// A rule engine that logs rules and keeps the resulting table in memory.
///
/// Used when no dataplane is attached to the control plane.
#[derive(Debug, Default)]
pub struct LogRuleEngine {
    rules: Mutex<HashMap<String, DirectionalRule>>,
}

// === impl LogRuleEngine ===

impl LogRuleEngine {
    pub fn len(&self) -> usize {
        self.rules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }

    /// Returns the installed rules, ordered by id.
    pub fn rules(&self) -> Vec<DirectionalRule> {
        let mut rules = self.rules.lock().values().cloned().collect::<Vec<_>>();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }
}

impl RuleEngine for LogRuleEngine {
    fn add_rule(&self, rule: &DirectionalRule) -> anyhow::Result<()> {
        tracing::info!(
            id = %rule.id,
            priority = rule.priority,
            action = %rule.action,
            protocol = rule.protocol,
            src_group = ?rule.src_group,
            dst_group = ?rule.dst_group,
            src_net = ?rule.src_net,
            dst_net = ?rule.dst_net,
            src_port = rule.src_port,
            dst_port = rule.dst_port,
            syn_only = rule.tcp_syn_only,
            "Add rule"
        );
        if let Some(prior) = self.rules.lock().insert(rule.id.clone(), rule.clone()) {
            if prior != *rule {
                tracing::debug!(id = %rule.id, "Replaced rule");
            }
        }
        Ok(())
    }

    fn del_rule(&self, rule: &DirectionalRule) -> anyhow::Result<()> {
        match self.rules.lock().remove(&rule.id) {
            Some(_) => {
                tracing::info!(id = %rule.id, "Delete rule");
                Ok(())
            }
            None => anyhow::bail!("rule {} is not installed", rule.id),
        }
    }
}
