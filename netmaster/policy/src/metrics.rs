use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct PolicyMetrics {
    index_size: Gauge,
    rules_installed: Family<AttachmentLabels, Gauge>,
    rule_engine_errors: Family<OperationLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct AttachmentLabels {
    tenant: String,
    endpoint_group: String,
    policy: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    op: &'static str,
}

// === impl PolicyMetrics ===

impl PolicyMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let index_size = Gauge::default();
        prom.register(
            "epg_policy_index_size",
            "Gauge of the number of policies attached to endpoint groups",
            index_size.clone(),
        );

        let rules_installed = Family::default();
        prom.register(
            "directional_rules_installed",
            "Gauge of the number of directional rules installed for each attachment",
            rules_installed.clone(),
        );

        let rule_engine_errors = Family::default();
        prom.register(
            "rule_engine_errors",
            "Count of failed rule engine calls",
            rule_engine_errors.clone(),
        );

        Self {
            index_size,
            rules_installed,
            rule_engine_errors,
        }
    }

    pub(crate) fn set_index_size(&self, size: usize) {
        self.index_size.set(size as i64);
    }

    pub(crate) fn set_installed(&self, tenant: &str, group: &str, policy: &str, rules: usize) {
        let labels = AttachmentLabels {
            tenant: tenant.to_string(),
            endpoint_group: group.to_string(),
            policy: policy.to_string(),
        };
        self.rules_installed
            .get_or_create(&labels)
            .set(rules as i64);
    }

    pub(crate) fn remove_attachment(&self, tenant: &str, group: &str, policy: &str) {
        self.rules_installed.remove(&AttachmentLabels {
            tenant: tenant.to_string(),
            endpoint_group: group.to_string(),
            policy: policy.to_string(),
        });
    }

    pub(crate) fn rule_engine_error(&self, op: &'static str) {
        self.rule_engine_errors
            .get_or_create(&OperationLabels { op })
            .inc();
    }
}
