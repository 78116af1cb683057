use crate::NetworkStateStore;
use ahash::AHashMap as HashMap;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};
use std::sync::Arc;

#[derive(Debug)]
struct Instrumented(Arc<NetworkStateStore>);

pub fn register(reg: &mut Registry, state: Arc<NetworkStateStore>) {
    reg.register_collector(Box::new(Instrumented(state)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let networks = match self.0.list_networks() {
            Ok(networks) => networks,
            Err(error) => {
                tracing::warn!(%error, "Failed to read networks for metrics");
                return Ok(());
            }
        };

        let mut endpoints_encoder = encoder.encode_descriptor(
            "network_endpoints",
            "The number of endpoints on each network",
            None,
            MetricType::Gauge,
        )?;
        for network in &networks {
            let labels = [
                ("tenant", network.tenant.as_str()),
                ("network", network.name.as_str()),
            ];
            let endpoints = ConstGauge::new(network.ep_count as i64);
            let endpoints_encoder = endpoints_encoder.encode_family(&labels)?;
            endpoints.encode(endpoints_encoder)?;
        }

        let mut by_tenant = HashMap::<&str, i64>::new();
        for network in &networks {
            *by_tenant.entry(network.tenant.as_str()).or_default() += 1;
        }
        let mut networks_encoder = encoder.encode_descriptor(
            "tenant_networks",
            "The number of networks in each tenant",
            None,
            MetricType::Gauge,
        )?;
        for (tenant, count) in by_tenant {
            let labels = [("tenant", tenant)];
            let networks = ConstGauge::new(count);
            let networks_encoder = networks_encoder.encode_family(&labels)?;
            networks.encode(networks_encoder)?;
        }

        Ok(())
    }
}
