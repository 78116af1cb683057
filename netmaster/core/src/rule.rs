use crate::{policy::Action, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// One half of a logical rule direction.
///
/// `Rx` variants match traffic arriving at the endpoint group; `Tx` variants
/// match traffic leaving it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "inRx")]
    InRx,
    #[serde(rename = "inTx")]
    InTx,
    #[serde(rename = "outRx")]
    OutRx,
    #[serde(rename = "outTx")]
    OutTx,
}

/// A low-level forwarding rule as consumed by the dataplane rule engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionalRule {
    /// `<epgPolicyKey>:<ruleId>:<direction>`
    pub id: String,
    pub priority: u32,
    pub action: Action,
    pub protocol: u8,
    pub src_group: Option<u32>,
    pub dst_group: Option<u32>,
    pub src_net: Option<IpNet>,
    pub dst_net: Option<IpNet>,
    pub src_port: u16,
    pub dst_port: u16,
    /// Restricts the match to connection-establishment (SYN) packets.
    pub tcp_syn_only: bool,
}

/// The dataplane's rule table.
pub trait RuleEngine: Send + Sync {
    fn add_rule(&self, rule: &DirectionalRule) -> anyhow::Result<()>;

    fn del_rule(&self, rule: &DirectionalRule) -> anyhow::Result<()>;
}

/// Resolves names referenced by policy rules.
pub trait GroupResolver: Send + Sync {
    /// Returns the numeric id of endpoint group `group` in `tenant`.
    fn endpoint_group_id(&self, tenant: &str, group: &str) -> Result<u32>;

    /// Returns the IPv4 subnet of network `network` in `tenant`.
    fn network_subnet(&self, tenant: &str, network: &str) -> Result<IpNet>;
}

// === impl Direction ===

impl Direction {
    pub const ALL: [Direction; 4] = [Self::InRx, Self::InTx, Self::OutRx, Self::OutTx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InRx => "inRx",
            Self::InTx => "inTx",
            Self::OutRx => "outRx",
            Self::OutTx => "outTx",
        }
    }

    #[inline]
    pub fn is_rx(&self) -> bool {
        matches!(self, Self::InRx | Self::OutRx)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}
