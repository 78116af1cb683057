use crate::{Error, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// A named, tenant-scoped set of rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub tenant: String,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A declarative allow/deny rule.
///
/// At most one remote scope (`from_*`/`to_*`) is expected to be set. This is
/// not enforced; each set field is passed through to the compiled rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rule {
    #[serde(alias = "ruleId")]
    pub id: String,
    pub direction: RuleDirection,
    /// `tcp`, `udp`, `icmp`, `igmp`, a decimal protocol number, or empty for
    /// any protocol.
    pub protocol: String,
    /// Zero matches any port.
    pub port: u16,
    pub action: Action,
    pub priority: u32,

    pub from_endpoint_group: Option<String>,
    pub to_endpoint_group: Option<String>,
    pub from_network: Option<String>,
    pub to_network: Option<String>,
    pub from_ip_address: Option<IpNet>,
    pub to_ip_address: Option<IpNet>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    #[default]
    In,
    Out,
    Both,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Allow,
    Deny,
}

pub const PROTO_ANY: u8 = 0;
pub const PROTO_ICMP: u8 = 1;
pub const PROTO_IGMP: u8 = 2;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

// === impl Policy ===

impl Policy {
    pub fn key(&self) -> String {
        policy_key(&self.tenant, &self.name)
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

pub fn policy_key(tenant: &str, name: &str) -> String {
    format!("{tenant}:{name}")
}

// === impl Rule ===

impl Rule {
    /// Resolves the rule's protocol name to an IP protocol number.
    pub fn protocol_number(&self) -> Result<u8> {
        match self.protocol.trim().to_ascii_lowercase().as_str() {
            "" => Ok(PROTO_ANY),
            "tcp" => Ok(PROTO_TCP),
            "udp" => Ok(PROTO_UDP),
            "icmp" => Ok(PROTO_ICMP),
            "igmp" => Ok(PROTO_IGMP),
            other => other.parse::<u8>().map_err(|_| {
                Error::invalid(format!(
                    "rule {}: unknown protocol {:?}",
                    self.id, self.protocol
                ))
            }),
        }
    }
}

impl std::fmt::Display for RuleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => "in".fmt(f),
            Self::Out => "out".fmt(f),
            Self::Both => "both".fmt(f),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => "allow".fmt(f),
            Self::Deny => "deny".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(protocol: &str) -> Rule {
        Rule {
            id: "1".to_string(),
            protocol: protocol.to_string(),
            ..Rule::default()
        }
    }

    #[test]
    fn protocol_numbers() {
        assert_eq!(rule("").protocol_number().unwrap(), PROTO_ANY);
        assert_eq!(rule("TCP").protocol_number().unwrap(), PROTO_TCP);
        assert_eq!(rule("udp").protocol_number().unwrap(), PROTO_UDP);
        assert_eq!(rule("icmp").protocol_number().unwrap(), PROTO_ICMP);
        assert_eq!(rule("igmp").protocol_number().unwrap(), PROTO_IGMP);
        assert_eq!(rule("47").protocol_number().unwrap(), 47);
        assert!(matches!(
            rule("256").protocol_number(),
            Err(Error::Validation(_))
        ));
        assert!(rule("sctp-ish").protocol_number().is_err());
    }

    #[test]
    fn rules_parse_from_intent_json() {
        let rule: Rule = serde_json::from_str(
            r#"{"ruleId": "1", "direction": "both", "protocol": "tcp", "port": 80,
                "action": "deny", "priority": 5, "fromIpAddress": "10.0.0.0/8"}"#,
        )
        .unwrap();
        assert_eq!(rule.id, "1");
        assert_eq!(rule.direction, RuleDirection::Both);
        assert_eq!(rule.action, Action::Deny);
        assert_eq!(rule.from_ip_address, Some("10.0.0.0/8".parse().unwrap()));
    }
}
