use netmaster_core::{
    policy::{PROTO_TCP, PROTO_UDP},
    Direction, DirectionalRule, GroupResolver, IpNet, Result, Rule, RuleDirection,
};

/// The far side of a rule, resolved against the tenant's state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Remote {
    pub group: Option<u32>,
    pub from_ip: Option<IpNet>,
    pub to_ip: Option<IpNet>,
}

/// Returns the directional halves a rule compiles into.
///
/// A port-scoped TCP or UDP rule needs both the request and the reply half
/// because the dataplane keeps no connection state.
pub(crate) fn directions(rule: &Rule, protocol: u8) -> &'static [Direction] {
    use Direction::*;

    let paired = matches!(protocol, PROTO_TCP | PROTO_UDP) && rule.port != 0;
    match (rule.direction, paired) {
        (RuleDirection::In, true) => &[InRx, InTx],
        (RuleDirection::In, false) => &[InRx],
        (RuleDirection::Out, true) => &[OutRx, OutTx],
        (RuleDirection::Out, false) => &[OutTx],
        (RuleDirection::Both, true) => &[InRx, InTx, OutRx, OutTx],
        (RuleDirection::Both, false) => &[InRx, OutTx],
    }
}

/// Resolves the rule's remote scope.
///
/// Only the first of `from_endpoint_group`, `to_endpoint_group`,
/// `from_network` and `to_network` that is set is consulted. A network scope
/// replaces the matching IP scope with the network's subnet.
pub(crate) fn resolve_remote(
    tenant: &str,
    rule: &Rule,
    groups: &dyn GroupResolver,
) -> Result<Remote> {
    let mut remote = Remote {
        group: None,
        from_ip: rule.from_ip_address,
        to_ip: rule.to_ip_address,
    };
    let set = |s: &Option<String>| s.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(group) = set(&rule.from_endpoint_group).or_else(|| set(&rule.to_endpoint_group)) {
        remote.group = Some(groups.endpoint_group_id(tenant, &group)?);
    } else if let Some(network) = set(&rule.from_network) {
        remote.from_ip = Some(groups.network_subnet(tenant, &network)?);
    } else if let Some(network) = set(&rule.to_network) {
        remote.to_ip = Some(groups.network_subnet(tenant, &network)?);
    }
    Ok(remote)
}

/// Builds one directional half of `rule` for the group `local_group`.
///
/// Rx halves match traffic arriving at the local group, so the remote side is
/// the source. Tx halves match traffic leaving it, so the remote side is the
/// destination. Inbound rules scope the remote by `from_ip`, outbound rules by
/// `to_ip`.
pub(crate) fn directional(
    epg_policy: &str,
    rule: &Rule,
    protocol: u8,
    local_group: u32,
    remote: &Remote,
    dir: Direction,
) -> DirectionalRule {
    let mut out = DirectionalRule {
        id: format!("{epg_policy}:{}:{dir}", rule.id),
        priority: rule.priority,
        action: rule.action,
        protocol,
        tcp_syn_only: dir.is_rx() && protocol == PROTO_TCP && rule.port == 0,
        ..DirectionalRule::default()
    };

    if dir.is_rx() {
        out.src_group = remote.group;
        out.dst_group = Some(local_group);
    } else {
        out.src_group = Some(local_group);
        out.dst_group = remote.group;
    }

    match dir {
        Direction::InRx => {
            out.src_net = remote.from_ip;
            out.dst_port = rule.port;
        }
        Direction::InTx => {
            out.dst_net = remote.from_ip;
            out.src_port = rule.port;
        }
        Direction::OutRx => {
            out.src_net = remote.to_ip;
            out.src_port = rule.port;
        }
        Direction::OutTx => {
            out.dst_net = remote.to_ip;
            out.dst_port = rule.port;
        }
    }

    out
}
