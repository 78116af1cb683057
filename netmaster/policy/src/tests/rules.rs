use super::*;
use netmaster_core::{Action, Direction};

const KEY: &str = "tenant1:g1:tenant1:web";

fn attached(rules: Vec<Rule>) -> TestConfig {
    let test = TestConfig::default();
    test.compiler
        .attach_policy("g1", &mk_policy("web", rules))
        .unwrap();
    test
}

#[test]
fn add_and_delete_a_rule() {
    let test = attached(vec![]);
    test.compiler
        .add_rule(KEY, &mk_rule("1", RuleDirection::Out, "udp", 53))
        .unwrap();
    assert_eq!(
        test.installed(),
        [format!("{KEY}:1:outRx"), format!("{KEY}:1:outTx")]
    );
    assert_eq!(test.compiler.attachment(KEY).unwrap().installed(), 2);

    let err = test
        .compiler
        .add_rule(KEY, &mk_rule("1", RuleDirection::In, "tcp", 80))
        .unwrap_err();
    assert!(matches!(err, Error::RuleExists { .. }), "{err}");
    assert_eq!(test.installed().len(), 2);

    test.compiler.del_rule(KEY, "1").unwrap();
    assert!(test.installed().is_empty());
    assert!(matches!(
        test.compiler.del_rule(KEY, "1"),
        Err(Error::RuleNotFound { .. })
    ));
}

#[test]
fn rules_need_an_attachment() {
    let test = TestConfig::default();
    assert!(matches!(
        test.compiler
            .add_rule(KEY, &mk_rule("1", RuleDirection::In, "tcp", 80)),
        Err(Error::AttachmentNotFound(_))
    ));
    assert!(matches!(
        test.compiler.del_rule(KEY, "1"),
        Err(Error::AttachmentNotFound(_))
    ));
}

#[test]
fn delete_drops_the_rule_when_removal_fails() {
    let test = attached(vec![mk_rule("1", RuleDirection::In, "tcp", 80)]);
    *test.engine.fail_del.lock() = true;
    test.compiler.del_rule(KEY, "1").unwrap();
    assert!(test.compiler.attachment(KEY).unwrap().rule_maps.is_empty());
}

#[test]
fn remote_group_scopes_the_far_side() {
    let test = attached(vec![Rule {
        from_endpoint_group: Some("db".to_string()),
        action: Action::Deny,
        priority: 3,
        ..mk_rule("1", RuleDirection::Both, "tcp", 5432)
    }]);

    let in_rx = test.rule(&format!("{KEY}:1:inRx"));
    assert_eq!((in_rx.src_group, in_rx.dst_group), (Some(7), Some(1)));
    assert_eq!(in_rx.dst_port, 5432);
    assert_eq!((in_rx.action, in_rx.priority), (Action::Deny, 3));

    let out_tx = test.rule(&format!("{KEY}:1:outTx"));
    assert_eq!((out_tx.src_group, out_tx.dst_group), (Some(1), Some(7)));
    assert_eq!(out_tx.dst_port, 5432);
}

#[test]
fn missing_remote_group_is_an_error() {
    let test = attached(vec![]);
    let err = test
        .compiler
        .add_rule(
            KEY,
            &Rule {
                to_endpoint_group: Some("nope".to_string()),
                ..mk_rule("1", RuleDirection::Out, "tcp", 80)
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::GroupNotFound { .. }), "{err}");
    assert!(test.installed().is_empty());
}

#[test]
fn remote_network_matches_its_subnet() {
    let test = attached(vec![
        Rule {
            from_network: Some("net1".to_string()),
            ..mk_rule("1", RuleDirection::In, "", 0)
        },
        Rule {
            to_network: Some("net1".to_string()),
            ..mk_rule("2", RuleDirection::Out, "", 0)
        },
    ]);
    let subnet = Some("10.1.1.0/24".parse::<IpNet>().unwrap());

    let in_rx = test.rule(&format!("{KEY}:1:inRx"));
    assert_eq!(in_rx.src_net, subnet);
    assert_eq!(in_rx.dst_net, None);
    assert_eq!(in_rx.src_group, None);

    let out_tx = test.rule(&format!("{KEY}:2:outTx"));
    assert_eq!(out_tx.dst_net, subnet);
    assert_eq!(out_tx.src_net, None);
}

#[test]
fn explicit_addresses_pass_through() {
    let test = attached(vec![Rule {
        from_ip_address: Some("192.168.0.0/16".parse().unwrap()),
        ..mk_rule("1", RuleDirection::In, "udp", 161)
    }]);
    let net = Some("192.168.0.0/16".parse::<IpNet>().unwrap());
    assert_eq!(test.rule(&format!("{KEY}:1:inRx")).src_net, net);
    assert_eq!(test.rule(&format!("{KEY}:1:inTx")).dst_net, net);
}

#[test]
fn policy_rules_apply_to_every_attachment() {
    let test = TestConfig::default();
    let policy = mk_policy("web", vec![mk_rule("1", RuleDirection::In, "tcp", 80)]);
    test.compiler.attach_policy("g1", &policy).unwrap();
    test.compiler.attach_policy("g2", &policy).unwrap();
    test.compiler
        .attach_policy("g1", &mk_policy("other", vec![]))
        .unwrap();

    let rule = mk_rule("2", RuleDirection::Both, "icmp", 0);
    test.compiler
        .policy_add_rule(TENANT, "web", &rule)
        .unwrap();
    for group in ["g1", "g2"] {
        for dir in [Direction::InRx, Direction::OutTx] {
            test.rule(&format!("tenant1:{group}:tenant1:web:2:{dir}"));
        }
    }
    assert_eq!(test.installed().len(), 8);
    assert!(test
        .compiler
        .attachment("tenant1:g1:tenant1:other")
        .unwrap()
        .rule_maps
        .is_empty());

    test.compiler
        .policy_del_rule(TENANT, "web", "1")
        .unwrap();
    assert_eq!(test.installed().len(), 4);
    assert!(test.installed().iter().all(|id| id.contains(":web:2:")));
}
