use super::*;
use netmaster_core::{intent::Config, Error};

fn intent() -> Config {
    let mut net1 = mk_network("net1", "vlan", 0);
    net1.endpoints = vec![mk_endpoint("c1", Some("g1")), mk_endpoint("c2", None)];
    let mut net2 = ConfigNetwork {
        subnet: Some("10.1.2.0/24".to_string()),
        gateway: Some("10.1.2.254".to_string()),
        ..mk_network("net2", "vxlan", 0)
    };
    net2.endpoints = vec![mk_endpoint("c3", None)];

    Config {
        tenants: vec![ConfigTenant {
            networks: vec![net1, net2],
            endpoint_groups: vec![mk_group("g1", "net1")],
            ..mk_tenant(TENANT, "11-1000", "1001-2000")
        }],
    }
}

#[test]
fn additions_create_everything() {
    let test = TestConfig::default();
    let config = intent();
    test.state.process_additions(&config).unwrap();

    assert_eq!(test.state.list_tenants().unwrap().len(), 1);
    assert_eq!(test.state.list_networks().unwrap().len(), 2);
    assert_eq!(test.state.list_endpoint_groups().unwrap().len(), 1);
    let mut eps = test
        .state
        .list_endpoints()
        .unwrap()
        .into_iter()
        .map(|ep| ep.id)
        .collect::<Vec<_>>();
    eps.sort();
    assert_eq!(
        eps,
        vec!["net1.tenant1-c1", "net1.tenant1-c2", "net2.tenant1-c3"]
    );

    // A second pass changes nothing.
    let before = test.state.list_endpoints().unwrap();
    test.state.process_additions(&config).unwrap();
    assert_eq!(test.state.list_endpoints().unwrap(), before);
    assert_eq!(test.state.get_network(TENANT, "net1").unwrap().ep_count, 2);
}

#[test]
fn additions_continue_past_failures() {
    let test = TestConfig::default();
    let mut config = intent();
    config.tenants[0].networks[0].pkt_tag = 5000;
    config.tenants.push(mk_tenant("", "", ""));

    let err = test.state.process_additions(&config).unwrap_err();
    // The bad tenant, net1, g1 (its network is missing) and the two endpoints on net1.
    let Error::Aggregate(errors) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(errors.len(), 5);

    assert_eq!(test.state.list_networks().unwrap().len(), 1);
    assert_eq!(test.state.list_endpoints().unwrap().len(), 1);
}

#[test]
fn delta_removes_what_the_intent_omits() {
    let test = TestConfig::default();
    let mut config = intent();
    test.state.process_additions(&config).unwrap();

    config.tenants[0].networks[1].endpoints.clear();
    test.state.delete_delta(&config).unwrap();
    let eps = test.state.list_endpoints().unwrap();
    assert_eq!(eps.len(), 2);
    assert!(eps.iter().all(|ep| ep.network_id == "net1.tenant1"));
    assert_eq!(test.state.get_network(TENANT, "net2").unwrap().ep_count, 0);

    config.tenants[0].networks.truncate(1);
    test.state.delete_delta(&config).unwrap();
    assert_eq!(test.state.list_networks().unwrap().len(), 1);
    assert_eq!(test.state.vxlans_in_use(TENANT).unwrap().0, 0);
    assert_eq!(test.state.list_endpoints().unwrap().len(), 2);
}

#[test]
fn delta_against_an_empty_intent_clears_the_store() {
    let test = TestConfig::default();
    test.state.process_additions(&intent()).unwrap();
    assert!(!test.store.is_empty());

    test.state.delete_delta(&Config::default()).unwrap();
    assert!(test.store.is_empty());
}
