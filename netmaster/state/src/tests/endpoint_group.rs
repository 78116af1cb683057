use super::*;
use crate::{EndpointGroupState, NetworkState, PktTagType};
use netmaster_core::{resources, Error, RecordStore};
use std::net::Ipv4Addr;

fn with_network() -> TestConfig {
    let test = TestConfig::with_tenant();
    test.state
        .create_network(TENANT, &mk_network("net1", "vlan", 0))
        .unwrap();
    test
}

#[test]
fn group_with_endpoints_cannot_be_deleted() {
    let test = with_network();
    test.state
        .create_endpoint_group(TENANT, &mk_group("g1", "net1"))
        .unwrap();
    for c in ["c1", "c2"] {
        test.state
            .create_endpoint("net1.tenant1", &mk_endpoint(c, Some("g1")))
            .unwrap();
    }
    let before = test
        .store
        .read_record::<EndpointGroupState>("g1:tenant1")
        .unwrap();

    let err = test.state.delete_endpoint_group(TENANT, "g1").unwrap_err();
    assert!(
        matches!(err, Error::GroupHasActiveEndpoints { endpoints: 2, .. }),
        "{err}"
    );
    assert_eq!(
        test.store
            .read_record::<EndpointGroupState>("g1:tenant1")
            .unwrap(),
        before
    );

    test.state.delete_endpoint("net1.tenant1-c1").unwrap();
    test.state.delete_endpoint("net1.tenant1-c2").unwrap();
    test.state.delete_endpoint_group(TENANT, "g1").unwrap();
    assert!(matches!(
        test.state.get_endpoint_group(TENANT, "g1"),
        Err(Error::GroupNotFound { .. })
    ));
}

#[test]
fn group_ids_come_from_the_tenant() {
    let test = with_network();
    let g1 = test
        .state
        .create_endpoint_group(TENANT, &mk_group("g1", "net1"))
        .unwrap();
    let g2 = test
        .state
        .create_endpoint_group(
            TENANT,
            &ConfigEndpointGroup {
                group_id: 100,
                ..mk_group("g2", "net1")
            },
        )
        .unwrap();
    assert_eq!((g1.group_id, g2.group_id), (1, 100));
    // Without fabric mode the group shares the network's tag.
    assert_eq!(g1.pkt_tag, 11);
    assert!(!g1.owns_pkt_tag);

    let err = test
        .state
        .create_endpoint_group(
            TENANT,
            &ConfigEndpointGroup {
                group_id: 100,
                ..mk_group("g3", "net1")
            },
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "requested epg not available - epg:100");

    test.state.delete_endpoint_group(TENANT, "g1").unwrap();
    let g4 = test
        .state
        .create_endpoint_group(TENANT, &mk_group("g4", "net1"))
        .unwrap();
    assert_eq!(g4.group_id, 1);
}

#[test]
fn create_endpoint_group_is_idempotent() {
    let test = with_network();
    let first = test
        .state
        .create_endpoint_group(TENANT, &mk_group("g1", "net1"))
        .unwrap();
    let second = test
        .state
        .create_endpoint_group(
            TENANT,
            &ConfigEndpointGroup {
                group_id: 7,
                ..mk_group("g1", "net1")
            },
        )
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn group_requires_its_network() {
    let test = with_network();
    let err = test
        .state
        .create_endpoint_group(TENANT, &mk_group("g1", "net2"))
        .unwrap_err();
    let Error::NotFound { kind, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*kind, "network");
}

#[test]
fn private_pools_are_preferred() {
    let test = with_network();
    test.state
        .create_endpoint_group(
            TENANT,
            &ConfigEndpointGroup {
                ip_pool: Some("10.1.1.100-10.1.1.101".to_string()),
                ..mk_group("g1", "net1")
            },
        )
        .unwrap();

    let addr = |c: &str, g: Option<&str>| {
        test.state
            .create_endpoint("net1.tenant1", &mk_endpoint(c, g))
            .map(|ep| ep.ipv4)
    };
    let c1 = addr("c1", Some("g1")).unwrap();
    assert_eq!(c1, Some(Ipv4Addr::new(10, 1, 1, 100)));
    let c2 = addr("c2", Some("g1")).unwrap();
    assert_eq!(c2, Some(Ipv4Addr::new(10, 1, 1, 101)));
    assert!(matches!(
        addr("c3", Some("g1")),
        Err(Error::Allocation(resources::Error::PoolExhausted { .. }))
    ));
    assert_eq!(addr("c4", None).unwrap(), Some(Ipv4Addr::new(10, 1, 1, 1)));

    let net = test.state.get_network(TENANT, "net1").unwrap();
    assert_eq!((net.ep_count, net.ep_addr_count), (3, 1));
    assert!(net.ipv4_pool.is_allocated(Ipv4Addr::new(10, 1, 1, 100)));

    for c in ["c1", "c2"] {
        test.state
            .delete_endpoint(&format!("net1.tenant1-{c}"))
            .unwrap();
    }
    test.state.delete_endpoint_group(TENANT, "g1").unwrap();
    let net = test.state.get_network(TENANT, "net1").unwrap();
    assert!(!net.ipv4_pool.is_allocated(Ipv4Addr::new(10, 1, 1, 100)));
    assert!(!net.ipv4_pool.is_allocated(Ipv4Addr::new(10, 1, 1, 101)));
    assert_eq!(net.ep_addr_count, 1);
}

#[test]
fn private_pool_must_be_free() {
    let test = with_network();
    test.state
        .create_endpoint(
            "net1.tenant1",
            &ConfigEndpoint {
                ip_address: Some("10.1.1.100".to_string()),
                ..mk_endpoint("c1", None)
            },
        )
        .unwrap();

    let err = test
        .state
        .create_endpoint_group(
            TENANT,
            &ConfigEndpointGroup {
                ip_pool: Some("10.1.1.90-10.1.1.110".to_string()),
                ..mk_group("g1", "net1")
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation(resources::Error::AddressInUse(_))
    ));
    assert!(test.state.list_endpoint_groups().unwrap().is_empty());

    let err = test
        .state
        .create_endpoint_group(
            TENANT,
            &ConfigEndpointGroup {
                ip_pool: Some("10.2.0.1-10.2.0.5".to_string()),
                ..mk_group("g1", "net1")
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation(resources::Error::AddressOutOfRange { .. })
    ));
}

#[test]
fn fabric_mode_gives_groups_their_own_vlan() {
    let test = TestConfig::with_config(StateConfig { fabric_mode: true });
    test.state
        .create_tenant(&mk_tenant(TENANT, "11-1000", "1001-2000"))
        .unwrap();
    test.state
        .create_network(TENANT, &mk_network("net1", "vlan", 0))
        .unwrap();
    test.state
        .create_network(TENANT, &mk_network("net2", "vxlan", 0))
        .unwrap();

    let g1 = test
        .state
        .create_endpoint_group(TENANT, &mk_group("g1", "net1"))
        .unwrap();
    assert_eq!(g1.pkt_tag_type, Some(PktTagType::Vlan));
    assert_eq!(g1.pkt_tag, 12);
    assert!(g1.owns_pkt_tag);

    let err = test
        .state
        .create_endpoint_group(TENANT, &mk_group("g2", "net2"))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    test.state.delete_endpoint_group(TENANT, "g1").unwrap();
    assert_eq!(
        test.state.vlans_in_use(TENANT).unwrap(),
        (1, "11".to_string())
    );
}

#[test]
fn network_in_use_by_a_group_is_kept() {
    let test = with_network();
    test.state
        .create_endpoint_group(TENANT, &mk_group("g1", "net1"))
        .unwrap();
    assert!(matches!(
        test.state.delete_network("net1.tenant1"),
        Err(Error::Validation(_))
    ));
    assert!(test
        .store
        .read_record::<NetworkState>("net1.tenant1")
        .unwrap()
        .is_some());
}
