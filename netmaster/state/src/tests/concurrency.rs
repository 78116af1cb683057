use super::*;
use ahash::AHashSet as HashSet;
use std::thread;

const WORKERS: usize = 16;

#[test]
fn concurrent_endpoints_get_distinct_addresses() {
    let test = TestConfig::with_tenant();
    let net = test
        .state
        .create_network(TENANT, &mk_network("net1", "vlan", 0))
        .unwrap();

    let endpoints = thread::scope(|s| {
        let workers = (0..WORKERS)
            .map(|n| {
                let state = &test.state;
                let net = &net.id;
                let endpoint = mk_endpoint(&format!("c{n}"), None);
                s.spawn(move || state.create_endpoint(net, &endpoint))
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|w| w.join().unwrap().expect("endpoint must be created"))
            .collect::<Vec<_>>()
    });

    let addrs = endpoints
        .iter()
        .map(|ep| ep.ipv4.expect("endpoint must have an address"))
        .collect::<HashSet<_>>();
    assert_eq!(addrs.len(), WORKERS);

    let net = test.state.get_network(TENANT, "net1").unwrap();
    assert_eq!(net.ep_count, WORKERS as u32);
    assert_eq!(net.ep_addr_count, WORKERS as u32);
    for ep in &endpoints {
        assert!(net.ipv4_pool.is_allocated(ep.ipv4.unwrap()));
    }
}

#[test]
fn concurrent_networks_get_distinct_tags() {
    let test = TestConfig::with_tenant();

    let networks = thread::scope(|s| {
        let workers = (0..WORKERS)
            .map(|n| {
                let state = &test.state;
                let pkt_tag_type = if n % 2 == 0 { "vlan" } else { "vxlan" };
                let network = mk_network(&format!("net{n}"), pkt_tag_type, 0);
                s.spawn(move || state.create_network(TENANT, &network))
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|w| w.join().unwrap().expect("network must be created"))
            .collect::<Vec<_>>()
    });

    // VLANs and the local VLANs paired with VXLANs share one dataplane tag
    // space.
    let tags = networks.iter().map(|n| n.pkt_tag).collect::<HashSet<_>>();
    assert_eq!(tags.len(), WORKERS);
    let vxlans = networks
        .iter()
        .filter(|n| n.ext_pkt_tag != 0)
        .map(|n| n.ext_pkt_tag)
        .collect::<HashSet<_>>();
    assert_eq!(vxlans.len(), WORKERS / 2);

    let (vlans, _) = test.state.vlans_in_use(TENANT).unwrap();
    assert_eq!(vlans as usize, WORKERS / 2);
    let (vxlans, _) = test.state.vxlans_in_use(TENANT).unwrap();
    assert_eq!(vxlans as usize, WORKERS / 2);
}

#[test]
fn deleted_tenants_release_their_lock() {
    let test = TestConfig::default();
    for name in ["tenant1", "tenant2"] {
        test.state
            .create_tenant(&mk_tenant(name, "11-1000", ""))
            .unwrap();
    }
    assert_eq!(test.state.tenant_locks.lock().len(), 2);

    test.state.delete_tenant("tenant1").unwrap();
    assert!(test.state.delete_tenant("nope").is_err());
    assert_eq!(test.state.tenant_locks.lock().len(), 1);

    // A re-created tenant gets a fresh lock.
    test.state
        .create_tenant(&mk_tenant("tenant1", "11-1000", ""))
        .unwrap();
    test.state
        .create_network("tenant1", &mk_network("net1", "vlan", 0))
        .unwrap();
    assert_eq!(test.state.tenant_locks.lock().len(), 2);
}
