use clap::Parser;
use netmaster::{
    core::{MemStore, RecordStore},
    load_intent,
    state::{EndpointState, StateConfig},
    Args, Controller, LogRuleEngine,
};
use prometheus_client::registry::Registry;
use std::{path::Path, sync::Arc};

const INTENT: &str = r#"{
  "tenants": [
    {
      "name": "tenant1",
      "defaultNetType": "vlan",
      "vlans": "11-1000",
      "vxlans": "1001-2000",
      "networks": [
        {
          "name": "net1",
          "subnet": "10.1.1.0/24",
          "gateway": "10.1.1.254",
          "endpoints": [
            { "container": "c1", "host": "host1", "group": "g1" },
            { "container": "c2", "host": "host1", "group": "g1", "ipAddress": "10.1.1.20" }
          ]
        },
        {
          "name": "net2",
          "pktTagType": "vxlan",
          "pktTag": 2000,
          "subnet": "10.1.2.0/24"
        }
      ],
      "endpointGroups": [
        { "name": "g1", "network": "net1", "policies": ["web"] }
      ],
      "policies": [
        {
          "name": "web",
          "rules": [
            { "ruleId": "1", "direction": "in", "protocol": "tcp", "port": 8000, "action": "allow" },
            { "ruleId": "2", "direction": "out", "fromNetwork": "net2", "action": "deny", "priority": 2 }
          ]
        }
      ]
    }
  ]
}"#;

fn write_intent(dir: &Path, intent: &str) -> std::path::PathBuf {
    let path = dir.join("intent.json");
    std::fs::write(&path, intent).unwrap();
    path
}

fn controller(store: Arc<MemStore>) -> (Controller, Arc<LogRuleEngine>) {
    let engine = Arc::new(LogRuleEngine::default());
    let controller = Controller::new(
        store,
        StateConfig::default(),
        engine.clone(),
        &mut Registry::default(),
    );
    (controller, engine)
}

#[test]
fn applies_an_intent_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_intent(&write_intent(dir.path(), INTENT)).unwrap();

    let store = Arc::new(MemStore::new());
    let (controller, engine) = controller(store.clone());
    controller.apply(&config).unwrap();

    let c1 = store
        .read_record::<EndpointState>("net1.tenant1-c1")
        .unwrap()
        .expect("c1 must exist");
    assert_eq!(c1.ipv4, Some("10.1.1.1".parse().unwrap()));
    assert_eq!(c1.mac, "02:02:0a:01:01:01");
    assert_eq!(c1.group_id, 1);
    let c2 = controller.state().read_endpoint("net1.tenant1-c2").unwrap();
    assert_eq!(c2.ipv4, Some("10.1.1.20".parse().unwrap()));

    let net2 = controller.state().get_network("tenant1", "net2").unwrap();
    assert_eq!(net2.ext_pkt_tag, 2000);

    let ids = engine.rules().into_iter().map(|r| r.id).collect::<Vec<_>>();
    assert_eq!(
        ids,
        [
            "tenant1:g1:tenant1:web:1:inRx",
            "tenant1:g1:tenant1:web:1:inTx",
            "tenant1:g1:tenant1:web:2:outTx",
        ]
    );

    // A second pass is a no-op.
    let records = store.len();
    controller.apply(&config).unwrap();
    assert_eq!(store.len(), records);
    assert_eq!(engine.len(), 3);
}

#[test]
fn restarts_from_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_intent(&write_intent(dir.path(), INTENT)).unwrap();
    let snapshot = dir.path().join("state.json");

    let before = {
        let store = Arc::new(MemStore::new());
        let (controller, engine) = controller(store.clone());
        controller.apply(&config).unwrap();
        store.save_snapshot(&snapshot).unwrap();
        engine.rules()
    };

    let store = Arc::new(MemStore::load_snapshot(&snapshot).unwrap());
    let (controller, engine) = controller(store.clone());
    assert_eq!(controller.restore().unwrap(), 1);
    assert_eq!(engine.rules(), before);

    // Removing the endpoint group from the intent detaches its policy.
    let mut config = config;
    let tenant = &mut config.tenants[0];
    tenant.endpoint_groups.clear();
    for ep in &mut tenant.networks[0].endpoints {
        ep.group = None;
    }
    tenant.networks[0].endpoints.truncate(1);
    let err = controller.apply(&config).unwrap_err();
    // c1 is still in its group in the store, so the group cannot go yet.
    assert!(err.to_string().contains("active endpoints"), "{err}");
    assert!(engine.is_empty());

    tenant_without_endpoints(&mut config);
    controller.apply(&config).unwrap();
    let state = controller.state();
    assert!(state.list_endpoint_groups().unwrap().is_empty());
    assert_eq!(state.list_networks().unwrap().len(), 2);
}

fn tenant_without_endpoints(config: &mut netmaster::core::intent::Config) {
    for net in &mut config.tenants[0].networks {
        net.endpoints.clear();
    }
}

#[tokio::test]
async fn runs_once_from_the_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let intent = write_intent(dir.path(), INTENT);
    let snapshot = dir.path().join("state.json");

    let args = Args::try_parse_from([
        "netmaster",
        "--intent",
        intent.to_str().unwrap(),
        "--state-snapshot",
        snapshot.to_str().unwrap(),
        "--once",
        "--log-level",
        "netmaster=debug,warn",
    ])
    .unwrap();
    args.run().await.unwrap();

    let store = MemStore::load_snapshot(&snapshot).unwrap();
    assert!(store
        .read_record::<EndpointState>("net1.tenant1-c2")
        .unwrap()
        .is_some());
}
