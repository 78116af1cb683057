use super::*;

#[test]
fn restore_reinstalls_persisted_attachments() {
    let store = Arc::new(MemStore::new());
    let before = {
        let test = TestConfig::with_store(store.clone());
        let policy = mk_policy(
            "web",
            vec![
                mk_rule("1", RuleDirection::In, "tcp", 80),
                mk_rule("2", RuleDirection::Out, "udp", 0),
            ],
        );
        test.compiler.attach_policy("g1", &policy).unwrap();
        test.compiler.attach_policy("g2", &policy).unwrap();
        test.compiler.detach_policy(TENANT, "g2", "web").unwrap();
        test.installed()
    };

    let test = TestConfig::with_store(store);
    assert!(test.installed().is_empty());
    assert_eq!(test.compiler.restore().unwrap(), 1);
    assert_eq!(test.installed(), before);

    let gp = test
        .compiler
        .attachment("tenant1:g1:tenant1:web")
        .expect("attachment must be restored");
    assert_eq!(gp.installed(), 3);
    assert!(gp.rule("2").is_some());

    // Restored attachments behave like any other.
    assert!(matches!(
        test.compiler
            .attach_policy("g1", &mk_policy("web", vec![])),
        Err(Error::AttachmentExists(_))
    ));
    test.compiler.detach_policy(TENANT, "g1", "web").unwrap();
    assert!(test.installed().is_empty());
}

#[test]
fn restore_reports_rules_that_fail() {
    let store = Arc::new(MemStore::new());
    {
        let test = TestConfig::with_store(store.clone());
        let policy = mk_policy(
            "web",
            vec![
                mk_rule("1", RuleDirection::In, "tcp", 80),
                mk_rule("2", RuleDirection::In, "tcp", 443),
            ],
        );
        test.compiler.attach_policy("g1", &policy).unwrap();
    }

    let test = TestConfig::with_store(store);
    *test.engine.fail_add.lock() = Some(":2:".to_string());
    let err = test.compiler.restore().unwrap_err();
    assert!(matches!(err, Error::RuleEngine(_)), "{err}");

    let gp = test.compiler.attachment("tenant1:g1:tenant1:web").unwrap();
    assert!(gp.rule("1").is_some());
    assert!(gp.rule("2").is_none());
    assert_eq!(test.installed().len(), 2);
}
