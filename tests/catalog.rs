mod common;

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use common::{Entry, MemoryConnector};
use keyscope::diagnostics::WRITE_PROBE_KEY;
use keyscope::{
    KeyCatalogClient, KeyValue, KeyscopeError, ScoredMember, ValueType, WriteMode,
    UNSUPPORTED_VALUE,
};

const TARGET: &str = "redis://:secret@localhost:6379/0";

fn catalog(store: &MemoryConnector) -> KeyCatalogClient<MemoryConnector> {
    KeyCatalogClient::with_connector(store.clone(), Duration::from_secs(5))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn list_keys_returns_sorted_names_only() {
    let store = MemoryConnector::new();
    store.put("video:1", Entry::Str("a".into()));
    store.put("user:2", Entry::Str("b".into()));
    store.put("user:1", Entry::List(strings(&["x"])));

    let keys = catalog(&store).list_keys(TARGET).unwrap();
    let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, vec!["user:1", "user:2", "video:1"]);
    assert!(keys.iter().all(|k| k.value_type.is_none() && k.value.is_none()));
}

#[test]
fn list_keys_on_empty_store_is_empty() {
    let store = MemoryConnector::new();
    assert!(catalog(&store).list_keys(TARGET).unwrap().is_empty());
}

#[test]
fn describe_reads_every_container_type() {
    let store = MemoryConnector::new();
    store.put("s", Entry::Str("hello".into()));
    store.expire("s", 30);
    store.put("l", Entry::List(strings(&["c", "a", "b"])));
    store.put("set", Entry::Set(["x", "y"].iter().map(|s| s.to_string()).collect()));
    store.put("h", Entry::Hash(vec![("name".into(), "ana".into())]));
    store.put("z", Entry::ZSet(vec![("high".into(), 9.0), ("low".into(), 1.5)]));
    let catalog = catalog(&store);

    let scalar = catalog.describe_key(TARGET, "s").unwrap();
    assert_eq!(scalar.value_type, Some(ValueType::Scalar));
    assert_eq!(scalar.ttl, Some(30));
    assert_eq!(scalar.value, Some(KeyValue::Scalar("hello".into())));

    let list = catalog.describe_key(TARGET, "l").unwrap();
    assert_eq!(list.ttl, None);
    assert_eq!(list.value, Some(KeyValue::List(strings(&["c", "a", "b"]))));

    let set = catalog.describe_key(TARGET, "set").unwrap();
    let expected: BTreeSet<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
    assert_eq!(set.value, Some(KeyValue::Set(expected)));

    let map = catalog.describe_key(TARGET, "h").unwrap();
    assert_eq!(map.value_type, Some(ValueType::Map));
    assert_eq!(map.value, Some(KeyValue::Map(vec![("name".into(), "ana".into())])));

    let sorted = catalog.describe_key(TARGET, "z").unwrap();
    assert_eq!(
        sorted.value,
        Some(KeyValue::SortedSet(vec![
            ScoredMember { member: "low".into(), score: 1.5 },
            ScoredMember { member: "high".into(), score: 9.0 },
        ]))
    );
}

#[test]
fn describing_a_missing_key_is_not_an_error() {
    let store = MemoryConnector::new();
    let desc = catalog(&store).describe_key(TARGET, "nope").unwrap();
    assert_eq!(desc.name, "nope");
    assert!(desc.is_absent());
    assert_eq!(desc.ttl, None);
    assert_eq!(desc.value, None);
    assert_eq!(store.sent(), vec!["EXISTS"]);
}

#[test]
fn unrecognized_type_gets_a_placeholder() {
    let store = MemoryConnector::new();
    store.put("events", Entry::Other("stream".into()));
    let desc = catalog(&store).describe_key(TARGET, "events").unwrap();
    assert_eq!(desc.value_type, Some(ValueType::Unrecognized("stream".into())));
    assert_eq!(desc.value, Some(KeyValue::Placeholder(UNSUPPORTED_VALUE.into())));
}

#[test]
fn malformed_update_leaves_value_untouched() {
    let store = MemoryConnector::new();
    let original = Entry::Hash(vec![("name".into(), "ana".into())]);
    store.put("user:1", original.clone());

    let err = catalog(&store)
        .write_key(TARGET, "user:1", &ValueType::Map, "{not json", WriteMode::Update)
        .unwrap_err();
    assert!(matches!(err, KeyscopeError::Payload(_)));
    assert_eq!(store.entry("user:1"), Some(original));
    assert_eq!(store.opened(), 0);
}

#[test]
fn update_replaces_and_create_appends() {
    let store = MemoryConnector::new();
    store.put("queue", Entry::List(strings(&["old"])));
    let catalog = catalog(&store);

    catalog
        .write_key(TARGET, "queue", &ValueType::List, r#"["a", "b"]"#, WriteMode::Create)
        .unwrap();
    assert_eq!(store.entry("queue"), Some(Entry::List(strings(&["old", "a", "b"]))));

    catalog
        .write_key(TARGET, "queue", &ValueType::List, r#"["z"]"#, WriteMode::Update)
        .unwrap();
    assert_eq!(store.entry("queue"), Some(Entry::List(strings(&["z"]))));
}

#[test]
fn map_update_drops_old_fields() {
    let store = MemoryConnector::new();
    store.put("h", Entry::Hash(vec![("a".into(), "1".into()), ("b".into(), "2".into())]));
    catalog(&store)
        .write_key(TARGET, "h", &ValueType::Map, r#"{"c": "3"}"#, WriteMode::Update)
        .unwrap();
    assert_eq!(store.entry("h"), Some(Entry::Hash(vec![("c".into(), "3".into())])));
}

#[test]
fn scalar_update_is_a_plain_set() {
    let store = MemoryConnector::new();
    store.put("greeting", Entry::Str("hi".into()));
    catalog(&store)
        .write_key(TARGET, "greeting", &ValueType::Scalar, "hello", WriteMode::Update)
        .unwrap();
    assert_eq!(store.entry("greeting"), Some(Entry::Str("hello".into())));
    assert_eq!(store.sent(), vec!["SET"]);
}

#[test]
fn sorted_set_write_then_read() {
    let store = MemoryConnector::new();
    let catalog = catalog(&store);
    catalog
        .write_key(TARGET, "board", &ValueType::SortedSet, r#"{"bob": 2, "amy": 1}"#, WriteMode::Create)
        .unwrap();
    let desc = catalog.describe_key(TARGET, "board").unwrap();
    assert_eq!(
        desc.value,
        Some(KeyValue::SortedSet(vec![
            ScoredMember { member: "amy".into(), score: 1.0 },
            ScoredMember { member: "bob".into(), score: 2.0 },
        ]))
    );
}

#[test]
fn empty_container_update_only_deletes() {
    let store = MemoryConnector::new();
    store.put("tags", Entry::Set(["a".to_string()].into_iter().collect()));
    catalog(&store)
        .write_key(TARGET, "tags", &ValueType::Set, "[]", WriteMode::Update)
        .unwrap();
    assert_eq!(store.entry("tags"), None);
    assert_eq!(store.sent(), vec!["DEL"]);
}

#[test]
fn deleting_twice_succeeds() {
    let store = MemoryConnector::new();
    store.put("temp", Entry::Str("x".into()));
    let catalog = catalog(&store);
    catalog.delete_key(TARGET, "temp").unwrap();
    catalog.delete_key(TARGET, "temp").unwrap();
    assert_eq!(store.entry("temp"), None);
}

#[test]
fn malformed_target_is_a_config_error() {
    let store = MemoryConnector::new();
    let catalog = catalog(&store);
    for target in &["", "not a url", "http://localhost:6379", "redis://localhost/abc"] {
        let err = catalog.list_keys(target).unwrap_err();
        assert!(matches!(err, KeyscopeError::Config(_)), "{}: {:?}", target, err);
    }
    assert_eq!(store.opened(), 0);
}

#[test]
fn empty_key_name_is_rejected() {
    let store = MemoryConnector::new();
    let catalog = catalog(&store);
    assert!(matches!(catalog.describe_key(TARGET, ""), Err(KeyscopeError::Config(_))));
    assert!(matches!(catalog.delete_key(TARGET, ""), Err(KeyscopeError::Config(_))));
    assert!(matches!(
        catalog.write_key(TARGET, "", &ValueType::Scalar, "v", WriteMode::Create),
        Err(KeyscopeError::Config(_))
    ));
}

#[test]
fn unreachable_store_is_a_connection_error() {
    let store = MemoryConnector::refusing();
    let err = catalog(&store).list_keys(TARGET).unwrap_err();
    assert!(err.is_connection());
    // the redacted target is reported, never the password
    assert!(!err.to_string().contains("secret"));
}

#[test]
fn every_call_releases_its_connection() {
    let store = MemoryConnector::new();
    store.put("k", Entry::Str("v".into()));
    let catalog = catalog(&store);

    catalog.connect(TARGET).unwrap();
    catalog.list_keys(TARGET).unwrap();
    catalog.describe_key(TARGET, "k").unwrap();
    let _ = catalog.write_key(TARGET, "k", &ValueType::List, r#"["a"]"#, WriteMode::Create);
    catalog.delete_key(TARGET, "k").unwrap();

    assert_eq!(store.opened(), 5);
    assert_eq!(store.closed(), 5);
}

#[test]
fn failed_command_still_releases_connection() {
    let store = MemoryConnector::new();
    store.put("k", Entry::Str("v".into()));
    let err = catalog(&store)
        .write_key(TARGET, "k", &ValueType::List, r#"["a"]"#, WriteMode::Create)
        .unwrap_err();
    assert!(matches!(err, KeyscopeError::Protocol(_)));
    assert_eq!(store.closed(), 1);
}

#[test]
fn slow_describe_loses_the_race_but_releases_later() {
    let store = MemoryConnector::with_latency(Duration::from_millis(300));
    let catalog = KeyCatalogClient::with_connector(store.clone(), Duration::from_millis(50));

    let err = catalog.describe_key(TARGET, "missing").unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(store.closed(), 0);

    thread::sleep(Duration::from_millis(1000));
    assert_eq!(store.opened(), 1);
    assert_eq!(store.closed(), 1);
}

#[test]
fn describe_all_survives_a_failing_key() {
    let store = MemoryConnector::new();
    store.put("a", Entry::Str("1".into()));
    store.put("b", Entry::Str("2".into()));
    store.put("c", Entry::List(strings(&["x"])));
    store.poison("b");

    let all = catalog(&store).describe_all(TARGET).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].value, Some(KeyValue::Scalar("1".into())));
    assert_eq!(all[1].value_type, Some(ValueType::Unrecognized("unknown".into())));
    match &all[1].value {
        Some(KeyValue::Placeholder(text)) => assert!(text.starts_with("[error: ")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(all[2].value, Some(KeyValue::List(strings(&["x"]))));
    assert_eq!(store.opened(), 1);
}

#[test]
fn diagnose_reports_every_probe() {
    let store = MemoryConnector::new();
    store.put("k", Entry::Str("v".into()));
    let diag = catalog(&store).diagnose(TARGET);
    assert!(diag.connected);
    assert_eq!(diag.ping.as_deref(), Some("PONG"));
    assert!(diag.server_info);
    assert_eq!(diag.key_count, Some(1));
    assert!(diag.write_ok);
    assert_eq!(store.entry(WRITE_PROBE_KEY), None);
}

#[test]
fn diagnose_never_fails() {
    let refused = MemoryConnector::refusing();
    let diag = catalog(&refused).diagnose(TARGET);
    assert!(!diag.connected);
    assert!(diag.connection_error.is_some());

    let store = MemoryConnector::new();
    let diag = catalog(&store).diagnose("ftp://nowhere");
    assert!(!diag.connected);
    assert!(diag.connection_error.unwrap().contains("configuration"));
}

#[test]
fn server_report_types_numbers_and_tolerates_refused_config() {
    let store = MemoryConnector::new();
    let report = catalog(&store).server_report(TARGET).unwrap();
    assert_eq!(report.server["redis_version"], serde_json::json!("7.2.4"));
    assert_eq!(report.server["uptime_in_seconds"], serde_json::json!(3600));
    assert_eq!(report.memory["mem_fragmentation_ratio"], serde_json::json!(1.25));
    assert!(report.config.is_empty());
}

#[test]
fn concurrent_calls_do_not_interfere() {
    let store = MemoryConnector::new();
    store.put("shared", Entry::Str("v".into()));
    let catalog = catalog(&store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let catalog = catalog.clone();
            thread::spawn(move || {
                let name = format!("worker:{}", i);
                catalog
                    .write_key(TARGET, &name, &ValueType::Scalar, "x", WriteMode::Create)
                    .unwrap();
                catalog.describe_key(TARGET, "shared").unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().value, Some(KeyValue::Scalar("v".into())));
    }
    assert_eq!(catalog.list_keys(TARGET).unwrap().len(), 9);
    assert_eq!(store.opened(), store.closed());
}
