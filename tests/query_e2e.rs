use std::sync::{Arc, RwLock};

use chrono::{NaiveDate, TimeZone, Utc};

use chain_events::query::match_text;
use chain_events::{tag_fields, CombinedTags, FieldTags, Query, QueryBuilder, TagMap, TagValue, Tagged};

struct Account {
    name: String,
    balance: u64,
    code: Vec<u8>,
    permissions: Vec<u32>,
}

tag_fields!(Account {
    "Name" => name,
    "Balance" => balance,
    "Code" => code,
    "Permissions" => permissions,
});

fn account() -> Account {
    Account {
        name: "Igor,Ivan".to_string(),
        balance: 1000,
        code: vec![0x60, 0x80],
        permissions: vec![1, 2, 4],
    }
}

#[test]
fn queries_over_record_fields() {
    let acc = account();
    let tags = FieldTags::new(&acc);

    for (query, expected) in [
        ("Name CONTAINS 'Igor'", true),
        ("Name CONTAINS 'Pavel'", false),
        ("Balance >= 1000 AND Balance < 1001", true),
        ("Balance > 1000", false),
        ("Code = '6080'", true),
        ("Permissions = '1;2;4'", true),
        ("Permissions CONTAINS '2;'", true),
        ("Name = 'Igor,Ivan' AND NOT Balance = 0", true),
        ("Missing = 'x' OR Balance = 1000", true),
        ("Missing = 'x' AND Balance = 1000", false),
    ] {
        let q = Query::parse(query).unwrap();
        assert_eq!(q.matches(&tags), expected, "{query}");
        assert_eq!(match_text(query, &tags).unwrap(), expected, "{query} (single pass)");
    }
}

#[test]
fn live_record_updates_affect_matching() {
    let handle = Arc::new(RwLock::new(account()));
    let tags = FieldTags::new(Arc::clone(&handle));
    let rich = Query::must_parse("Balance > 5000");

    assert!(!rich.matches(&tags));
    handle.write().unwrap().balance = 9000;
    assert!(rich.matches(&tags));
}

#[test]
fn time_and_date_queries() {
    let tags = TagMap::new()
        .with("tx.time", Utc.with_ymd_and_hms(2013, 5, 3, 14, 45, 0).unwrap())
        .with("tx.date", "2013-05-03");

    assert!(Query::must_parse("tx.time >= TIME 2013-05-03T14:45:00Z").matches(&tags));
    assert!(Query::must_parse("tx.time > TIME 2013-05-03T16:44:59+02:00").matches(&tags));
    assert!(!Query::must_parse("tx.time < TIME 2013-05-03T14:45:00Z").matches(&tags));
    assert!(Query::must_parse("tx.date >= DATE 2013-05-03 AND tx.date <= DATE 2013-05-03").matches(&tags));
    assert!(!Query::must_parse("tx.date > DATE 2013-05-03").matches(&tags));
}

#[test]
fn combined_tags_match_across_sources() {
    let acc = account();
    let fields = FieldTags::new(&acc);
    let extra = TagMap::new().with("Height", 45u64).with("Name", "shadowed");
    let merged = CombinedTags::merge(&[&fields, &extra]);

    assert!(Query::must_parse("Name CONTAINS 'Igor' AND Height = 45").matches(&merged));

    let concat = CombinedTags::concat(&[&fields, &extra]);
    assert_eq!(
        concat.get("Name"),
        Some(TagValue::List(vec!["Igor,Ivan".into(), "shadowed".into()]))
    );
    assert!(Query::must_parse("Name = 'shadowed'").matches(&concat));
    assert!(Query::must_parse("Name = 'Igor,Ivan'").matches(&concat));
}

#[test]
fn builder_round_trip_is_equivalent() {
    let tags = TagMap::new()
        .with("EventType", "CallEvent")
        .with("Height", 45u64)
        .with("Ratio", 0.25f64)
        .with("Finalized", true)
        .with("Day", "2017-01-01");

    let cases = [
        (QueryBuilder::new().and_equals("EventType", "CallEvent"), true),
        (QueryBuilder::new().and_not_equals("EventType", "CallEvent"), false),
        (QueryBuilder::new().and_greater_than_or_equal("Height", 45u64), true),
        (QueryBuilder::new().and_strictly_greater_than("Height", 45u64), false),
        (QueryBuilder::new().and_less_than_or_equal("Ratio", 0.25f64), true),
        (QueryBuilder::new().and_strictly_less_than("Ratio", 0.5f64), true),
        (QueryBuilder::new().and_equals("Finalized", true), true),
        (QueryBuilder::new().and_contains("EventType", "Call"), true),
        (
            QueryBuilder::new().and_equals("Day", NaiveDate::from_ymd_opt(2017, 1, 1).unwrap()),
            true,
        ),
    ];

    for (builder, expected) in cases {
        let compiled = builder.query().unwrap();
        assert_eq!(compiled.matches(&tags), expected, "{builder}");
        let reparsed = Query::parse(&compiled.to_string()).unwrap();
        assert_eq!(reparsed.matches(&tags), expected, "{compiled}");
    }
}

#[test]
fn parse_errors_report_position() {
    let err = Query::parse("Height >= 45 AND Name === 'x'").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("line 1"), "{msg}");
    assert!(msg.contains("symbol 24"), "{msg}");
}
