use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use cellmap_api::{
    Cell, CellMap, CellStore, CodecRegistry, ColumnSelection, Get, RowMutation, ScanRange,
};
use cellmap_engine::{
    DecodeErrorPolicy, EngineError, MappedTable, MutationBuilder, MutationSchema, QueryBuilder,
    ResultBuilder, ResultSchema, SchemaOptions, TableConfig, TableRegistry, UnknownCellPolicy,
};
use cellmap_store_memory::MemoryStore;
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
struct User {
    id: String,
    name: Option<String>,
    tags: BTreeMap<String, String>,
    visits: BTreeMap<String, i64>,
    logins: i64,
    seen: Option<DateTime<Utc>>,
    updated: i64,
}

struct ById(String);

fn registry() -> CodecRegistry {
    CodecRegistry::with_defaults()
}

fn mutation_schema(registry: &CodecRegistry) -> MutationSchema<User> {
    MutationBuilder::new(registry)
        .with_row_key(|u: &User| Some(u.id.clone()))
        .with_row_timestamp(|u: &User| Some(u.updated))
        .with_value("name", |u: &User| u.name.clone())
        .with_value("seen", |u: &User| u.seen)
        .with_values("tag:", |u: &User| Some(u.tags.clone()))
        .with_delta("logins", |u: &User| Some(u.logins))
        .with_timestamp(|u: &User| Some(u.updated + 1))
        .with_deltas("visit:", |u: &User| Some(u.visits.clone()))
        .build()
        .unwrap()
}

fn result_schema(registry: &CodecRegistry, options: SchemaOptions) -> ResultSchema<User> {
    ResultBuilder::with_options(registry, options, User::default)
        .from_row_key(|u: &mut User, id: String| u.id = id)
        .from_column("name", |u: &mut User, name: String| u.name = Some(name))
        .from_column("seen", |u: &mut User, seen: DateTime<Utc>| u.seen = Some(seen))
        .from_prefix("tag:", |u: &mut User, tags: BTreeMap<String, String>| u.tags = tags)
        .from_counter("logins", |u: &mut User, n: i64| u.logins = n)
        .from_counters("visit:", |u: &mut User, v: BTreeMap<String, i64>| u.visits = v)
        .build()
        .unwrap()
}

fn table_config(scan_key_size: Option<usize>) -> TableConfig {
    TableConfig {
        name: "users".to_string(),
        family: "d".to_string(),
        scan_key_size,
    }
}

fn users_table(
    registry: &CodecRegistry,
    store: Arc<MemoryStore>,
    options: SchemaOptions,
) -> MappedTable<User, ById> {
    store.create_table("users");
    let result = result_schema(registry, options);
    let query = QueryBuilder::with_options(registry, options)
        .with_row_key(|q: &ById| Some(q.0.clone()))
        .with_columns_of(&result)
        .with_scan_key_size(2)
        .build()
        .unwrap();
    MappedTable::new(&table_config(Some(2)), mutation_schema(registry), query, result, store)
}

fn ann() -> User {
    User {
        id: "u1".to_string(),
        name: Some("Ann".to_string()),
        tags: [("x", "1"), ("y", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        updated: 100,
        ..User::default()
    }
}

/// What a read returns: the write timestamp is not stored as a field.
fn as_read(user: User) -> User {
    User { updated: 0, ..user }
}

fn bytes_map(entries: &[(&str, &str)]) -> CellMap {
    entries
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

#[test]
fn user_round_trips_through_cells() {
    let registry = registry();
    let put = mutation_schema(&registry).to_put_cells(&ann()).unwrap().unwrap();
    assert_eq!(put.row_key, b"u1".to_vec());

    let cells: CellMap = put.cells.into_iter().map(|(q, c)| (q, c.value)).collect();
    assert_eq!(cells, bytes_map(&[("name", "Ann"), ("tag:x", "1"), ("tag:y", "2")]));

    let parsed = result_schema(&registry, SchemaOptions::default())
        .parse(b"u1", &cells)
        .unwrap();
    assert!(parsed.populated);
    assert_eq!(parsed.value, as_read(ann()));
}

#[test]
fn scan_key_prefix_bounds_the_scan() {
    let registry = registry();
    let query = QueryBuilder::new(&registry)
        .with_row_key(|q: &ById| Some(q.0.clone()))
        .with_scan_key_size(2)
        .build()
        .unwrap();
    let range = query.to_scan_range(&ById("u1-2024".to_string())).unwrap();
    assert_eq!(
        range,
        ScanRange {
            start: b"u1".to_vec(),
            stop: Some(b"u2".to_vec()),
        }
    );
}

#[test]
fn table_writes_reads_and_scans() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new(3));
    let users = users_table(&registry, store.clone(), SchemaOptions::default());

    let bob = User {
        id: "u1-2024".to_string(),
        name: Some("Bob".to_string()),
        updated: 100,
        ..User::default()
    };
    let carl = User {
        id: "u2".to_string(),
        name: Some("Carl".to_string()),
        updated: 100,
        ..User::default()
    };
    assert_eq!(users.put_all([&ann(), &bob, &carl]).unwrap(), 3);

    let got = users.get(&ById("u1".to_string())).unwrap().unwrap();
    assert_eq!(got.value, as_read(ann()));

    let names: Vec<Option<String>> = users
        .scan(&ById("u1".to_string()))
        .unwrap()
        .into_iter()
        .map(|p| p.value.name)
        .collect();
    assert_eq!(names, vec![Some("Ann".to_string()), Some("Bob".to_string())]);

    assert!(users.get(&ById("u9".to_string())).unwrap().is_none());
}

#[test]
fn counters_accumulate_and_zero_deltas_write_nothing() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new(3));
    let users = users_table(&registry, store.clone(), SchemaOptions::default());

    let login = |logins: i64, visits: &[(&str, i64)]| User {
        id: "u1".to_string(),
        logins,
        visits: visits.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        updated: 10,
        ..User::default()
    };

    assert!(users.put(&login(1, &[("home", 2)])).unwrap());
    assert!(users.put(&login(-1, &[("home", 1), ("cart", 1)])).unwrap());
    assert!(!users.put(&login(0, &[("home", 0)])).unwrap());

    let got = users.get(&ById("u1".to_string())).unwrap().unwrap().value;
    assert_eq!(got.logins, 0);
    assert_eq!(got.visits, [("cart".to_string(), 1), ("home".to_string(), 3)].into());
}

#[test]
fn cells_carry_their_resolved_timestamps() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new(3));
    let users = users_table(&registry, store.clone(), SchemaOptions::default());

    let user = User {
        visits: [("home".to_string(), 1)].into(),
        ..ann()
    };
    users.put(&user).unwrap();

    let name = store.versions("users", b"u1", "d", b"name").unwrap();
    assert_eq!(name[0].0, 100);
    let visit = store.versions("users", b"u1", "d", b"visit:home").unwrap();
    assert_eq!(visit[0].0, 101);
}

#[test]
fn missing_timestamp_writes_nothing() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new(3));
    store.create_table("users");

    let mutation = MutationBuilder::new(&registry)
        .with_row_key(|u: &User| Some(u.id.clone()))
        .with_timestamp(|u: &User| Some(u.updated))
        .with_value("name", |u: &User| u.name.clone())
        .with_timestamp(|_: &User| None)
        .with_values("tag:", |u: &User| Some(u.tags.clone()))
        .build()
        .unwrap();
    let result = result_schema(&registry, SchemaOptions::default());
    let query = QueryBuilder::new(&registry)
        .with_row_key(|q: &ById| Some(q.0.clone()))
        .with_columns_of(&result)
        .build()
        .unwrap();
    let users = MappedTable::new(&table_config(None), mutation, query, result, store.clone());

    let err = users.put(&ann()).unwrap_err();
    assert!(matches!(err, EngineError::MissingTimestamp { qualifier } if qualifier == b"tag:x"));
    assert!(users.get(&ById("u1".to_string())).unwrap().is_none());
}

#[test]
fn missing_row_key_fails_put_and_get() {
    let registry = registry();
    let mutation = MutationBuilder::new(&registry)
        .with_row_key(|u: &User| (!u.id.is_empty()).then(|| u.id.clone()))
        .with_row_timestamp(|u: &User| Some(u.updated))
        .with_value("name", |u: &User| u.name.clone())
        .build()
        .unwrap();
    let user = User {
        id: String::new(),
        ..ann()
    };
    assert!(matches!(mutation.to_mutation(&user), Err(EngineError::MissingRowKey)));

    let query = QueryBuilder::new(&registry)
        .with_row_key(|q: &ById| (!q.0.is_empty()).then(|| q.0.clone()))
        .build()
        .unwrap();
    assert!(matches!(query.to_get(&ById(String::new())), Err(EngineError::MissingRowKey)));
}

#[test]
fn foreign_cells_follow_the_unknown_cell_policy() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new(3));
    store.create_table("users");
    store
        .mutate(
            "users",
            "d",
            &RowMutation {
                row_key: b"u1".to_vec(),
                puts: [
                    (b"name".to_vec(), Cell { value: b"Ann".to_vec(), timestamp: 1 }),
                    (b"email".to_vec(), Cell { value: b"a@b".to_vec(), timestamp: 1 }),
                ]
                .into(),
                increments: BTreeMap::new(),
            },
        )
        .unwrap();

    let everything = Get {
        row_key: b"u1".to_vec(),
        selection: ColumnSelection::Family,
        filter: None,
    };
    let cells = store.get("users", "d", &everything).unwrap();

    let lenient = result_schema(&registry, SchemaOptions::default());
    assert_eq!(lenient.parse(b"u1", &cells).unwrap().value.name.as_deref(), Some("Ann"));

    let strict = result_schema(
        &registry,
        SchemaOptions {
            unknown_cells: UnknownCellPolicy::Reject,
            ..SchemaOptions::default()
        },
    );
    assert!(matches!(
        strict.parse(b"u1", &cells),
        Err(EngineError::UnknownCell { qualifier }) if qualifier == b"email"
    ));
}

#[test]
fn corrupt_cells_fail_or_are_skipped() {
    let registry = registry();
    let cells = bytes_map(&[("name", "Ann"), ("seen", "yesterday")]);

    let strict = result_schema(&registry, SchemaOptions::default());
    assert!(matches!(
        strict.parse(b"u1", &cells),
        Err(EngineError::Decode { qualifier, .. }) if qualifier == b"seen"
    ));

    let lenient = result_schema(
        &registry,
        SchemaOptions {
            decode_errors: DecodeErrorPolicy::SkipCell,
            ..SchemaOptions::default()
        },
    );
    let user = lenient.parse(b"u1", &cells).unwrap().value;
    assert_eq!(user.name.as_deref(), Some("Ann"));
    assert_eq!(user.seen, None);
}

#[test]
fn instants_use_their_registered_codec() {
    let registry = registry();
    let seen = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let user = User {
        seen: Some(seen),
        ..ann()
    };
    let put = mutation_schema(&registry).to_put_cells(&user).unwrap().unwrap();
    let stored = &put.cells[&b"seen".to_vec()].value;
    assert_eq!(stored, &b"2024-05-01T12:00:00Z".to_vec());

    let cells: CellMap = put.cells.into_iter().map(|(q, c)| (q, c.value)).collect();
    let parsed = result_schema(&registry, SchemaOptions::default()).parse(b"u1", &cells).unwrap();
    assert_eq!(parsed.value.seen, Some(seen));
}

#[test]
fn registry_hands_out_typed_tables() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new(1));
    let tables = TableRegistry::new();
    tables.register(users_table(&registry, store, SchemaOptions::default()));

    assert!(tables.contains("users"));
    assert_eq!(tables.table_names(), vec!["users".to_string()]);
    assert!(tables.get::<User, ById>("users").is_ok());
    assert!(matches!(tables.get::<User, ById>("orders"), Err(EngineError::TableNotFound(_))));
    assert!(matches!(tables.get::<String, ById>("users"), Err(EngineError::Config(_))));
}

fn arb_user() -> impl Strategy<Value = User> {
    (
        "[a-z0-9]{1,8}",
        proptest::option::of(".{0,12}"),
        proptest::collection::btree_map(".{0,6}", ".{0,6}", 0..5),
        0i64..1_000_000,
    )
        .prop_map(|(id, name, tags, updated)| User {
            id,
            name,
            tags,
            updated,
            ..User::default()
        })
}

proptest! {
    #[test]
    fn put_cells_are_stable_and_parse_back(user in arb_user()) {
        let registry = registry();
        let mutation = mutation_schema(&registry);
        let first = mutation.to_put_cells(&user).unwrap();
        prop_assert_eq!(&first, &mutation.to_put_cells(&user).unwrap());

        let cells: CellMap = first
            .map(|put| put.cells.into_iter().map(|(q, c)| (q, c.value)).collect())
            .unwrap_or_default();
        let parsed = result_schema(&registry, SchemaOptions::default())
            .parse(user.id.as_bytes(), &cells)
            .unwrap();
        prop_assert_eq!(parsed.populated, !cells.is_empty());
        prop_assert_eq!(parsed.value, as_read(user));
    }
}
