use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use cellmap_api::{CellStore, CodecRegistry};
use cellmap_config_hcl::HclParser;
use cellmap_engine::{
    ConfigParser, EngineConfig, MappedTable, MutationBuilder, QueryBuilder, ResultBuilder, TableConfig,
    TableRegistry, TomlParser,
};
use cellmap_store_memory::{MemoryStore, MemoryStoreConfig};

use super::error::ToolError;

const TABLE: &str = "users";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub logins: i64,
    pub updated: i64,
}

/// Looks a user up by id, or every user whose id shares the table's
/// scan-key prefix.
pub struct UserQuery {
    pub id: String,
}

/// Build the user table over `store` from its configuration entry.
pub fn user_table(
    registry: &CodecRegistry,
    config: &EngineConfig,
    store: Arc<dyn CellStore>,
) -> Result<MappedTable<User, UserQuery>, ToolError> {
    let table = config.table(TABLE)?;
    let options = config.schema_options();

    let mutation = MutationBuilder::with_options(registry, options)
        .with_row_key(|u: &User| Some(u.id.clone()))
        .with_row_timestamp(|u: &User| Some(u.updated))
        .with_value("name", |u: &User| u.name.clone())
        .with_values("tag:", |u: &User| Some(u.tags.clone()))
        .with_delta("logins", |u: &User| Some(u.logins))
        .build()?;

    let result = ResultBuilder::with_options(registry, options, User::default)
        .from_row_key(|u: &mut User, id: String| u.id = id)
        .from_column("name", |u: &mut User, name: String| u.name = Some(name))
        .from_prefix("tag:", |u: &mut User, tags: BTreeMap<String, String>| u.tags = tags)
        .from_counter("logins", |u: &mut User, logins: i64| u.logins = logins)
        .build()?;

    let query = QueryBuilder::with_options(registry, options)
        .with_row_key(|q: &UserQuery| Some(q.id.clone()))
        .with_columns_of(&result);
    let query = match table.scan_key_size {
        Some(size) => query.with_scan_key_size(size),
        None => query,
    };

    Ok(MappedTable::new(table, mutation, query.build()?, result, store))
}

/// The store section of the configuration, with every configured table
/// created up front.
fn memory_store(config: &EngineConfig) -> Result<MemoryStore, ToolError> {
    let mut store_config: MemoryStoreConfig = match &config.store {
        Some(section) => serde_json::from_value(section.clone())?,
        None => MemoryStoreConfig::default(),
    };
    store_config
        .tables
        .extend(config.tables.iter().map(|t| t.name.clone()));
    Ok(MemoryStore::from_config(&store_config))
}

fn default_config() -> EngineConfig {
    EngineConfig {
        tables: vec![TableConfig {
            name: TABLE.to_string(),
            family: "d".to_string(),
            scan_key_size: Some(2),
        }],
        ..EngineConfig::default()
    }
}

/// Write two users, bump a counter, then read them back by key and by scan.
/// Returns the report printed by the binary.
pub fn run(config_path: Option<&str>) -> Result<String, ToolError> {
    let config = match config_path {
        Some(path) => {
            let parsers: [&dyn ConfigParser; 2] = [&TomlParser, &HclParser];
            EngineConfig::load_with(path, &parsers)?
        }
        None => default_config(),
    };

    let registry = CodecRegistry::with_defaults();
    let store: Arc<dyn CellStore> = Arc::new(memory_store(&config)?);
    let tables = TableRegistry::new();
    tables.register(user_table(&registry, &config, store)?);
    let users = tables.get::<User, UserQuery>(TABLE)?;

    let ann = User {
        id: "u1".to_string(),
        name: Some("Ann".to_string()),
        tags: [("x", "1"), ("y", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        logins: 1,
        updated: 1_000,
    };
    let bob = User {
        id: "u1-2024".to_string(),
        name: Some("Bob".to_string()),
        updated: 1_000,
        ..User::default()
    };
    let written = users.put_all([&ann, &bob])?;
    tracing::info!(table = TABLE, written, "wrote users");

    let login = User {
        id: ann.id.clone(),
        logins: 2,
        updated: 2_000,
        ..User::default()
    };
    users.put(&login)?;

    let mut report = String::new();
    let fetched = users.get(&UserQuery { id: "u1".to_string() })?;
    report.push_str("get u1:\n");
    match fetched {
        Some(parsed) => report.push_str(&serde_json::to_string_pretty(&parsed.value)?),
        None => report.push_str("(no row)"),
    }
    report.push('\n');

    let scanned = users.scan(&UserQuery { id: "u1".to_string() })?;
    report.push_str(&format!("scan u1 ({} rows):\n", scanned.len()));
    for row in scanned {
        report.push_str(&serde_json::to_string(&row.value)?);
        report.push('\n');
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_users_through_the_memory_store() {
        let report = run(None).unwrap();
        assert!(report.contains("\"name\": \"Ann\""));
        assert!(report.contains("\"logins\": 3"));
        assert!(report.contains("scan u1 (2 rows)"));
        assert!(report.contains("\"id\":\"u1-2024\""));
    }

    #[test]
    fn missing_table_config_fails() {
        let config = EngineConfig::default();
        let registry = CodecRegistry::with_defaults();
        let store: Arc<dyn CellStore> = Arc::new(MemoryStore::new(1));
        assert!(matches!(
            user_table(&registry, &config, store),
            Err(ToolError::Engine(cellmap_engine::EngineError::TableNotFound(_)))
        ));
    }
}
