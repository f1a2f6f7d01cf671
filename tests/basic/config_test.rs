use std::fs;

use tempfile::tempdir;
use vibe_api::config::{ApiDefinition, Config, DatabaseKind};

const HAND_WRITTEN: &str = r#"# Vibe API Configuration

## Database Info
```json
{
  "type": "postgresql",
  "connection": {
    "dbname": "shop",
    "host": "localhost",
    "port": 5432,
    "password_env_var": "SHOP_PASSWORD",
    "user_env_var": "SHOP_USER"
  },
  "schema": {
    "public": {
      "orders": {
        "columns": [
          {"name": "id", "type": "integer", "nullable": false},
          {"name": "total", "type": "numeric", "nullable": true}
        ],
        "primary_keys": ["id"],
        "foreign_keys": [],
        "indexes": [{"name": "orders_pkey", "columns": ["id"]}]
      }
    }
  }
}
```

## API Endpoints

- **GET** - /orders - List orders

## API Definitions

### API: orders
#### HTTP Method
GET
#### Path
/orders
#### Description
  List orders  
#### Implementation
```
1. Select every order
2. Return {"status": "success", "orders": [...]}
```

### API: orders_{id}
#### HTTP Method
DELETE
#### Path
/orders/{id}
#### Description
Delete an order
#### Implementation
```
1. Delete the order
```
"#;

#[test]
fn test_load_when_hand_written_expect_database_and_apis() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vibe-api.txt");
    fs::write(&path, HAND_WRITTEN).unwrap();

    let config = Config::load(&path).unwrap();
    let database = config.database.as_ref().unwrap();
    assert_eq!(database.kind, DatabaseKind::Postgresql);
    assert_eq!(database.connection.password_env_var(), "SHOP_PASSWORD");
    assert_eq!(database.connection.user_env_var(), "SHOP_USER");
    assert_eq!(
        config.schema()["public"]["orders"].primary_keys,
        vec!["id".to_owned()]
    );

    assert_eq!(config.apis.len(), 2);
    assert_eq!(config.apis[0].name, "orders");
    assert_eq!(config.apis[0].description, "List orders");
    assert_eq!(
        config.apis[0].implementation,
        "1. Select every order\n2. Return {\"status\": \"success\", \"orders\": [...]}"
    );
    assert_eq!(config.apis[1].method, "DELETE");
    assert_eq!(config.apis[1].path, "/orders/{id}");
}

#[test]
fn test_save_when_reloaded_expect_same_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vibe-api.txt");
    fs::write(&path, HAND_WRITTEN).unwrap();

    let mut config = Config::load(&path).unwrap();
    config.add_api(ApiDefinition::new(
        "POST",
        "/orders",
        "Create an order",
        "1. Insert the order\n2. Return it",
    ));
    config.remove_api(1).unwrap();
    config.save().unwrap();

    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded, config);
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("# Vibe API Configuration\n\n## Database Info\n```json\n{\n  \"type\": \"postgresql\""));
    assert!(written.contains("- **POST** - /orders - Create an order\n"));
    assert!(!written.contains("/orders/{id}"));
}

#[test]
fn test_save_when_no_database_expect_no_database_section() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested.txt");
    let mut config = Config::load(&path).unwrap();
    assert!(!config.has_database());
    config.add_api(ApiDefinition::new("GET", "/ping", "Health check", "1. Return ok"));
    config.save().unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(!written.contains("## Database Info"));
    assert_eq!(Config::load(&path).unwrap().apis, config.apis);
}
