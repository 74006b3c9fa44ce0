//! Rows keep the indexes that existed when they were written.

mod common;

use common::{config, record};
use rowstore::{Backends, Field, RowQuery, RowSchema, RowStoreManager};
use serde_json::json;

fn query(index_name: &str, value: &str) -> RowQuery {
    RowQuery {
        owner: "alice".into(),
        collection: "crm".into(),
        schema_name: "customers".into(),
        index_name: index_name.into(),
        index_value: vec![value.into()],
    }
}

#[tokio::test]
async fn index_added_mid_stream() {
    let manager = RowStoreManager::new(config(), Backends::memory()).unwrap();
    manager
        .put_schema(
            "customers",
            RowSchema::new(
                "customers",
                vec![Field::new("email").indexed(), Field::new("id"), Field::new("name")],
            ),
        )
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "customers",
            json!({"id": "c1", "email": "ada@example.com", "name": "Ada"}),
        ))
        .unwrap();
    manager.flush().await;

    manager
        .put_schema(
            "customers",
            RowSchema::new(
                "customers",
                vec![
                    Field::new("email").indexed(),
                    Field::new("id").primary(),
                    Field::new("name"),
                ],
            ),
        )
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "customers",
            json!({"id": "c2", "email": "grace@example.com", "name": "Grace"}),
        ))
        .unwrap();
    manager.flush().await;

    // Written before `id` was an index: only reachable through email.
    assert_eq!(
        manager.query_rows(&query("email", "ada@example.com")).await.unwrap().len(),
        1
    );
    assert!(manager.query_rows(&query("id", "c1")).await.unwrap().is_empty());

    let grace = manager.query_rows(&query("id", "c2")).await.unwrap();
    assert_eq!(grace[0].data["name"], "Grace");
    assert_eq!(
        manager.query_rows(&query("email", "grace@example.com")).await.unwrap().len(),
        1
    );

    let partitions = manager.list_partitions("alice", "crm").await.unwrap();
    let names: Vec<&str> = partitions.iter().map(|p| p.index_name.as_str()).collect();
    assert_eq!(names, vec!["email", "id"]);
    manager.shutdown().await;
}

#[tokio::test]
async fn composite_index_added_mid_stream() {
    let manager = RowStoreManager::new(config(), Backends::memory()).unwrap();
    let fields = || {
        vec![
            Field::new("email").indexed(),
            Field::new("region"),
            Field::new("status"),
        ]
    };
    manager
        .put_schema("customers", RowSchema::new("customers", fields()))
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "customers",
            json!({"email": "ada@example.com", "region": "EU", "status": "active"}),
        ))
        .unwrap();
    manager.flush().await;

    manager
        .put_schema(
            "customers",
            RowSchema::new("customers", fields()).with_composite_index(&["region", "status"]),
        )
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "customers",
            json!({"email": "grace@example.com", "region": "EU", "status": "active"}),
        ))
        .unwrap();
    manager.flush().await;

    let partitions = manager.list_partitions("alice", "crm").await.unwrap();
    let names: Vec<&str> = partitions.iter().map(|p| p.index_name.as_str()).collect();
    assert_eq!(names, vec!["email", "region,status"]);

    let by_region = manager
        .query_rows(&RowQuery {
            index_value: vec!["EU".into(), "active".into()],
            ..query("region,status", "")
        })
        .await
        .unwrap();
    assert_eq!(by_region.len(), 1);
    assert_eq!(by_region[0].data["email"], "grace@example.com");
    manager.shutdown().await;
}

#[tokio::test]
async fn index_removed_keeps_catalog_entry_for_deletion() {
    let manager = RowStoreManager::new(config(), Backends::memory()).unwrap();
    manager
        .put_schema(
            "customers",
            RowSchema::new(
                "customers",
                vec![Field::new("email").indexed(), Field::new("id").primary()],
            ),
        )
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "customers",
            json!({"id": "c1", "email": "ada@example.com"}),
        ))
        .unwrap();
    manager.flush().await;

    manager
        .put_schema(
            "customers",
            RowSchema::new(
                "customers",
                vec![Field::new("email"), Field::new("id").primary()],
            ),
        )
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "customers",
            json!({"id": "c2", "email": "grace@example.com"}),
        ))
        .unwrap();
    manager.flush().await;

    // The new row has no email copy, the old one still does.
    assert!(manager
        .query_rows(&query("email", "grace@example.com"))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        manager.query_rows(&query("email", "ada@example.com")).await.unwrap().len(),
        1
    );

    let report = manager.delete_collection("alice", "crm").await.unwrap();
    assert_eq!(report.partitions_deleted, 2);
    assert!(manager
        .query_rows(&query("email", "ada@example.com"))
        .await
        .unwrap()
        .is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn record_for_unknown_schema_is_skipped_not_blocking() {
    let manager = RowStoreManager::new(config(), Backends::memory()).unwrap();
    manager
        .put_schema(
            "customers",
            RowSchema::new("customers", vec![Field::new("id").primary()]),
        )
        .unwrap();

    manager
        .submit(record("alice", "crm", "ghosts", json!({"id": "g1"})))
        .unwrap();
    manager
        .submit(record("alice", "crm", "customers", json!({"id": "c1"})))
        .unwrap();
    manager.flush().await;

    assert_eq!(manager.query_rows(&query("id", "c1")).await.unwrap().len(), 1);
    manager.shutdown().await;
}
