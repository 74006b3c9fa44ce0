//! Ingest through every stage, then resolve fuzzy text to exact rows.

mod common;

use common::{letter_vector, manager_with_embeddings, record};
use rowstore::vector::naming::collection_name;
use rowstore::{Field, ResolveRequest, RowEmbeddingsRequest, RowQuery, RowSchema};
use serde_json::json;

fn streets() -> RowSchema {
    RowSchema::new(
        "streets",
        vec![Field::new("street").indexed(), Field::new("city")],
    )
}

#[tokio::test]
async fn fuzzy_street_resolves_to_city() {
    let (manager, vectors) = manager_with_embeddings();
    manager.put_schema("streets", streets()).unwrap();

    for (street, city) in [
        ("CHESTNUT ST", "Metropolis"),
        ("ELM ST", "Gotham"),
        ("MAPLE AVE", "Smallville"),
    ] {
        manager
            .submit(record(
                "alice",
                "geo",
                "streets",
                json!({"street": street, "city": city}),
            ))
            .unwrap();
    }
    manager.flush().await;

    let name = collection_name("alice", "geo", "streets", 26);
    assert_eq!(vectors.point_count(&name), 3);

    let resolved = manager
        .resolve(&ResolveRequest {
            owner: "alice".into(),
            collection: "geo".into(),
            schema_name: "streets".into(),
            text: Some("chestnut street".into()),
            vectors: None,
            index_name: Some("street".into()),
            limit: 3,
        })
        .await
        .unwrap();

    assert_eq!(resolved[0].candidate.index_value, vec!["CHESTNUT ST"]);
    assert_eq!(resolved[0].rows.len(), 1);
    assert_eq!(resolved[0].rows[0].data["city"], "Metropolis");
    assert!(resolved
        .windows(2)
        .all(|w| w[0].candidate.score >= w[1].candidate.score));
    manager.shutdown().await;
}

#[tokio::test]
async fn embedding_query_then_exact_lookup() {
    let (manager, _vectors) = manager_with_embeddings();
    manager.put_schema("streets", streets()).unwrap();
    manager
        .submit(record(
            "alice",
            "geo",
            "streets",
            json!({"street": "CHESTNUT ST", "city": "Metropolis"}),
        ))
        .unwrap();
    manager.flush().await;

    let response = manager
        .query_embeddings(&RowEmbeddingsRequest {
            vectors: vec![letter_vector("CHESNUT STREET")],
            owner: "alice".into(),
            collection: "geo".into(),
            schema_name: "streets".into(),
            index_name: None,
            limit: 5,
        })
        .await;
    assert!(response.error.is_none());
    let best = &response.matches[0];
    assert_eq!(best.text, "CHESTNUT ST");

    let rows = manager
        .query_rows(&RowQuery {
            owner: "alice".into(),
            collection: "geo".into(),
            schema_name: "streets".into(),
            index_name: best.index_name.clone(),
            index_value: best.index_value.clone(),
        })
        .await
        .unwrap();
    assert_eq!(rows[0].data["city"], "Metropolis");
    assert_eq!(rows[0].source, "integration");
    manager.shutdown().await;
}

#[tokio::test]
async fn other_dimensionality_is_not_searched() {
    let (manager, _vectors) = manager_with_embeddings();
    manager.put_schema("streets", streets()).unwrap();
    manager
        .submit(record(
            "alice",
            "geo",
            "streets",
            json!({"street": "CHESTNUT ST", "city": "Metropolis"}),
        ))
        .unwrap();
    manager.flush().await;

    let response = manager
        .query_embeddings(&RowEmbeddingsRequest {
            vectors: vec![vec![1.0, 0.0, 0.0]],
            owner: "alice".into(),
            collection: "geo".into(),
            schema_name: "streets".into(),
            index_name: None,
            limit: 5,
        })
        .await;
    assert!(response.error.is_none());
    assert!(response.matches.is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn other_owner_sees_nothing() {
    let (manager, _vectors) = manager_with_embeddings();
    manager.put_schema("streets", streets()).unwrap();
    manager
        .submit(record(
            "alice",
            "geo",
            "streets",
            json!({"street": "CHESTNUT ST", "city": "Metropolis"}),
        ))
        .unwrap();
    manager.flush().await;

    let resolved = manager
        .resolve(&ResolveRequest {
            owner: "bob".into(),
            collection: "geo".into(),
            schema_name: "streets".into(),
            text: Some("chestnut".into()),
            vectors: None,
            index_name: None,
            limit: 3,
        })
        .await
        .unwrap();
    assert!(resolved.is_empty());

    let rows = manager
        .query_rows(&RowQuery {
            owner: "bob".into(),
            collection: "geo".into(),
            schema_name: "streets".into(),
            index_name: "street".into(),
            index_value: vec!["CHESTNUT ST".into()],
        })
        .await
        .unwrap();
    assert!(rows.is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn shared_text_is_searchable_through_each_index() {
    let (manager, _vectors) = manager_with_embeddings();
    manager
        .put_schema(
            "companies",
            RowSchema::new(
                "companies",
                vec![Field::new("name").indexed(), Field::new("alias").indexed()],
            ),
        )
        .unwrap();
    manager
        .submit(record(
            "alice",
            "crm",
            "companies",
            json!({"name": "ACME", "alias": "ACME"}),
        ))
        .unwrap();
    manager.flush().await;

    for index_name in ["name", "alias"] {
        let response = manager
            .query_embeddings(&RowEmbeddingsRequest {
                vectors: vec![letter_vector("ACME")],
                owner: "alice".into(),
                collection: "crm".into(),
                schema_name: "companies".into(),
                index_name: Some(index_name.into()),
                limit: 5,
            })
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.matches.len(), 1, "{index_name}");
        assert_eq!(response.matches[0].index_name, index_name);
        assert_eq!(response.matches[0].index_value, vec!["ACME"]);
    }
    manager.shutdown().await;
}
