// Integration tests for the NomadBase CRUD surface
use nomadbase_core::{Database, MemoryBlobStore, MemoryKeyValueStore, NomadError};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

// Helper: database over in-memory collaborators
fn memory_db() -> Database {
    Database::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(MemoryKeyValueStore::new()),
    )
}

// =============================================================================
// COLLECTION LIFECYCLE
// =============================================================================

#[test]
fn test_create_list_drop_collection() {
    let db = memory_db();
    db.create_collection("users").unwrap();
    db.create_collection("orders").unwrap();

    assert_eq!(db.list_collections().unwrap(), vec!["orders", "users"]);

    assert!(db.drop_collection("orders").unwrap());
    assert!(!db.drop_collection("orders").unwrap());
    assert_eq!(db.list_collections().unwrap(), vec!["users"]);
}

#[test]
fn test_create_twice_fails() {
    let db = memory_db();
    db.create_collection("users").unwrap();
    assert!(matches!(
        db.create_collection("users").unwrap_err(),
        NomadError::CollectionExists(_)
    ));
}

#[test]
fn test_collection_requires_registration() {
    let db = memory_db();
    assert!(matches!(
        db.collection("ghost").unwrap_err(),
        NomadError::CollectionNotFound(_)
    ));
}

// =============================================================================
// INSERT + FIND
// =============================================================================

#[test]
fn test_insert_and_find_round_trip() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();

    let stored = users
        .insert_one(json!({"name": "Alice", "age": 29}))
        .unwrap();
    let id = stored["_id"].as_str().unwrap().to_string();

    let found = users.find_one(&json!({"_id": id})).unwrap().unwrap();
    assert_eq!(found["name"], "Alice");
    assert_eq!(found["age"], 29);
}

#[test]
fn test_insert_rejects_reserved_fields() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    let err = users.insert_one(json!({"_secret": 1})).unwrap_err();
    assert!(matches!(err, NomadError::InvalidDocument(_)));
    assert_eq!(users.count_documents(&json!({})).unwrap(), 0);
}

#[test]
fn test_insert_duplicate_id_rejected() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_one(json!({"_id": "u1", "n": 1})).unwrap();

    let err = users.insert_one(json!({"_id": "u1", "n": 2})).unwrap_err();
    assert!(err.to_string().contains("u1"));
    assert_eq!(users.count_documents(&json!({})).unwrap(), 1);
}

#[test]
fn test_insert_many_is_all_or_nothing_on_validation() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();

    let err = users
        .insert_many(vec![
            json!({"name": "ok"}),
            json!({"_reserved": true}),
        ])
        .unwrap_err();
    assert!(matches!(err, NomadError::InvalidDocument(_)));
    assert_eq!(users.count_documents(&json!({})).unwrap(), 0);

    users
        .insert_many(vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})])
        .unwrap();
    assert_eq!(users.count_documents(&json!({})).unwrap(), 3);
}

#[test]
fn test_find_with_operators() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users
        .insert_many(vec![
            json!({"name": "Alice", "age": 29, "city": "Vienna"}),
            json!({"name": "Bob", "age": 35, "city": "Graz"}),
            json!({"name": "Carol", "age": 22, "city": "Vienna"}),
        ])
        .unwrap();

    let adults = users.find(&json!({"age": {"$gt": 25}})).unwrap();
    assert_eq!(adults.len(), 2);

    let either = users
        .find(&json!({"$or": [{"city": "Graz"}, {"age": {"$lt": 25}}]}))
        .unwrap();
    assert_eq!(either.len(), 2);

    // order preserved from storage
    let all = users.find(&json!({})).unwrap();
    assert_eq!(all[0]["name"], "Alice");
    assert_eq!(all[2]["name"], "Carol");
}

#[test]
fn test_invalid_query_propagates() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    let err = users.find(&json!({"age": {"$between": [1, 2]}})).unwrap_err();
    assert!(err.to_string().contains("$between"));
}

// =============================================================================
// UPDATE
// =============================================================================

#[test]
fn test_update_one_counts_and_content() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_one(json!({"_id": "u1", "age": 29, "logins": 0})).unwrap();

    let (matched, modified) = users
        .update_one(
            &json!({"_id": "u1"}),
            &json!({"$inc": {"logins": 1}, "$set": {"age": 30}}),
        )
        .unwrap();
    assert_eq!((matched, modified), (1, 1));

    let doc = users.find_one(&json!({"_id": "u1"})).unwrap().unwrap();
    assert_eq!(doc["age"], 30);
    assert_eq!(doc["logins"], 1);
}

#[test]
fn test_update_one_no_match() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_one(json!({"_id": "u1", "age": 29})).unwrap();

    let (matched, modified) = users
        .update_one(&json!({"_id": "nobody"}), &json!({"$set": {"age": 1}}))
        .unwrap();
    assert_eq!((matched, modified), (0, 0));
}

#[test]
fn test_update_many() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users
        .insert_many(vec![
            json!({"city": "Vienna", "visits": 1}),
            json!({"city": "Vienna", "visits": 5}),
            json!({"city": "Graz", "visits": 2}),
        ])
        .unwrap();

    let (matched, modified) = users
        .update_many(&json!({"city": "Vienna"}), &json!({"$inc": {"visits": 10}}))
        .unwrap();
    assert_eq!((matched, modified), (2, 2));

    let total: i64 = users
        .find(&json!({}))
        .unwrap()
        .iter()
        .map(|d| d["visits"].as_i64().unwrap())
        .sum();
    assert_eq!(total, 1 + 5 + 2 + 20);
}

#[test]
fn test_min_tie_reports_modified_but_persists_nothing() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_one(json!({"_id": "u1", "age": 29})).unwrap();

    // a tie: the engine reports modified, the stored document is unchanged
    let (matched, modified) = users
        .update_one(&json!({"_id": "u1"}), &json!({"$min": {"age": 29}}))
        .unwrap();
    assert_eq!((matched, modified), (1, 1));

    let doc = users.find_one(&json!({"_id": "u1"})).unwrap().unwrap();
    assert_eq!(doc["age"], 29);
}

#[test]
fn test_replacement_update_keeps_id() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_one(json!({"_id": "u1", "name": "old", "junk": 1})).unwrap();

    users
        .update_one(&json!({"_id": "u1"}), &json!({"name": "new"}))
        .unwrap();

    let doc = users.find_one(&json!({"_id": "u1"})).unwrap().unwrap();
    assert_eq!(doc, json!({"_id": "u1", "name": "new"}));
}

#[test]
fn test_invalid_update_spec_fails_even_without_matches() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();

    // no document matches, but the malformed spec must still fail fast
    let err = users
        .update_one(&json!({"_id": "nobody"}), &json!({"$unset": {"a": 1}}))
        .unwrap_err();
    assert!(err.to_string().contains("$unset"));
}

#[test]
fn test_invalid_update_leaves_data_untouched() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_one(json!({"_id": "u1", "age": 29})).unwrap();

    let err = users
        .update_one(&json!({"_id": "u1"}), &json!({"$inc": {"age": "one"}}))
        .unwrap_err();
    assert!(matches!(err, NomadError::InvalidUpdate(_)));

    let doc = users.find_one(&json!({"_id": "u1"})).unwrap().unwrap();
    assert_eq!(doc["age"], 29);
}

// =============================================================================
// DELETE
// =============================================================================

#[test]
fn test_delete_one_and_many() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users
        .insert_many(vec![
            json!({"kind": "a"}),
            json!({"kind": "b"}),
            json!({"kind": "b"}),
            json!({"kind": "c"}),
        ])
        .unwrap();

    assert_eq!(users.delete_one(&json!({"kind": "b"})).unwrap(), 1);
    assert_eq!(users.count_documents(&json!({"kind": "b"})).unwrap(), 1);

    assert_eq!(users.delete_many(&json!({"kind": {"$gt": "a"}})).unwrap(), 2);
    assert_eq!(users.count_documents(&json!({})).unwrap(), 1);

    assert_eq!(users.delete_many(&json!({"kind": "zzz"})).unwrap(), 0);
}

// =============================================================================
// FILE-BACKED DURABILITY
// =============================================================================

#[test]
fn test_file_backed_database_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        let users = db.create_collection("users").unwrap();
        users.insert_one(json!({"_id": "u1", "name": "Alice"})).unwrap();
        users.insert_one(json!({"_id": "u2", "name": "Bob"})).unwrap();
    }

    // a fresh stateless run over the same durable storage
    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.list_collections().unwrap(), vec!["users"]);

    let users = db.collection("users").unwrap();
    assert_eq!(users.count_documents(&json!({})).unwrap(), 2);
    let alice = users.find_one(&json!({"name": "Alice"})).unwrap().unwrap();
    assert_eq!(alice["_id"], "u1");
}

#[test]
fn test_file_backed_drop_removes_bundle() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).unwrap();
    db.create_collection("users").unwrap();
    assert!(dir.path().join("collections/users.json").is_file());

    db.drop_collection("users").unwrap();
    assert!(!dir.path().join("collections/users.json").exists());
}

#[test]
fn test_document_count_tracked_in_master_index() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    users.insert_many(vec![json!({"n": 1}), json!({"n": 2})]).unwrap();
    users.delete_one(&json!({"n": 1})).unwrap();

    let metadata = db.master_index().get_collection("users").unwrap().unwrap();
    assert_eq!(metadata.document_count, 1);
}
