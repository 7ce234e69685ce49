//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use graph_detach::store::CollectionRow;
use graph_detach::{
    Catalog, CollectionKind, EntityMetadata, MemoryDatabase, SessionHolder, Stored,
};
use std::sync::Arc;

/// Routes `tracing` output to the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntityMetadata::new("A")
                .identifier("id")
                .scalar("label")
                .reference("b", "B"),
        )
        .and_then(|c| c.with_entity(EntityMetadata::new("B").identifier("id").scalar("name")))
        .and_then(|c| {
            c.with_entity(
                EntityMetadata::new("Company")
                    .identifier("id")
                    .scalar("name")
                    .collection("persons", CollectionKind::Set, "Person"),
            )
        })
        .and_then(|c| {
            c.with_entity(
                EntityMetadata::new("Person")
                    .identifier("id")
                    .scalar("name")
                    .reference("company", "Company")
                    .reference("address", "Address"),
            )
        })
        .and_then(|c| {
            c.with_entity(
                EntityMetadata::new("Address")
                    .identifier("id")
                    .scalar("street")
                    .sealed(),
            )
        })
        .and_then(|c| {
            c.with_entity(
                EntityMetadata::new("TreeObject")
                    .identifier("id")
                    .scalar("name")
                    .reference("parent", "TreeObject")
                    .collection("children", CollectionKind::Bag, "TreeObject"),
            )
        })
        .expect("fixture catalog is valid")
}

/// Database with:
///
/// - `A#1.b -> B#2`
/// - `Company#1.persons = {Person#1, Person#2}`
/// - `TreeObject#1` with children `#2` and `#3`, each pointing back at `#1`
/// - `Person#3.address -> Address#1` (sealed)
pub fn database() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new(catalog());

    db.insert(
        "A",
        1,
        [
            ("label", Stored::value("root")),
            ("b", Stored::reference("B", 2)),
        ],
    )
    .unwrap();
    db.insert("B", 2, [("name", Stored::value("Bob"))]).unwrap();

    db.insert("Company", 1, [("name", Stored::value("Acme"))]).unwrap();
    for (id, name) in [(1, "Alice"), (2, "Carol")] {
        db.insert(
            "Person",
            id,
            [
                ("name", Stored::value(name)),
                ("company", Stored::reference("Company", 1)),
                ("address", Stored::Null),
            ],
        )
        .unwrap();
    }
    db.insert_collection(
        "Company",
        1,
        "persons",
        CollectionRow::Elements(vec![
            Stored::reference("Person", 1),
            Stored::reference("Person", 2),
        ]),
    )
    .unwrap();

    db.insert("Address", 1, [("street", Stored::value("Main St"))]).unwrap();
    db.insert(
        "Person",
        3,
        [
            ("name", Stored::value("Dave")),
            ("company", Stored::Null),
            ("address", Stored::reference("Address", 1)),
        ],
    )
    .unwrap();

    db.insert(
        "TreeObject",
        1,
        [("name", Stored::value("root")), ("parent", Stored::Null)],
    )
    .unwrap();
    for id in [2, 3] {
        db.insert(
            "TreeObject",
            id,
            [
                ("name", Stored::value(format!("leaf-{}", id))),
                ("parent", Stored::reference("TreeObject", 1)),
            ],
        )
        .unwrap();
    }
    db.insert_collection(
        "TreeObject",
        1,
        "children",
        CollectionRow::Elements(vec![
            Stored::reference("TreeObject", 2),
            Stored::reference("TreeObject", 3),
        ]),
    )
    .unwrap();

    Arc::new(db)
}

pub fn holder() -> (Arc<MemoryDatabase>, SessionHolder) {
    init_tracing();
    let db = database();
    let holder = SessionHolder::new(db.clone());
    (db, holder)
}
