//! End-to-end tests against `SQLite` databases in temporary files.

#![allow(missing_docs, clippy::float_cmp, clippy::too_many_lines)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{Entry, Person, Product, TestDb, names};
use strata::{Backend, DataType, Error, Int64, Pointer, Scalar, Store, Str, Time};
use strata_sqlite::{ConnectOptions, SqliteBackend};

#[test]
fn people_round_trip() {
    let db = TestDb::new();
    let store = db.store();

    let mut ann = Person::new("Ann");
    store.insert(&mut ann).expect("insert Ann");
    assert_eq!(ann.id.get(), Some(&1));

    let mut bo = Person::new("Bo");
    store.insert(&mut bo).expect("insert Bo");
    assert_eq!(bo.id.get(), Some(&2));

    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(names(&all), ["Ann", "Bo"]);

    let found: Option<Person> = store.find(&[DataType::from(1)]).expect("find");
    assert_eq!(found, Some(ann.clone()));

    store.delete(&mut ann).expect("delete");
    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(all, [bo]);

    assert!(store.find::<Person>(&[DataType::from(1)]).expect("find").is_none());
}

#[test]
fn update_rewrites_row() {
    let db = TestDb::new();
    let store = db.store();

    let mut ann = Person::new("Ann");
    store.insert(&mut ann).expect("insert");
    ann.name = Str::new("Annie");
    let result = store.update(&mut ann).expect("update");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.last_insert_id, None);

    let found: Option<Person> = store.find(&[DataType::from(1)]).expect("find");
    assert_eq!(found.and_then(|p| p.name.get().cloned()).as_deref(), Some("Annie"));
}

#[test]
fn bootstrap_is_idempotent() {
    let db = TestDb::new();
    {
        let store = db.store();
        store.insert(&mut Person::new("Ann")).expect("insert");
    }

    let store = db.store();
    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(names(&all), ["Ann"]);
}

#[test]
fn column_declarations() {
    let db = TestDb::new();
    let _store = db.store();

    let people = db.table_sql("people");
    assert!(people.contains(r#""Id" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"#), "{people}");
    assert!(people.contains(r#""Name" VARCHAR(255)"#), "{people}");

    let products = db.table_sql("products");
    for declaration in [
        r#""sku" VARCHAR(16) NOT NULL PRIMARY KEY"#,
        r#""Label" VARCHAR(255) NOT NULL"#,
        r#""email" VARCHAR(255) UNIQUE"#,
        r#""price" NUMERIC(10, 2)"#,
        r#""views" INTEGER"#,
        r#""listed" BOOLEAN"#,
        r#""added" DATETIME"#,
        r#""thumbnail" BLOB"#,
        r#""maker" INTEGER"#,
    ] {
        assert!(products.contains(declaration), "missing {declaration} in {products}");
    }

    let entries = db.table_sql("entries");
    assert!(entries.contains(r#"PRIMARY KEY ("account", "seq")"#), "{entries}");
}

#[test]
fn column_attributes_apply() {
    let db = TestDb::new();
    let store = db.store();

    let mut lamp = Product::new("LMP-1", "Lamp", "lamp@example.com");
    lamp.price.set(19.99);
    lamp.views.set(40);
    lamp.origin.set("warehouse");
    lamp.listed.set(true);
    let added = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).single().expect("valid time");
    lamp.added = Time::new(added);
    lamp.thumbnail.set(vec![0x89_u8, 0x50, 0x4e, 0x47]);
    let mut maker = Person::new("Ann");
    store.insert(&mut maker).expect("insert maker");
    lamp.maker = Pointer::from(maker.id.get().copied());
    store.insert(&mut lamp).expect("insert");

    // not insertable
    let stored: Product = store.find(&[DataType::from("LMP-1")]).expect("find").expect("row");
    assert!(stored.views.get().is_none());
    assert_eq!(stored.label, Str::new("Lamp"));
    assert_eq!(stored.price.get(), Some(&19.99));
    assert_eq!(stored.listed.get(), Some(&true));
    assert_eq!(stored.added.get(), Some(&added));
    assert_eq!(stored.thumbnail.get().map(Vec::len), Some(4));
    assert_eq!(stored.maker, Pointer::new(1));
    assert_eq!(stored.maker.kind(), strata::Kind::Pointer);

    // not updatable
    lamp.origin.set("store front");
    lamp.views.set(41);
    store.update(&mut lamp).expect("update");
    let stored: Product = store.find(&[DataType::from("LMP-1")]).expect("find").expect("row");
    assert_eq!(stored.origin, Str::new("warehouse"));
    assert_eq!(stored.views, Int64::new(41));

    // unique
    let mut copy = Product::new("LMP-2", "Lamp copy", "lamp@example.com");
    let err = store.insert(&mut copy).unwrap_err();
    assert!(matches!(err, Error::Execution { ref statement, .. } if statement == "insert"));

    // not nullable
    let mut unlabeled = Product::new("LMP-3", "", "other@example.com");
    unlabeled.label.clear();
    let err = store.insert(&mut unlabeled).unwrap_err();
    assert!(matches!(err, Error::Execution { .. }));
}

#[test]
fn compound_keys_and_hooks() {
    let db = TestDb::new();
    let store = db.store();

    let mut entry = Entry {
        account: Str::new("acc-1"),
        seq: Int64::new(1),
        memo: Str::new("  Opening Balance "),
    };
    let result = store.insert(&mut entry).expect("insert");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(entry.seq, Int64::new(1));
    assert_eq!(entry.memo, Str::new("opening balance"));

    store.insert(&mut Entry {
        account: Str::new("acc-1"),
        seq: Int64::new(2),
        memo: Str::new("Rent"),
    })
    .expect("insert");

    let found: Entry =
        store.find(&[DataType::from("acc-1"), DataType::from(2)]).expect("find").expect("row");
    assert_eq!(found.memo, Str::new("rent"));

    store.delete(&mut entry).expect("delete");
    assert!(entry.memo.get().is_none());
    assert_eq!(store.find_all::<Entry>().expect("find all").len(), 1);
}

#[test]
fn rollback_is_invisible() {
    let db = TestDb::new();
    let store = db.store();
    store.insert(&mut Person::new("Ann")).expect("insert");

    let (result, committed) = store
        .begin(|tx| -> strata::Result<()> {
            tx.insert(&mut Person::new("Bo"))?;

            let inside: Vec<Person> = tx.find_all()?;
            assert_eq!(names(&inside), ["Ann", "Bo"]);
            let outside: Vec<Person> = store.find_all()?;
            assert_eq!(names(&outside), ["Ann"]);

            Err(Error::Config("abandon".to_string()))
        })
        .go();

    assert!(!committed);
    assert!(matches!(result, Err(Error::Config(_))));
    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(names(&all), ["Ann"]);
}

#[test]
fn commit_is_visible() {
    let db = TestDb::new();
    let store = db.store();

    let (result, committed) = store
        .begin(|tx| {
            let mut bo = Person::new("Bo");
            tx.insert(&mut bo)?;
            bo.name = Str::new("Bobby");
            tx.update(&mut bo)?;
            Ok(bo)
        })
        .go();

    assert!(committed);
    let bo = result.expect("unit of work");
    let found: Option<Person> = store.find(&[bo.id.encode()]).expect("find");
    assert_eq!(found, Some(bo));
}

#[test]
fn outside_writes_survive_a_rollback() {
    let db = TestDb::new();
    let store = db.store();
    let (started, running) = mpsc::channel();

    thread::scope(|s| {
        let store = &store;
        s.spawn(move || {
            let (result, committed) = store
                .begin(|tx| -> strata::Result<()> {
                    tx.insert(&mut Person::new("Insider"))?;
                    started.send(()).expect("signal");
                    thread::sleep(Duration::from_millis(50));
                    Err(Error::Config("abandon".to_string()))
                })
                .go();
            assert!(!committed);
            assert!(matches!(result, Err(Error::Config(_))));
        });

        running.recv().expect("transaction started");
        store.insert(&mut Person::new("Outsider")).expect("insert");
    });

    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(names(&all), ["Outsider"]);
}

#[test]
fn reads_continue_while_a_transaction_writes() {
    let db = TestDb::new();
    let store = db.store();
    store.insert(&mut Person::new("Ann")).expect("insert");

    let (result, committed) = store
        .begin(|tx| {
            tx.insert(&mut Person::new("Bo"))?;
            let outside: Vec<Person> = store.find_all()?;
            Ok(names(&outside))
        })
        .go();

    assert!(committed);
    assert_eq!(result.expect("unit of work"), ["Ann"]);
    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(names(&all), ["Ann", "Bo"]);
}

#[test]
fn default_database_is_a_file() {
    if std::env::var_os("SQL_DATABASE").is_some() {
        return;
    }
    let options = <ConnectOptions as strata::FromEnv>::from_env().expect("options");
    assert_eq!(options.database, "strata.db");
}

#[test]
fn memory_databases_refuse_transactions() {
    common::init_tracing();
    let backend = SqliteBackend::connect_with(ConnectOptions {
        database: "file:refuse-tx?mode=memory&cache=shared".to_string(),
    })
    .expect("connect");
    assert!(!backend.supports_transactions());

    let store = Store::builder(backend.into_connection()).register::<Person>().start().expect("start");
    store.insert(&mut Person::new("Ann")).expect("insert");

    let ran = AtomicUsize::new(0);
    let (result, committed) = store
        .begin(|_| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .go();

    assert!(!committed);
    assert!(matches!(result, Err(Error::Begin(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(store.find_all::<Person>().expect("find all").len(), 1);
}

#[test]
fn transactions_are_serialized() {
    let db = TestDb::new();
    let store = db.store();
    let active = AtomicUsize::new(0);
    let overlaps = AtomicUsize::new(0);

    thread::scope(|s| {
        for i in 0..4 {
            let (store, active, overlaps) = (&store, &active, &overlaps);
            s.spawn(move || {
                let (result, committed) = store
                    .begin(|tx| {
                        if active.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tx.insert(&mut Person::new(&format!("worker-{i}")))?;
                        thread::sleep(Duration::from_millis(20));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .go();
                result.expect("unit of work");
                assert!(committed);
            });
        }
    });

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    let all: Vec<Person> = store.find_all().expect("find all");
    assert_eq!(all.len(), 4);
}

#[test]
fn named_statements_and_ad_hoc_sql() {
    let db = TestDb::new();
    let mut store = db.store();
    for name in ["Ann", "Bo", "Cy"] {
        store.insert(&mut Person::new(name)).expect("insert");
    }

    store
        .add_statement::<Person>("by_prefix", r#"SELECT * FROM "people" WHERE "Name" LIKE ? ORDER BY "Id""#)
        .expect("add statement");
    let matched: Vec<Person> = store.query_named("by_prefix", &[DataType::from("B%")]).expect("query");
    assert_eq!(names(&matched), ["Bo"]);

    store
        .add_statement::<Person>("rename", r#"UPDATE "people" SET "Name" = ? WHERE "Name" = ?"#)
        .expect("add statement");
    let result =
        store.exec_named::<Person>("rename", &[DataType::from("Cyrus"), DataType::from("Cy")]).expect("exec");
    assert_eq!(result.rows_affected, 1);

    let mut builder = store.sql_builder::<Person>().expect("builder");
    let select = builder.select().add(" ORDER BY ").identifier("Name").add(" DESC").sql();
    let ordered: Vec<Person> = store.query(select.text(), &[]).expect("query");
    assert_eq!(ordered.first().and_then(|p| p.name.get().cloned()).as_deref(), Some("Cyrus"));

    let result = store.exec(r#"DELETE FROM "people" WHERE "Name" <> ?"#, &[DataType::from("Ann")]).expect("exec");
    assert_eq!(result.rows_affected, 2);
}

#[test]
fn entities() {
    let db = TestDb::new();
    let store = db.store();

    let mut ann = store.entity(Person::new("Ann"));
    ann.insert().expect("insert");
    assert_eq!(ann.to_string(), "domain.Person(1, Ann)");

    ann.model_mut().name = Str::new("Anna");
    ann.save().expect("save");
    let found: Option<Person> = store.find(&[DataType::from(1)]).expect("find");
    assert_eq!(found.as_ref(), Some(ann.model()));

    ann.delete().expect("delete");
    assert!(store.find_all::<Person>().expect("find all").is_empty());
}
