//! Integration tests for the Database API against on-disk SQLite files.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use rowmap_core::{ColumnMap, DynamicParameters, DynamicRow, ErrorKind, Mapper, Value};
use rowmap_sqlite::{Database, DbError};

rowmap_core::sql_enum!(Role: i32 { Guest, Member, Admin });

#[derive(Debug, Default, Clone, PartialEq)]
struct Person {
    id: i64,
    name: String,
    age: i32,
    role: Role,
    badge: Option<Uuid>,
    joined: Option<NaiveDateTime>,
}

rowmap_core::entity! {
    Person {
        id: i64 => "Id",
        name: String => "Name",
        age: i32 => "Age",
        role: Role => "Role",
        badge: Option<Uuid> => "Badge",
        joined: Option<NaiveDateTime> => "Joined",
    }
}

const SCHEMA: &str = "CREATE TABLE people (
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL,
    Age INTEGER NOT NULL,
    Role INTEGER NOT NULL,
    Badge UUID,
    Joined DATETIME
);";

const INSERT: &str = "INSERT INTO people (Id, Name, Age, Role, Badge, Joined)
    VALUES (@Id, @Name, @Age, @Role, @Badge, @Joined)";

fn joined() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 5, 17)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn people() -> Vec<Person> {
    vec![
        Person {
            id: 1,
            name: "Ada".into(),
            age: 36,
            role: Role::Admin,
            badge: Some(Uuid::from_u128(0x1234)),
            joined: Some(joined()),
        },
        Person {
            id: 2,
            name: "Brian".into(),
            age: 28,
            role: Role::Member,
            badge: None,
            joined: None,
        },
        Person {
            id: 3,
            name: "Cleo".into(),
            age: 51,
            ..Person::default()
        },
    ]
}

fn seeded() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("people.db")).unwrap();
    db.execute_batch(SCHEMA).unwrap();
    assert_eq!(db.execute_many(INSERT, &people()).unwrap(), 3);
    (dir, db)
}

#[test]
fn entities_round_trip_through_sqlite() {
    let (_dir, db) = seeded();
    let loaded: Vec<Person> = db.query("SELECT * FROM people ORDER BY Id", &()).unwrap();
    assert_eq!(loaded, people());
}

#[test]
fn scalar_and_first_queries() {
    let (_dir, db) = seeded();
    let count: Option<i32> = db.query_scalar("SELECT COUNT(*) FROM people", &()).unwrap();
    assert_eq!(count, Some(3));

    let mut params = DynamicParameters::new();
    params.add("name", "Brian");
    let found: Option<Person> = db
        .query_first("SELECT * FROM people WHERE Name = :name", &params)
        .unwrap();
    assert_eq!(found.map(|p| p.id), Some(2));

    params.add("name", "Nobody");
    let missing: Option<Person> = db
        .query_first("SELECT * FROM people WHERE Name = :name", &params)
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn list_parameters_expand_into_in_clauses() {
    let (_dir, db) = seeded();
    let mut params = DynamicParameters::new();
    params.add("ids", Value::List(vec![Value::I64(1), Value::I64(3)]));
    let names: Vec<String> = db
        .query("SELECT Name FROM people WHERE Id IN @ids ORDER BY Id", &params)
        .unwrap();
    assert_eq!(names, ["Ada", "Cleo"]);

    params.add("ids", Value::List(Vec::new()));
    let none: Vec<String> = db
        .query("SELECT Name FROM people WHERE Id IN @ids", &params)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn dynamic_rows_render_as_json() {
    let (_dir, db) = seeded();
    let rows = db
        .query_dynamic("SELECT Id, Name, Badge FROM people WHERE Id < 3 ORDER BY Id", &())
        .unwrap();
    insta::assert_json_snapshot!(rows, @r###"
    [
      {
        "Id": 1,
        "Name": "Ada",
        "Badge": "00000000-0000-0000-0000-000000001234"
      },
      {
        "Id": 2,
        "Name": "Brian",
        "Badge": null
      }
    ]
    "###);
}

#[test]
fn dynamic_rows_bind_back_as_parameters() {
    let (_dir, db) = seeded();
    let mut row: DynamicRow = db
        .query_first("SELECT Id, Age FROM people WHERE Id = 2", &())
        .unwrap()
        .unwrap();
    row.set("Age", Value::I32(29), false).unwrap();
    let updated = db
        .execute("UPDATE people SET Age = @Age WHERE Id = @Id", &row)
        .unwrap();
    assert_eq!(updated, 1);
    let age: Option<i32> = db.query_scalar("SELECT Age FROM people WHERE Id = 2", &()).unwrap();
    assert_eq!(age, Some(29));
}

#[test]
fn select_star_follows_schema_changes() {
    let (_dir, db) = seeded();
    let before = db.query_dynamic("SELECT * FROM people WHERE Id = 1", &()).unwrap();
    assert_eq!(before[0].len(), 6);

    db.execute_batch("ALTER TABLE people ADD COLUMN Nickname TEXT DEFAULT 'n/a'")
        .unwrap();
    let after = db.query_dynamic("SELECT * FROM people WHERE Id = 1", &()).unwrap();
    assert_eq!(after[0].len(), 7);
    assert_eq!(after[0].get("Nickname"), Some(&Value::from("n/a")));

    // Entities ignore the extra column.
    let typed: Vec<Person> = db.query("SELECT * FROM people WHERE Id = 1", &()).unwrap();
    assert_eq!(typed[0], people()[0]);
}

#[test]
fn column_aliases_come_from_the_mapper() {
    let (_dir, db) = seeded();
    let sql = "SELECT Id, Age AS YearsOld FROM people WHERE Id = 1";
    let unmapped: Vec<Person> = db.query(sql, &()).unwrap();
    assert_eq!(unmapped[0].age, 0);

    let mapper = Arc::new(Mapper::default());
    mapper.register_column_map::<Person>(ColumnMap::new().map("YearsOld", "Age"));
    let dir = tempfile::tempdir().unwrap();
    let mut aliased = Database::open(dir.path().join("aliased.db"))
        .unwrap()
        .with_mapper(mapper);
    aliased.execute_batch(SCHEMA).unwrap();
    aliased.execute_many(INSERT, &people()).unwrap();
    let mapped: Vec<Person> = aliased.query(sql, &()).unwrap();
    assert_eq!(mapped[0].age, 36);
}

#[test]
fn failed_batches_roll_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("rollback.db")).unwrap();
    db.execute_batch(SCHEMA).unwrap();

    let mut batch = people();
    batch[2].id = 1;
    let err = db.execute_many(INSERT, &batch).unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)));

    let count: Option<i64> = db.query_scalar("SELECT COUNT(*) FROM people", &()).unwrap();
    assert_eq!(count, Some(0));
}

#[test]
fn conversion_errors_surface_as_map_errors() {
    let (_dir, db) = seeded();
    let err = db
        .query::<i32, _>("SELECT Name FROM people WHERE Id = 1", &())
        .unwrap_err();
    assert_eq!(err.map_kind(), Some(ErrorKind::ColumnConversion));
    assert!(err.to_string().contains("Name"));
}

#[test]
fn opening_a_directory_fails_with_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Database::open(dir.path()).err().unwrap();
    assert!(matches!(err, DbError::Open { .. }));
}
