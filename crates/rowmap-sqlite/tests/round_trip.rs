//! Every built-in scalar kind survives being bound as a parameter and read
//! back through the single-column materializer.

use std::collections::HashSet;
use std::fmt::Debug;

use chrono::{FixedOffset, NaiveDate, TimeDelta, TimeZone};
use uuid::Uuid;

use rowmap_core::types::scalar_kind_of;
use rowmap_core::{Decimal, DynamicParameters, FromRow, ScalarKind, SqlType, Value};
use rowmap_sqlite::Database;

const ECHO: &str = "SELECT @v";

fn round_trip<T>(db: &Database, value: T) -> ScalarKind
where
    T: SqlType + FromRow + Clone + PartialEq + Debug,
{
    let name = std::any::type_name::<T>();
    let mut params = DynamicParameters::new();
    params.add("v", value.to_value());

    let back: Option<T> = db.query_scalar(ECHO, &params).unwrap();
    assert_eq!(back, Some(value.clone()), "{name}");

    let nullable: Option<Option<T>> = db.query_scalar(ECHO, &params).unwrap();
    assert_eq!(nullable, Some(Some(value)), "Option<{name}>");

    let mut null = DynamicParameters::new();
    null.add("v", Value::Null);
    let missing: Option<Option<T>> = db.query_scalar(ECHO, &null).unwrap();
    assert_eq!(missing, Some(None), "Option<{name}> from null");

    scalar_kind_of::<T>()
}

#[test]
fn every_scalar_kind_round_trips() {
    let db = Database::in_memory().unwrap();
    let at = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_milli_opt(13, 5, 0, 250)
        .unwrap();
    let offset = FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .from_local_datetime(&at)
        .single()
        .unwrap();

    let covered: HashSet<ScalarKind> = [
        round_trip(&db, true),
        round_trip(&db, -8i8),
        round_trip(&db, -16_000i16),
        round_trip(&db, -32i32),
        round_trip(&db, i64::MIN),
        round_trip(&db, 200u8),
        round_trip(&db, 60_000u16),
        round_trip(&db, u32::MAX),
        round_trip(&db, u64::MAX),
        round_trip(&db, 1.5f32),
        round_trip(&db, -0.1f64),
        round_trip(&db, "12.50".parse::<Decimal>().unwrap()),
        round_trip(&db, "héllo".to_string()),
        round_trip(&db, 'é'),
        round_trip(&db, Uuid::from_u128(0x67e5_5044_10b1_426f_9247_bb68_0e5f_e0c8)),
        round_trip(&db, at),
        round_trip(&db, offset),
        round_trip(&db, TimeDelta::milliseconds(90_061)),
        round_trip(&db, vec![0u8, 1, 254, 255]),
        round_trip(&db, Value::I64(7)),
    ]
    .into_iter()
    .collect();

    assert_eq!(covered, ScalarKind::ALL.into_iter().collect::<HashSet<_>>());
}
