//! Values written and read back compare equal to the frame the write reports.

mod common;

use chrono::{FixedOffset, NaiveDate, TimeDelta};
use common::{MockSession, MockTable};
use mssql_frame::{
    describe_schema, insert, read, Column, DataType, Frame, SqlValue, WriteOptions,
};
use rust_decimal::Decimal;

fn events() -> MockTable {
    MockTable::new(&[
        ("id", "int", 4, 0, false),
        ("active", "bit", 1, 0, true),
        ("title", "nvarchar", 50, 0, true),
        ("score", "float", 8, 0, true),
        ("amount", "decimal", 10, 2, true),
        ("on_day", "date", 10, 0, true),
        ("at_time", "time", 16, 7, true),
        ("legacy", "datetime", 23, 3, true),
        ("coarse", "smalldatetime", 16, 0, true),
        ("precise", "datetime2", 27, 7, true),
        ("zoned", "datetimeoffset", 34, 7, true),
    ])
    .with_primary_key(&["id"])
}

fn events_frame() -> Frame {
    let day = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
    let legacy = day.and_hms_milli_opt(10, 15, 30, 2).unwrap();
    let coarse = day.and_hms_opt(23, 59, 31).unwrap();
    let precise = day.and_hms_nano_opt(1, 2, 3, 123_456_789).unwrap();
    let zoned = precise
        .and_local_timezone(FixedOffset::east_opt(2 * 3600).unwrap())
        .unwrap();

    Frame::new(vec![
        Column::from_values("id", DataType::Int64, [1i64, 2]).unwrap(),
        Column::from_values("active", DataType::Boolean, [Some(true), None]).unwrap(),
        Column::from_values("title", DataType::String, [Some("launch"), Some("ünïcode")]).unwrap(),
        Column::from_values("score", DataType::Float64, [0.25, -1e10]).unwrap(),
        Column::from_values("amount", DataType::Decimal, [Decimal::new(12345, 3), Decimal::new(-5, 1)])
            .unwrap(),
        Column::from_values("on_day", DataType::Date, [Some(day), None]).unwrap(),
        Column::from_values(
            "at_time",
            DataType::Time,
            [TimeDelta::nanoseconds(45_296_000_000_050), TimeDelta::zero()],
        )
        .unwrap(),
        Column::from_values("legacy", DataType::Timestamp, [Some(legacy), None]).unwrap(),
        Column::from_values("coarse", DataType::Timestamp, [Some(coarse), None]).unwrap(),
        Column::from_values("precise", DataType::Timestamp, [Some(precise), None]).unwrap(),
        Column::from_values("zoned", DataType::TimestampTz, [Some(zoned), None]).unwrap(),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_written_frame_reads_back_unchanged() {
    let mut session = MockSession::new().with_table("dbo.events", events());
    let outcome = insert(&mut session, "dbo.events", events_frame(), &WriteOptions::default())
        .await
        .unwrap();

    let schema = describe_schema(&mut session, "dbo.events", &[] as &[&str])
        .await
        .unwrap();
    let back = read(&mut session, "SELECT * FROM [dbo].[events]", &schema, &[])
        .await
        .unwrap();

    assert_eq!(back, outcome.frame);
}

#[tokio::test]
async fn test_rounded_columns_warn_once_each() {
    let mut session = MockSession::new().with_table("dbo.events", events());
    let outcome = insert(&mut session, "dbo.events", events_frame(), &WriteOptions::default())
        .await
        .unwrap();

    let mut warned: Vec<&str> = outcome.warnings.iter().map(|w| w.column.as_str()).collect();
    warned.sort_unstable();
    assert_eq!(
        warned,
        vec!["amount", "at_time", "coarse", "legacy", "precise", "zoned"]
    );

    let frame = &outcome.frame;
    assert_eq!(
        frame.column("amount").unwrap().values()[0],
        SqlValue::Decimal(Decimal::new(1235, 2))
    );
    assert_eq!(
        frame.column("at_time").unwrap().values()[0],
        SqlValue::Time(TimeDelta::nanoseconds(45_296_000_000_100))
    );
    let day = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
    assert_eq!(
        frame.column("legacy").unwrap().values()[0],
        SqlValue::DateTime(day.and_hms_milli_opt(10, 15, 30, 3).unwrap())
    );
    assert_eq!(
        frame.column("coarse").unwrap().values()[0],
        SqlValue::DateTime(NaiveDate::from_ymd_opt(2023, 11, 6).unwrap().and_hms_opt(0, 0, 0).unwrap())
    );
}
