use sqldrv::{Connection, Context, NamedValue, Row, Rows, Value};
use time::macros::{date, datetime};

async fn fetch_one<C: Connection>(
    connection: &C,
    ctx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Row {
    let mut rows = connection
        .query_context(ctx, query, args)
        .await
        .unwrap_or_else(|e| panic!("Could not run `{}`: {:#}", query, e));
    let row = rows
        .next()
        .await
        .expect("Could not read the row")
        .expect("Expected one row");
    assert!(
        rows.next()
            .await
            .expect("Could not read past the row")
            .is_none()
    );
    rows.close().expect("Could not close the rows");
    row
}

pub async fn types<C: Connection>(connection: &mut C) {
    let ctx = Context::background();

    // Binary columns come back typed, the others as text
    let row = fetch_one(
        connection,
        &ctx,
        r#"SELECT
            true,
            2::int2,
            3::int4,
            4::int8,
            1.5::float8,
            'x'::text,
            12.5::numeric,
            '2024-01-02'::date,
            '12:30:00'::time,
            '2024-01-02 03:04:05.5'::timestamp,
            'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid,
            '\x0102'::bytea,
            '1 day 02:00:00'::interval,
            '{"a": 1}'::jsonb,
            NULL::int4,
            NULL::text"#,
        &[],
    )
    .await;
    assert_eq!(
        *row,
        [
            Value::Boolean(Some(true)),
            Value::Int16(Some(2)),
            Value::Int32(Some(3)),
            Value::Int64(Some(4)),
            Value::Float64(Some(1.5)),
            Value::Varchar(Some("x".into())),
            Value::Varchar(Some("12.5".into())),
            Value::Date(Some(date!(2024 - 01 - 02))),
            Value::Varchar(Some("12:30:00".into())),
            Value::Timestamp(Some(datetime!(2024-01-02 03:04:05.5))),
            Value::Varchar(Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())),
            Value::Blob(Some(vec![1, 2].into())),
            Value::Varchar(Some("1 day 02:00:00".into())),
            Value::Varchar(Some(r#"{"a": 1}"#.into())),
            Value::Int32(None),
            Value::Varchar(None),
        ]
    );

    // Parameters are converted to the type the server expects
    let row = fetch_one(
        connection,
        &ctx,
        "SELECT $1::numeric + 1, $2::uuid, $3::int2, $4::timestamptz",
        &NamedValue::positional([
            Value::Int64(Some(41)),
            Value::Varchar(Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())),
            Value::Int64(Some(-7)),
            Value::TimestampWithTimezone(Some(datetime!(2024-01-02 03:04:05 +2))),
        ]),
    )
    .await;
    assert_eq!(
        *row,
        [
            Value::Varchar(Some("42".into())),
            Value::Varchar(Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())),
            Value::Int16(Some(-7)),
            Value::TimestampWithTimezone(Some(datetime!(2024-01-02 01:04:05 UTC))),
        ]
    );

    // Text columns the typed values could not hold
    let row = fetch_one(
        connection,
        &ctx,
        "SELECT 'NaN'::numeric, '1e40'::numeric, ARRAY[1, NULL, 2]::int4[], ARRAY['a b', 'c']",
        &[],
    )
    .await;
    assert_eq!(
        *row,
        [
            Value::Varchar(Some("NaN".into())),
            Value::Varchar(Some(format!("1{}", "0".repeat(40)))),
            Value::Varchar(Some("{1,NULL,2}".into())),
            Value::Varchar(Some(r#"{"a b",c}"#.into())),
        ]
    );

    // Arguments are bound by ordinal, whatever their order in the slice
    let row = fetch_one(
        connection,
        &ctx,
        "SELECT $1::text || $2::text",
        &[
            NamedValue::named("second", 2, "B"),
            NamedValue::named("first", 1, "A"),
        ],
    )
    .await;
    assert_eq!(*row, [Value::Varchar(Some("AB".into()))]);

    let mut rows = connection
        .query_context(&ctx, "SELECT 1 WHERE false", &[])
        .await
        .expect("Could not run an empty query");
    assert_eq!(rows.columns(), ["?column?"]);
    assert!(
        rows.next()
            .await
            .expect("Could not read the empty result")
            .is_none()
    );
    rows.close().expect("Could not close the rows");
}
