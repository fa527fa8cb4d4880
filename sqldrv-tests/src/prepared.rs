use sqldrv::{Connection, Context, NamedValue, Rows, Statement, Value};

pub async fn prepared<C: Connection>(connection: &mut C) {
    let ctx = Context::background();
    let statement = connection
        .prepare_context(&ctx, "SELECT $1::int")
        .await
        .expect("Could not prepare `SELECT $1::int`");
    assert_eq!(statement.num_input(), Some(1));

    // Wider integer than the parameter
    let result = statement
        .exec_context(&ctx, &NamedValue::positional([5i64]))
        .await
        .expect("Could not execute the prepared statement");
    assert_eq!(result.rows_affected, 1);

    let mut rows = statement
        .query_context(&ctx, &NamedValue::positional([5i32]))
        .await
        .expect("Could not query the prepared statement");
    assert_eq!(rows.columns(), ["int4"]);
    let row = rows
        .next()
        .await
        .expect("Could not read the first row")
        .expect("Expected one row");
    assert_eq!(*row, [Value::Int32(Some(5))]);
    assert!(
        rows.next()
            .await
            .expect("Could not read past the first row")
            .is_none()
    );
    rows.close().expect("Could not close the rows");

    let mut rows = statement
        .query_context(&ctx, &[NamedValue::new(1, Value::Null)])
        .await
        .expect("Could not query with a null parameter");
    let row = rows
        .next()
        .await
        .expect("Could not read the null row")
        .expect("Expected one row");
    assert_eq!(*row, [Value::Int32(None)]);
    rows.close().expect("Could not close the rows");

    statement
        .close()
        .await
        .expect("Could not close the prepared statement");

    // Two statements prepared from the same text are independent
    let first = connection
        .prepare_context(&ctx, "SELECT $1::text || $2::text")
        .await
        .expect("Could not prepare the first statement");
    let second = connection
        .prepare_context(&ctx, "SELECT $1::text || $2::text")
        .await
        .expect("Could not prepare the second statement");
    first.close().await.expect("Could not close the first statement");
    let mut rows = second
        .query_context(&ctx, &NamedValue::positional(["left ", "right"]))
        .await
        .expect("The second statement must survive the first one being closed");
    let row = rows
        .next()
        .await
        .expect("Could not read the concatenation")
        .expect("Expected one row");
    assert_eq!(*row, [Value::Varchar(Some("left right".into()))]);
    rows.close().expect("Could not close the rows");
    second
        .close()
        .await
        .expect("Could not close the second statement");
}

pub async fn multiple_statements<C: Connection>(connection: &mut C) {
    let ctx = Context::background();
    connection
        .exec_context(
            &ctx,
            "CREATE TEMPORARY TABLE multi_a (v INT); CREATE TEMPORARY TABLE multi_b (v INT)",
            &[],
        )
        .await
        .expect("Could not run several statements without arguments");
    let result = connection
        .exec_context(
            &ctx,
            "INSERT INTO multi_a VALUES (1), (2); INSERT INTO multi_b VALUES (3)",
            &[],
        )
        .await
        .expect("Could not insert with several statements");
    // Count of the last statement
    assert_eq!(result.rows_affected, 1);

    let mut rows = connection
        .query_context(
            &ctx,
            "SELECT (SELECT count(*) FROM multi_a), (SELECT count(*) FROM multi_b)",
            &[],
        )
        .await
        .expect("Could not count the rows");
    let row = rows
        .next()
        .await
        .expect("Could not read the counts")
        .expect("Expected one row");
    assert_eq!(*row, [Value::Int64(Some(2)), Value::Int64(Some(1))]);
    rows.close().expect("Could not close the rows");

    // Arguments still go through the extended protocol
    let result = connection
        .exec_context(
            &ctx,
            "DELETE FROM multi_a WHERE v = $1",
            &NamedValue::positional([2]),
        )
        .await
        .expect("Could not delete with an argument");
    assert_eq!(result.rows_affected, 1);

    connection
        .exec_context(&ctx, "DROP TABLE multi_a; DROP TABLE multi_b", &[])
        .await
        .expect("Could not drop the tables");
}
