use crate::silent_logs;
use sqldrv::{
    Connection, Context, IsolationLevel, NamedValue, Row, Rows, Transaction, TxOptions, Value,
    is_bad_connection,
};

async fn single_row<C: Connection>(connection: &C, ctx: &Context, query: &str) -> Row {
    let mut rows = connection
        .query_context(ctx, query, &[])
        .await
        .unwrap_or_else(|e| panic!("Could not run `{}`: {:#}", query, e));
    let row = rows
        .next()
        .await
        .expect("Could not read the row")
        .expect("Expected one row");
    rows.close().expect("Could not close the rows");
    row
}

pub async fn transaction_options<C: Connection>(connection: &mut C) {
    let ctx = Context::background();
    let transaction = connection
        .begin_tx(&ctx, TxOptions::new(IsolationLevel::Serializable, true))
        .await
        .expect("Could not begin a serializable read only transaction");
    assert_eq!(
        *single_row(connection, &ctx, "SHOW transaction_isolation").await,
        [Value::Varchar(Some("serializable".into()))]
    );
    assert_eq!(
        *single_row(connection, &ctx, "SHOW transaction_read_only").await,
        [Value::Varchar(Some("on".into()))]
    );
    transaction
        .commit()
        .await
        .expect("Could not commit the read only transaction");

    let transaction = connection
        .begin_tx(&ctx, TxOptions::new(IsolationLevel::Snapshot, false))
        .await
        .expect("Could not begin a snapshot transaction");
    assert_eq!(
        *single_row(connection, &ctx, "SHOW transaction_isolation").await,
        [Value::Varchar(Some("repeatable read".into()))]
    );
    transaction
        .rollback()
        .await
        .expect("Could not roll back the snapshot transaction");

    let error = connection
        .begin_tx(&ctx, TxOptions::new(IsolationLevel::Linearizable, false))
        .await
        .err()
        .expect("Linearizable must be rejected");
    assert_eq!(error.to_string(), "unsupported isolation: Linearizable");
}

pub async fn transaction_rollback<C: Connection>(connection: &mut C) {
    let ctx = Context::background();
    connection
        .exec_context(&ctx, "DROP TABLE IF EXISTS sqldrv_rollback", &[])
        .await
        .expect("Could not drop sqldrv_rollback");

    let transaction = connection
        .begin()
        .await
        .expect("Could not begin a transaction");
    connection
        .exec_context(&ctx, "CREATE TABLE sqldrv_rollback (value INT)", &[])
        .await
        .expect("Could not create sqldrv_rollback");
    let result = connection
        .exec_context(
            &ctx,
            "INSERT INTO sqldrv_rollback VALUES ($1), ($2)",
            &NamedValue::positional([1, 2]),
        )
        .await
        .expect("Could not insert into sqldrv_rollback");
    assert_eq!(result.rows_affected, 2);
    transaction
        .rollback()
        .await
        .expect("Could not roll back the transaction");

    silent_logs! {
        let error = connection
            .exec_context(&ctx, "SELECT value FROM sqldrv_rollback", &[])
            .await
            .err()
            .expect("The table must not exist after the rollback");
        assert!(!is_bad_connection(&error));
    }

    let transaction = connection
        .begin()
        .await
        .expect("Could not begin a transaction");
    connection
        .exec_context(&ctx, "CREATE TABLE sqldrv_rollback (value INT)", &[])
        .await
        .expect("Could not create sqldrv_rollback");
    transaction
        .commit()
        .await
        .expect("Could not commit the transaction");
    assert_eq!(
        *single_row(connection, &ctx, "SELECT count(*) FROM sqldrv_rollback").await,
        [Value::Int64(Some(0))]
    );
    connection
        .exec_context(&ctx, "DROP TABLE sqldrv_rollback", &[])
        .await
        .expect("Could not drop sqldrv_rollback");
}
