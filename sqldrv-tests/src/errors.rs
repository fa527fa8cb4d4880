use crate::silent_logs;
use sqldrv::{
    Connection, Context, ContextError, NamedValue, NotImplemented, Rows, Statement, Value,
    is_bad_connection,
};
use std::time::Duration;

pub async fn errors<C: Connection>(connection: &mut C) {
    let ctx = Context::background();

    silent_logs! {
        // Syntax error, reported by the server
        let error = connection
            .exec_context(&ctx, "SELEC 1", &[])
            .await
            .err()
            .expect("Invalid SQL must fail");
        assert!(!is_bad_connection(&error));
        assert!(format!("{:#}", error).contains("syntax error"));

        let error = connection
            .query_context(&ctx, "SELECT 1 / $1::int", &NamedValue::positional([0]))
            .await
            .err()
            .expect("Division by zero must fail");
        assert!(!is_bad_connection(&error));
        assert!(format!("{:#}", error).contains("division by zero"));

        let error = connection
            .prepare_context(&ctx, "SELECT FROM WHERE")
            .await
            .err()
            .expect("Preparing invalid SQL must fail");
        assert!(!is_bad_connection(&error));
    }

    let statement = connection
        .prepare_context(&ctx, "SELECT 1")
        .await
        .expect("Could not prepare `SELECT 1`");
    assert_eq!(statement.num_input(), Some(0));
    let error = statement
        .exec(&[])
        .await
        .expect_err("Statement::exec must not be implemented");
    assert!(error.is::<NotImplemented>());
    let error = statement
        .query(&[Value::Null])
        .await
        .err()
        .expect("Statement::query must not be implemented");
    assert!(error.is::<NotImplemented>());
    statement
        .close()
        .await
        .expect("Could not close the statement");

    // The connection survives the failures above
    let mut rows = connection
        .query_context(&ctx, "SELECT 1", &[])
        .await
        .expect("The connection must still be usable");
    assert!(
        rows.next()
            .await
            .expect("Could not read the row")
            .is_some()
    );
    rows.close().expect("Could not close the rows");

    // Expired deadline
    let short = ctx.with_timeout(Duration::from_millis(500));
    connection
        .exec_context(&short, "SELECT pg_sleep(0.01)", &[])
        .await
        .expect("A fast query must fit the deadline");
    tokio::time::sleep(Duration::from_millis(600)).await;
    let error = connection
        .exec_context(&short, "SELECT 1", &[])
        .await
        .err()
        .expect("An expired context must fail");
    assert_eq!(
        error.downcast_ref::<ContextError>(),
        Some(&ContextError::DeadlineExceeded)
    );
}
