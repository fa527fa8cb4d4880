mod fake;

#[cfg(test)]
mod tests {
    use super::fake::{FakeConnection, FakeError, FakePool, Failure};
    use sqldrv_core::{
        BadConnection, Connection, Connector, Context, ContextError, Driver, IsolationLevel,
        NamedValue, NotImplemented, Rows, Statement, Transaction, TxOptions,
        UnsupportedIsolation, Value, is_bad_connection,
    };
    use sqldrv_postgres::{
        BackendTxOptions, PostgresConnection, PostgresConnector, PostgresDriver,
        DEALLOCATE_TIMEOUT, PostgresTransaction, ResetSql, ResultFormats, TxAccessMode,
        TxIsoLevel, tx_options,
    };
    use sqldrv_tests::{init_logs, silent_logs};
    use std::{sync::Arc, time::Duration};
    use tokio::time::Instant;

    async fn connect(pool: &FakePool) -> PostgresConnection<FakeConnection> {
        PostgresConnector::new(PostgresDriver::new(), pool.clone())
            .connect(&Context::background())
            .await
            .expect("Could not connect to the fake pool")
    }

    fn row(values: &[i32]) -> Box<[Value]> {
        values.iter().map(|v| Value::Int32(Some(*v))).collect()
    }

    #[tokio::test]
    async fn closed_connection_is_bad() {
        init_logs();
        let pool = FakePool::new();
        let mut connection = connect(&pool).await;
        pool.with(|s| s.closed = true);
        let ctx = Context::background();
        assert!(connection.is_closed());

        let error = connection
            .prepare_context(&ctx, "SELECT 1")
            .await
            .err()
            .expect("prepare must fail");
        assert!(is_bad_connection(&error));
        let error = connection
            .exec_context(&ctx, "DELETE FROM t", &[])
            .await
            .expect_err("exec must fail");
        assert!(is_bad_connection(&error));
        let error = connection
            .query_context(&ctx, "SELECT 1", &[])
            .await
            .err()
            .expect("query must fail");
        assert!(is_bad_connection(&error));
        let error = connection
            .begin_tx(&ctx, TxOptions::default())
            .await
            .err()
            .expect("begin must fail");
        assert!(is_bad_connection(&error));
        let mut raw = None;
        let error = connection
            .begin_tx_with(&ctx, TxOptions::default(), Some(&mut raw))
            .await
            .err()
            .expect("begin with the escape hatch must fail");
        assert!(is_bad_connection(&error));
        assert!(raw.is_none());
        let error = connection
            .reset_session(&ctx)
            .await
            .expect_err("reset must fail");
        assert!(is_bad_connection(&error));
        let error = connection.ping(&ctx).await.expect_err("ping must fail");
        assert!(is_bad_connection(&error));
        assert_eq!(error.to_string(), "driver: bad connection");

        assert_eq!(pool.calls(), ["acquire"]);
        connection.close().expect("close never fails");
        assert_eq!(pool.with(|s| s.released), 1);
    }

    #[tokio::test]
    async fn statement_names_are_unique() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let ctx = Context::background();
        let mut names = Vec::new();
        for _ in 0..3 {
            let statement = connection
                .prepare_context(&ctx, "SELECT 1")
                .await
                .expect("Could not prepare");
            names.push(statement.name().to_string());
            statement.close().await.expect("Could not close");
        }
        let kept = connection
            .prepare_context(&ctx, "SELECT 2")
            .await
            .expect("Could not prepare");
        names.push(kept.name().to_string());
        assert_eq!(names, ["pgx_0", "pgx_1", "pgx_2", "pgx_3"]);
        assert_eq!(pool.with(|s| s.prepared.clone()), names);
        assert_eq!(kept.description().sql, "SELECT 2");
        drop(kept);
        connection.close().expect("Could not close");

        // Counter is per connection
        let connection = connect(&pool).await;
        let statement = connection
            .prepare_context(&ctx, "SELECT 3")
            .await
            .expect("Could not prepare");
        assert_eq!(statement.name(), "pgx_0");
    }

    #[tokio::test]
    async fn retry_safe_failures_become_bad_connection() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let ctx = Context::background();

        pool.with(|s| s.exec_failure = Some(Failure::RetrySafe));
        let error = connection
            .exec_context(&ctx, "UPDATE t SET v = 1", &[])
            .await
            .expect_err("exec must fail");
        assert!(error.is::<BadConnection>());
        assert!(error.downcast_ref::<FakeError>().is_none());

        pool.with(|s| s.query_failure = Some(Failure::RetrySafe));
        let error = connection
            .query_context(&ctx, "SELECT 1", &[])
            .await
            .err()
            .expect("query must fail");
        assert!(is_bad_connection(&error));

        silent_logs! {
            pool.with(|s| {
                s.exec_failure = Some(Failure::Fatal);
                s.query_failure = Some(Failure::Fatal);
            });
            let error = connection
                .exec_context(&ctx, "UPDATE t SET v = 1", &[])
                .await
                .expect_err("exec must fail");
            assert!(!is_bad_connection(&error));
            assert!(error.downcast_ref::<FakeError>().is_some_and(|e| !e.retry_safe));
            let error = connection
                .query_context(&ctx, "SELECT 1", &[])
                .await
                .err()
                .expect("query must fail");
            assert!(!is_bad_connection(&error));
            assert_eq!(error.to_string(), "fake backend failure (retry safe: false)");
        }

        // A failed operation does not close the connection
        pool.with(|s| {
            s.exec_failure = None;
            s.rows_affected = 3;
        });
        let result = connection
            .exec_context(&ctx, "UPDATE t SET v = 1", &[])
            .await
            .expect("exec must succeed");
        assert_eq!(result.rows_affected, 3);
        assert_eq!(result.last_affected_id, None);
    }

    #[tokio::test]
    async fn query_reads_the_first_row_ahead() {
        let pool = FakePool::new();
        pool.with(|s| {
            s.columns = vec!["a".into(), "b".into()];
            s.rows = vec![row(&[1, 2]), row(&[3, 4])];
        });
        let connection = connect(&pool).await;
        let ctx = Context::background();
        let mut rows = connection
            .query_context(&ctx, "SELECT a, b FROM t", &[])
            .await
            .expect("Could not query");
        assert!(rows.is_buffered());
        assert_eq!(rows.columns(), ["a", "b"]);
        let fetches = || pool.calls().iter().filter(|c| *c == "fetch").count();
        assert_eq!(fetches(), 1);

        let first = rows.next().await.expect("next").expect("first row");
        assert_eq!(first, row(&[1, 2]));
        assert_eq!(fetches(), 1);
        let second = rows.next().await.expect("next").expect("second row");
        assert_eq!(second, row(&[3, 4]));
        assert_eq!(fetches(), 2);
        assert!(rows.next().await.expect("next").is_none());
        assert!(rows.next().await.expect("next").is_none());
        rows.close().expect("Could not close the rows");
    }

    #[tokio::test]
    async fn empty_query_result() {
        let pool = FakePool::new();
        pool.with(|s| s.columns = vec!["a".into()]);
        let connection = connect(&pool).await;
        let mut rows = connection
            .query_context(&Context::background(), "SELECT a FROM t", &[])
            .await
            .expect("Could not query");
        assert!(rows.is_buffered());
        assert_eq!(rows.columns(), ["a"]);
        assert!(rows.next().await.expect("next").is_none());
    }

    #[tokio::test]
    async fn first_row_error_fails_the_query() {
        let pool = FakePool::new();
        pool.with(|s| {
            s.row_failure = true;
            s.rows = vec![row(&[1])];
        });
        let connection = connect(&pool).await;
        silent_logs! {
            let error = connection
                .query_context(&Context::background(), "SELECT 1 / 0", &[])
                .await
                .err()
                .expect("The query must fail");
            assert!(error.is::<FakeError>());
        }
    }

    #[tokio::test]
    async fn isolation_levels() {
        let cases = [
            (IsolationLevel::Default, None),
            (IsolationLevel::ReadUncommitted, Some(TxIsoLevel::ReadUncommitted)),
            (IsolationLevel::ReadCommitted, Some(TxIsoLevel::ReadCommitted)),
            (IsolationLevel::RepeatableRead, Some(TxIsoLevel::RepeatableRead)),
            (IsolationLevel::Snapshot, Some(TxIsoLevel::RepeatableRead)),
            (IsolationLevel::Serializable, Some(TxIsoLevel::Serializable)),
        ];
        for (level, expected) in cases {
            let options = tx_options(&TxOptions::new(level, false))
                .unwrap_or_else(|e| panic!("{} must be supported: {}", level, e));
            assert_eq!(options.iso_level, expected, "{}", level);
            assert_eq!(options.access_mode, None);
        }
        for level in [IsolationLevel::WriteCommitted, IsolationLevel::Linearizable] {
            let error = tx_options(&TxOptions::new(level, false)).expect_err("must be rejected");
            assert_eq!(
                error.downcast_ref::<UnsupportedIsolation>(),
                Some(&UnsupportedIsolation(level))
            );
        }
        let options = tx_options(&TxOptions::new(IsolationLevel::Default, true))
            .expect("read only is supported");
        assert_eq!(
            options,
            BackendTxOptions {
                iso_level: None,
                access_mode: Some(TxAccessMode::ReadOnly),
            }
        );
    }

    #[tokio::test]
    async fn begin_and_end_transactions() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let ctx = Context::background();

        let transaction = connection
            .begin_tx(&ctx, TxOptions::new(IsolationLevel::Serializable, true))
            .await
            .expect("Could not begin");
        assert!(matches!(transaction, PostgresTransaction::Wrapped { .. }));
        transaction.commit().await.expect("Could not commit");

        let transaction = connection.begin().await.expect("Could not begin");
        transaction.rollback().await.expect("Could not roll back");

        let error = connection
            .begin_tx(&ctx, TxOptions::new(IsolationLevel::Linearizable, false))
            .await
            .err()
            .expect("Linearizable must be rejected");
        assert!(error.is::<UnsupportedIsolation>());

        assert_eq!(
            pool.calls(),
            [
                "acquire",
                "begin isolation level serializable read only",
                "commit",
                "begin",
                "rollback",
            ]
        );
    }

    #[tokio::test]
    async fn transaction_ends_under_the_begin_context() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let (ctx, cancel) = Context::background().with_cancel();
        let transaction = connection
            .begin_tx(&ctx, TxOptions::default())
            .await
            .expect("Could not begin");
        cancel.cancel();
        let error = transaction
            .commit()
            .await
            .expect_err("The begin context is canceled");
        assert_eq!(
            error.downcast_ref::<ContextError>(),
            Some(&ContextError::Canceled)
        );
        assert!(!pool.calls().contains(&"commit".to_string()));
    }

    #[tokio::test]
    async fn escape_hatch_hands_out_the_pooled_connection() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let ctx = Context::background();
        let mut raw = None;
        let transaction = connection
            .begin_tx_with(
                &ctx,
                TxOptions::new(IsolationLevel::Serializable, false),
                Some(&mut raw),
            )
            .await
            .expect("Could not take the pooled connection");
        assert!(matches!(transaction, PostgresTransaction::NoOp));
        let raw = raw.expect("The slot must be filled");
        assert!(std::ptr::eq(
            raw,
            connection.raw_conn().expect("The connection is open")
        ));
        transaction.commit().await.expect("No-op commit");

        let mut raw = None;
        let transaction = connection
            .begin_tx_with(&ctx, TxOptions::default(), Some(&mut raw))
            .await
            .expect("Could not take the pooled connection");
        assert!(raw.is_some());
        transaction.rollback().await.expect("No-op rollback");

        // Unsupported options are not even looked at
        let mut raw = None;
        connection
            .begin_tx_with(
                &ctx,
                TxOptions::new(IsolationLevel::Linearizable, false),
                Some(&mut raw),
            )
            .await
            .expect("The escape hatch ignores the options");

        assert_eq!(pool.calls(), ["acquire"]);
    }

    #[tokio::test]
    async fn ping_failure_releases_the_connection() {
        let pool = FakePool::new();
        let mut connection = connect(&pool).await;
        let ctx = Context::background();
        connection.ping(&ctx).await.expect("Could not ping");

        pool.with(|s| s.ping_failure = true);
        silent_logs! {
            let error = connection.ping(&ctx).await.expect_err("ping must fail");
            assert!(is_bad_connection(&error));
        }
        assert_eq!(pool.with(|s| s.released), 1);
        assert!(connection.raw_conn().is_none());
        assert!(connection.is_closed());

        let error = connection
            .exec_context(&ctx, "SELECT 1", &[])
            .await
            .expect_err("The connection was released");
        assert!(is_bad_connection(&error));
        let error = connection.ping(&ctx).await.expect_err("ping must fail");
        assert!(is_bad_connection(&error));
        assert_eq!(pool.calls(), ["acquire", "ping", "ping"]);

        connection.close().expect("close never fails");
        assert_eq!(pool.with(|s| s.released), 1);
    }

    #[tokio::test]
    async fn close_releases_the_connection() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        assert_eq!(pool.with(|s| s.released), 0);
        connection.close().expect("Could not close");
        assert_eq!(pool.with(|s| s.released), 1);
    }

    #[tokio::test]
    async fn session_reset() {
        let pool = FakePool::new();
        let ctx = Context::background();
        let connection = connect(&pool).await;
        connection
            .reset_session(&ctx)
            .await
            .expect("The default reset does nothing");
        assert_eq!(pool.calls(), ["acquire"]);
        connection.close().expect("Could not close");

        let connector = PostgresConnector::new(PostgresDriver::new(), pool.clone())
            .with_session_reset(Arc::new(ResetSql::new("RESET ALL")));
        let connection = connector.connect(&ctx).await.expect("Could not connect");
        connection
            .reset_session(&ctx)
            .await
            .expect("Could not reset");
        assert_eq!(pool.calls(), ["acquire", "acquire", "exec RESET ALL"]);
    }

    #[tokio::test]
    async fn statement_goes_through_the_connection() {
        let pool = FakePool::new();
        pool.with(|s| {
            s.rows_affected = 1;
            s.columns = vec!["v".into()];
            s.rows = vec![row(&[7])];
        });
        let connection = connect(&pool).await;
        let ctx = Context::background();
        let statement = connection
            .prepare_context(&ctx, "SELECT $1 + $2")
            .await
            .expect("Could not prepare");
        assert_eq!(statement.num_input(), Some(2));
        assert_eq!(statement.name(), "pgx_0");

        let error = statement.exec(&[]).await.expect_err("legacy exec");
        assert!(error.is::<NotImplemented>());
        assert_eq!(
            error.to_string(),
            "Statement::exec deprecated and not implemented"
        );
        let error = statement
            .query(&[Value::from(1)])
            .await
            .err()
            .expect("legacy query");
        assert!(error.is::<NotImplemented>());

        let args = NamedValue::positional([1, 2]);
        let result = statement
            .exec_context(&ctx, &args)
            .await
            .expect("Could not exec");
        assert_eq!(result.rows_affected, 1);
        let mut rows = statement
            .query_context(&ctx, &args)
            .await
            .expect("Could not query");
        assert_eq!(
            rows.next().await.expect("next").expect("one row"),
            row(&[7])
        );
        statement.close().await.expect("Could not close");

        assert_eq!(
            pool.calls(),
            [
                "acquire",
                "prepare pgx_0 SELECT $1 + $2",
                "exec pgx_0",
                "query pgx_0",
                "fetch",
                "deallocate pgx_0",
            ]
        );
    }

    #[tokio::test]
    async fn arguments_are_sorted_by_ordinal() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let args = [
            NamedValue::named("c", 3, "third"),
            NamedValue::new(1, "first"),
            NamedValue::named("b", 2, "second"),
        ];
        connection
            .exec_context(&Context::background(), "INSERT", &args)
            .await
            .expect("Could not exec");
        assert_eq!(
            pool.with(|s| s.last_args.clone()),
            [Value::from("first"), Value::from("second"), Value::from("third")]
        );
        let mut value = NamedValue::new(1, 5);
        connection
            .check_named_value(&mut value)
            .expect("Every argument is accepted");
        assert_eq!(value.value, Value::Int32(Some(5)));
    }

    #[tokio::test]
    async fn done_context_sends_nothing() {
        let pool = FakePool::new();
        let connection = connect(&pool).await;
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();
        let error = connection
            .exec_context(&ctx, "DELETE FROM t", &[])
            .await
            .expect_err("The context is canceled");
        assert_eq!(
            error.downcast_ref::<ContextError>(),
            Some(&ContextError::Canceled)
        );
        assert!(!is_bad_connection(&error));
        let error = connection
            .prepare_context(&ctx, "SELECT 1")
            .await
            .err()
            .expect("The context is canceled");
        assert!(error.is::<ContextError>());
        assert_eq!(pool.calls(), ["acquire"]);
    }

    #[tokio::test]
    async fn deadline_interrupts_a_slow_query() {
        let pool = FakePool::new();
        pool.with(|s| s.query_delay = Some(Duration::from_secs(10)));
        let connection = connect(&pool).await;
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        silent_logs! {
            let error = connection
                .query_context(&ctx, "SELECT pg_sleep(10)", &[])
                .await
                .err()
                .expect("The deadline must expire");
            assert_eq!(
                error.downcast_ref::<ContextError>(),
                Some(&ContextError::DeadlineExceeded)
            );
        }
    }

    #[tokio::test]
    async fn connector_passes_pool_errors_through() {
        let pool = FakePool::new();
        pool.with(|s| s.acquire_failure = true);
        let connector = PostgresConnector::new(PostgresDriver::new(), pool.clone());
        let error = connector
            .connect(&Context::background())
            .await
            .err()
            .expect("The pool is failing");
        assert!(error.is::<FakeError>());
        assert!(!is_bad_connection(&error));
    }

    #[tokio::test]
    async fn result_formats_reach_the_backend() {
        let pool = FakePool::new();
        let ctx = Context::background();
        let connection = connect(&pool).await;
        connection
            .query_context(&ctx, "SELECT 1", &[])
            .await
            .expect("Could not query");
        let formats = pool
            .with(|s| s.formats.clone())
            .expect("The formats must be passed");
        assert!(Arc::ptr_eq(&formats, &ResultFormats::intrinsic()));

        let custom = Arc::new(ResultFormats::new());
        let connector = PostgresConnector::new(PostgresDriver::new(), pool.clone())
            .with_result_formats(custom.clone());
        let connection = connector.connect(&ctx).await.expect("Could not connect");
        connection
            .query_context(&ctx, "SELECT 1", &[])
            .await
            .expect("Could not query");
        let formats = pool
            .with(|s| s.formats.clone())
            .expect("The formats must be passed");
        assert!(Arc::ptr_eq(&formats, &custom));
    }

    #[tokio::test]
    async fn driver_identity() {
        assert_eq!(PostgresDriver::NAME, "postgres");
        let connector = PostgresConnector::new(PostgresDriver::new(), FakePool::new());
        assert_eq!(connector.driver(), &PostgresDriver::new());
    }

    #[tokio::test(start_paused = true)]
    async fn statement_close_is_bounded() {
        let pool = FakePool::new();
        pool.with(|s| s.deallocate_delay = Some(Duration::from_secs(3600)));
        let connection = connect(&pool).await;
        let statement = connection
            .prepare_context(&Context::background(), "SELECT 1")
            .await
            .expect("Could not prepare");
        let started = Instant::now();
        let error = statement
            .close()
            .await
            .expect_err("The deallocation never completes");
        let elapsed = started.elapsed();
        assert_eq!(
            error.downcast_ref::<ContextError>(),
            Some(&ContextError::DeadlineExceeded)
        );
        assert!(elapsed >= DEALLOCATE_TIMEOUT, "{:?}", elapsed);
        assert!(elapsed < DEALLOCATE_TIMEOUT + Duration::from_millis(10), "{:?}", elapsed);
        assert!(pool.calls().contains(&"deallocate pgx_0".to_string()));

        // A quick deallocation is not affected
        pool.with(|s| s.deallocate_delay = Some(Duration::from_secs(4)));
        let statement = connection
            .prepare_context(&Context::background(), "SELECT 1")
            .await
            .expect("Could not prepare");
        statement.close().await.expect("Could not close within the bound");
    }
}
