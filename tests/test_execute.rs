#![cfg(feature = "local")]

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::Duration;

use sqlite3_compat::prelude::*;
use tokio::runtime::Runtime;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Open an in-memory database and seed the fixture table, draining the
/// queue before returning.
async fn seeded_db() -> Result<Database, Box<dyn std::error::Error>> {
    let db = Database::open("file::memory:", |res: Result<(), CompatError>| {
        res.expect("open failed");
    })?;
    db.serialize();
    db.run(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, a, b)",
        (),
        |_: &Statement, res: Result<(), CompatError>| res.expect("create failed"),
    )?;
    db.run(
        "INSERT INTO t (id, a, b) VALUES (1, 'one', 'ten')",
        (),
        NoCallback,
    )?;
    db.run(
        "INSERT INTO t (id, a, b) VALUES (2, 'two', 'twenty')",
        (),
        NoCallback,
    )?;
    db.run(
        "INSERT INTO t (id, a, b) VALUES (3, 'three', 'thirty')",
        (),
        NoCallback,
    )?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    db.wait(move |res: Result<(), CompatError>| {
        let _ = tx.send(res);
    });
    rx.await??;
    Ok(db)
}

#[test]
fn run_reports_changes_and_statement_receiver() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.run(
            "INSERT INTO t (a) VALUES ('four'), ('five')",
            (),
            move |stmt: &Statement, res: Result<(), CompatError>| {
                let _ = tx.send((res, stmt.changes()));
            },
        )?;
        let (res, changes) = rx.recv_timeout(RECV_TIMEOUT)?;
        res?;
        assert_eq!(changes, 2);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn run_reports_last_inserted_rowid() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.run(
            "INSERT INTO t (id) VALUES (10)",
            (),
            move |stmt: &Statement, res: Result<(), CompatError>| {
                let _ = tx.send((res, stmt.last_id()));
            },
        )?;
        let (res, last_id) = rx.recv_timeout(RECV_TIMEOUT)?;
        res?;
        assert_eq!(last_id, Some(10));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn run_delivers_statement_errors_through_the_callback()
-> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.run(
            "FOOBAR",
            (),
            move |_: &Statement, res: Result<(), CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let res = rx.recv_timeout(RECV_TIMEOUT)?;
        assert!(matches!(res, Err(CompatError::Statement(_))), "got {res:?}");

        // The scheduler keeps draining after a failed unit of work.
        let (tx, rx) = mpsc::channel();
        db.get(
            "SELECT 1 AS one",
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
        assert_eq!(row.get("one"), Some(&Value::Int(1)));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn get_returns_columns_in_declared_order() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.get(
            "SELECT 1 AS a, 2 AS b",
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
        assert_eq!(row.columns(), ["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::Int(1)));
        assert_eq!(row.get("b"), Some(&Value::Int(2)));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn get_binds_positional_array_params() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.get(
            "SELECT ? AS a, ? AS b",
            vec![Value::Text("one".into()), Value::Int(2)],
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
        assert_eq!(row.get("a"), Some(&Value::Text("one".into())));
        assert_eq!(row.get("b"), Some(&Value::Int(2)));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn get_binds_named_params_with_and_without_sigils() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let sql = "SELECT $one AS a, @two AS b, :three AS c";
        for params in [
            Params::from([
                ("$one", Value::Int(1)),
                ("@two", Value::Int(2)),
                (":three", Value::Int(3)),
            ]),
            Params::from([
                ("one", Value::Int(1)),
                ("two", Value::Int(2)),
                ("three", Value::Int(3)),
            ]),
        ] {
            let (tx, rx) = mpsc::channel();
            db.get(
                sql,
                params,
                move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                    let _ = tx.send(res);
                },
            )?;
            let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
            assert_eq!(row.get("a"), Some(&Value::Int(1)));
            assert_eq!(row.get("b"), Some(&Value::Int(2)));
            assert_eq!(row.get("c"), Some(&Value::Int(3)));
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn get_without_matches_yields_absence() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.get(
            "SELECT 1 WHERE 1 = 0",
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??;
        assert!(row.is_none());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn all_returns_rows_in_result_order() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.all(
            "SELECT id, a, b FROM t ORDER BY id",
            (),
            move |_: &Statement, res: Result<Vec<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let rows = rx.recv_timeout(RECV_TIMEOUT)??;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("a"), Some(&Value::Text("one".into())));
        assert_eq!(rows[2].get("b"), Some(&Value::Text("thirty".into())));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn map_shapes_follow_column_count() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        // Two columns: key to scalar.
        let (tx, rx) = mpsc::channel();
        db.map(
            "SELECT a, b FROM t ORDER BY id",
            (),
            move |_: &Statement, res: Result<HashMap<String, MappedValue>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let mapping = rx.recv_timeout(RECV_TIMEOUT)??;
        assert_eq!(
            mapping.get("one"),
            Some(&MappedValue::Scalar(Value::Text("ten".into())))
        );
        assert_eq!(
            mapping.get("three"),
            Some(&MappedValue::Scalar(Value::Text("thirty".into())))
        );

        // One column: key to nothing.
        let (tx, rx) = mpsc::channel();
        db.map(
            "SELECT a FROM t ORDER BY id",
            (),
            move |_: &Statement, res: Result<HashMap<String, MappedValue>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let mapping = rx.recv_timeout(RECV_TIMEOUT)??;
        assert_eq!(mapping.get("two"), Some(&MappedValue::Absent));

        // Three or more columns: key to the whole row.
        let (tx, rx) = mpsc::channel();
        db.map(
            "SELECT a, b, id FROM t ORDER BY id",
            (),
            move |_: &Statement, res: Result<HashMap<String, MappedValue>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let mapping = rx.recv_timeout(RECV_TIMEOUT)??;
        match mapping.get("two") {
            Some(MappedValue::Row(row)) => {
                assert_eq!(row.get("b"), Some(&Value::Text("twenty".into())));
                assert_eq!(row.get("id"), Some(&Value::Int(2)));
            }
            other => panic!("expected whole row, got {other:?}"),
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn each_delivers_rows_in_order_then_count() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (row_tx, row_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        db.each(
            "SELECT id, a FROM t ORDER BY id",
            (),
            move |_: &Statement, res: Result<Row, CompatError>| {
                let _ = row_tx.send(res);
            },
            move |res: Result<usize, CompatError>| {
                let _ = done_tx.send(res);
            },
        )?;

        let count = done_rx.recv_timeout(RECV_TIMEOUT)??;
        assert_eq!(count, 3);

        let ids: Vec<i64> = row_rx
            .try_iter()
            .map(|res| *res.expect("row expected").get("id").unwrap().as_int().unwrap())
            .collect();
        assert_eq!(ids, [1, 2, 3]);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn each_failure_hits_both_callbacks_once() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (row_tx, row_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        db.each(
            "SELECT nope FROM missing_table",
            (),
            move |_: &Statement, res: Result<Row, CompatError>| {
                let _ = row_tx.send(res);
            },
            move |res: Result<usize, CompatError>| {
                let _ = done_tx.send(res);
            },
        )?;

        let done = done_rx.recv_timeout(RECV_TIMEOUT)?;
        assert!(matches!(done, Err(CompatError::Statement(_))));
        let row = row_rx.recv_timeout(RECV_TIMEOUT)?;
        assert!(row.is_err());
        assert!(row_rx.try_recv().is_err(), "row handler must fire exactly once");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn prepared_statement_rebinds_between_runs() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let stmt = db.prepare(
            "SELECT a FROM t WHERE id = ?",
            Value::Int(1),
            |_: &Statement, res: Result<(), CompatError>| res.expect("bind failed"),
        )?;

        let (tx, rx) = mpsc::channel();
        stmt.get(
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
        assert_eq!(row.get("a"), Some(&Value::Text("one".into())));

        // Rebinding replaces the previous parameter set wholesale.
        stmt.bind(Value::Int(3), NoCallback)?;
        let (tx, rx) = mpsc::channel();
        stmt.get(
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
        assert_eq!(row.get("a"), Some(&Value::Text("three".into())));

        stmt.finalize(NoCallback);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn exec_runs_a_statement_sequence() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let db = seeded_db().await?;

        let (tx, rx) = mpsc::channel();
        db.exec(
            "CREATE TABLE u (x); INSERT INTO u VALUES (1); INSERT INTO u VALUES (2);",
            move |res: Result<(), CompatError>| {
                let _ = tx.send(res);
            },
        );
        rx.recv_timeout(RECV_TIMEOUT)??;

        let (tx, rx) = mpsc::channel();
        db.get(
            "SELECT count(*) AS n FROM u",
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        let row = rx.recv_timeout(RECV_TIMEOUT)??.expect("row expected");
        assert_eq!(row.get("n"), Some(&Value::Int(2)));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn callbacks_never_run_inside_the_registering_call() -> Result<(), Box<dyn std::error::Error>> {
    // A current-thread runtime makes the deferral observable: nothing can
    // run until this task yields.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let db = Database::open("file::memory:", NoCallback)?;

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        db.get(
            "SELECT 1 AS one",
            (),
            move |_: &Statement, res: Result<Option<Row>, CompatError>| {
                let _ = tx.send(res);
            },
        )?;
        assert!(rx.try_recv().is_err(), "completion must be deferred");
        let row = rx.await??;
        assert!(row.is_some());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
