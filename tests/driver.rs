//! End-to-end driver behavior against the scripted in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mdb::bitmap;
use mdb::driver::{MemoryTransport, TransportError};
use mdb::prelude::*;
use mdb::protocol::{AuthToken, ExecResponse, QueryChunk, RawRow, Schema, ServerStatus, Session};
use pretty_assertions::assert_eq;

fn driver(transport: &MemoryTransport) -> Driver {
    Driver::new(Arc::new(transport.dialer()))
}

fn int_row(v: i64) -> RawRow {
    RawRow {
        columns: vec![Bytes::copy_from_slice(&v.to_le_bytes())],
        null_bitmap: vec![0],
    }
}

fn id_schema() -> Schema {
    Schema::new(vec!["id".into()], vec![Datatype::Int64]).with_table("t")
}

fn chunk(schema: Option<Schema>, rows: Vec<RawRow>, done: bool) -> QueryChunk {
    QueryChunk { schema, rows, done }
}

async fn ids(rows: &mut Rows) -> Vec<i64> {
    let mut out = Vec::new();
    while let Some(row) = rows.next_row().await.unwrap() {
        out.push(row.get::<i64>(0).unwrap());
    }
    out
}

#[tokio::test]
async fn test_rows_stream_across_chunks() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![
        chunk(Some(id_schema()), vec![int_row(1), int_row(2)], false),
        chunk(None, vec![int_row(3)], true),
    ]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    assert_eq!(rows.columns(), &["t.id".to_string()]);
    assert_eq!(ids(&mut rows).await, vec![1, 2, 3]);
    assert!(rows.next_row().await.unwrap().is_none());
    assert_eq!(rows.progress().rows_read(), 3);
    assert!(!rows.has_next_result_set().await.unwrap());

    rows.close();
    assert!(!conn.has_active_query());
    // The stream finished on its own; nothing to cancel.
    assert_eq!(transport.calls().close_send, 0);
}

#[tokio::test]
async fn test_empty_final_chunk_ends_result_set() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![
        chunk(Some(id_schema()), vec![int_row(1), int_row(2)], false),
        chunk(None, vec![int_row(3)], false),
        chunk(None, vec![], true),
    ]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    assert_eq!(ids(&mut rows).await, vec![1, 2, 3]);
    assert!(rows.next_row().await.unwrap().is_none());
    assert!(!rows.has_next_result_set().await.unwrap());
    assert_eq!(rows.progress().result_set(), 0);
}

#[tokio::test]
async fn test_closing_connection_invalidates_open_rows() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![chunk(
        Some(id_schema()),
        vec![int_row(1), int_row(2)],
        false,
    )]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    conn.close().await.unwrap();

    let err = rows.next_row().await.unwrap_err();
    assert!(err.is_bad_conn());
    rows.close();
}

#[tokio::test]
async fn test_nulls_and_mixed_types() {
    let transport = MemoryTransport::new();
    let schema = Schema::new(
        vec!["name".into(), "age".into(), "ok".into()],
        vec![Datatype::String, Datatype::Int32, Datatype::Bool],
    );
    let raw = RawRow {
        columns: vec![
            Bytes::from_static(b"john"),
            Bytes::from_static(&[0, 0, 0, 0]),
            Bytes::from_static(&[1]),
        ],
        null_bitmap: bitmap::from_fn(3, |i| i == 1),
    };
    transport.push_query(vec![chunk(Some(schema), vec![raw], true)]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT name, age, ok FROM t", &[]).await.unwrap();
    let row = rows.next_row().await.unwrap().unwrap();
    assert_eq!(
        row.values(),
        &[Value::Text("john".into()), Value::Null, Value::Bool(true)]
    );
    assert_eq!(row.get_by_name::<Option<i32>>("age").unwrap(), None);

    let types = rows.column_types();
    assert_eq!(types[0].database_type_name(), "STRING");
    assert_eq!(types[1].database_type_name(), "INT32");
}

#[tokio::test]
async fn test_second_query_is_busy_without_reaching_transport() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![chunk(Some(id_schema()), vec![int_row(1)], false)]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    assert!(conn.has_active_query());

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    let err = conn.exec("DELETE FROM t", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert_eq!(transport.calls().query, 1);
    assert_eq!(transport.calls().exec, 0);

    rows.close();
    conn.exec("DELETE FROM t", &[]).await.unwrap();
    assert_eq!(transport.calls().exec, 1);
}

#[tokio::test]
async fn test_close_is_idempotent_and_cancels_unfinished_stream() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![
        chunk(Some(id_schema()), vec![int_row(1)], false),
        chunk(None, vec![int_row(2)], true),
    ]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    rows.next_row().await.unwrap();
    rows.close();
    rows.close();
    assert!(rows.is_closed());
    assert_eq!(transport.calls().close_send, 1);

    let err = rows.next_row().await.unwrap_err();
    assert!(err.is_bad_conn());
    // Closing a cursor does not poison the connection.
    assert!(conn.is_valid());
}

#[tokio::test]
async fn test_dropping_rows_releases_connection() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![chunk(Some(id_schema()), vec![int_row(1)], false)]);
    let conn = driver(&transport).open("/main").await.unwrap();

    {
        let _rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
        assert!(conn.has_active_query());
    }
    assert!(!conn.has_active_query());
    assert_eq!(transport.calls().close_send, 1);
}

#[tokio::test]
async fn test_multiple_result_sets() {
    let transport = MemoryTransport::new();
    let names = Schema::new(vec!["name".into()], vec![Datatype::String]);
    transport.push_query(vec![
        chunk(Some(id_schema()), vec![int_row(1)], false),
        chunk(None, vec![int_row(2)], false),
        chunk(
            Some(names),
            vec![RawRow {
                columns: vec![Bytes::from_static(b"ann")],
                null_bitmap: vec![0],
            }],
            true,
        ),
    ]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t; SELECT name FROM u", &[]).await.unwrap();
    assert_eq!(ids(&mut rows).await, vec![1, 2]);
    assert!(rows.has_next_result_set().await.unwrap());
    assert!(rows.advance_result_set().await.unwrap());
    assert_eq!(rows.columns(), &["name".to_string()]);
    assert_eq!(rows.progress().result_set(), 1);

    let row = rows.next_row().await.unwrap().unwrap();
    assert_eq!(row.get::<String>(0).unwrap(), "ann");
    assert!(rows.next_row().await.unwrap().is_none());
    assert!(!rows.advance_result_set().await.unwrap());
}

#[tokio::test]
async fn test_advance_skips_unread_rows() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![
        chunk(Some(id_schema()), vec![int_row(1), int_row(2)], false),
        chunk(None, vec![int_row(3)], false),
        chunk(Some(id_schema()), vec![int_row(10)], true),
    ]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t; SELECT id FROM t", &[]).await.unwrap();
    assert!(rows.advance_result_set().await.unwrap());
    assert_eq!(ids(&mut rows).await, vec![10]);
}

#[tokio::test]
async fn test_stream_error_is_terminal_and_marks_connection_bad() {
    let transport = MemoryTransport::new();
    transport.push_query_stream(vec![
        Ok(chunk(Some(id_schema()), vec![int_row(1)], false)),
        Err(TransportError::Unavailable("reset by peer".into())),
    ]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    assert_eq!(rows.next_row().await.unwrap().unwrap().get::<i64>(0).unwrap(), 1);

    let err = rows.next_row().await.unwrap_err();
    assert!(matches!(
        err,
        MdbError::Transport(TransportError::Unavailable(_))
    ));
    assert!(rows.next_row().await.unwrap_err().is_bad_conn());
    assert!(!conn.is_valid());
    assert!(!conn.has_active_query());

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_bad_conn());
    assert_eq!(transport.calls().query, 1);
}

#[tokio::test]
async fn test_decode_failure_marks_connection_bad() {
    let transport = MemoryTransport::new();
    let bad = RawRow {
        columns: vec![Bytes::from_static(&[1, 2, 3])],
        null_bitmap: vec![0],
    };
    transport.push_query(vec![chunk(Some(id_schema()), vec![bad], true)]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut rows = conn.query("SELECT id FROM t", &[]).await.unwrap();
    let err = rows.next_row().await.unwrap_err();
    assert!(matches!(err, MdbError::Decode(_)));
    assert!(!conn.is_valid());
}

#[tokio::test]
async fn test_read_timeout() {
    let transport = MemoryTransport::new();
    transport.set_recv_delay(Some(Duration::from_millis(200)));
    let conn = driver(&transport)
        .open("/main?readTimeout=10ms")
        .await
        .unwrap();

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, MdbError::Timeout("read")));
    assert!(!conn.is_valid());
}

#[tokio::test]
async fn test_interpolated_statement_reaches_transport() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport)
        .open("/main?interpolateParams=true&fetchSize=500&maxRowCount=20")
        .await
        .unwrap();

    let mut rows = conn
        .query(
            "SELECT * FROM user WHERE name = ? AND age > ?",
            &["john".into(), 21.into()],
        )
        .await
        .unwrap();
    rows.close();

    assert_eq!(
        transport.statements(),
        vec![r#"SELECT * FROM user WHERE name = "john" AND age > 21"#]
    );
    let reqs = transport.query_requests();
    assert_eq!(reqs[0].fetch_size, 500);
    assert_eq!(reqs[0].max_row_count, 20);
    assert_eq!(reqs[0].auth, AuthToken(Bytes::from_static(b"memory-session")));
}

#[tokio::test]
async fn test_args_without_interpolation_are_skipped() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport).open("/main").await.unwrap();

    let err = conn.query("SELECT ?", &[1.into()]).await.unwrap_err();
    assert!(err.is_skip());
    assert!(conn.is_valid());
    assert!(!conn.has_active_query());
    assert_eq!(transport.calls().query, 0);
}

#[tokio::test]
async fn test_no_backslash_escapes_from_session() {
    let transport = MemoryTransport::new();
    transport.set_session(Session {
        auth: AuthToken(Bytes::from_static(b"s")),
        status: ServerStatus {
            no_backslash_escapes: true,
            read_only: false,
        },
    });
    let conn = driver(&transport)
        .open("/main?interpolateParams=true")
        .await
        .unwrap();

    conn.exec("INSERT INTO t VALUES (?)", &[r#"say "hi""#.into()])
        .await
        .unwrap();
    assert_eq!(
        transport.statements(),
        vec![r#"INSERT INTO t VALUES ("say ""hi""")"#]
    );
}

#[tokio::test]
async fn test_prepared_statement_checks_arg_count() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport)
        .open("/main?interpolateParams=true")
        .await
        .unwrap();

    let stmt = conn.prepare("UPDATE t SET a = ? WHERE id = ?");
    assert_eq!(stmt.num_input(), 2);
    let err = stmt.exec(&[1.into()]).await.unwrap_err();
    assert!(err.is_skip());

    stmt.exec(&[1.into(), 2.into()]).await.unwrap();
    assert_eq!(transport.statements(), vec!["UPDATE t SET a = 1 WHERE id = 2"]);
}

#[tokio::test]
async fn test_exec_returns_server_counts() {
    let transport = MemoryTransport::new();
    transport.push_exec(ExecResponse {
        affected_rows: 3,
        last_insert_id: 42,
    });
    let conn = driver(&transport).open("/main").await.unwrap();

    let resp = conn.exec("INSERT INTO t VALUES (1), (2), (3)", &[]).await.unwrap();
    assert_eq!(resp.affected_rows, 3);
    assert_eq!(resp.last_insert_id, 42);
}

#[tokio::test]
async fn test_exec_transport_failure_marks_bad() {
    let transport = MemoryTransport::new();
    transport.push_exec_error(TransportError::Closed);
    let conn = driver(&transport).open("/main").await.unwrap();

    assert!(conn.exec("DELETE FROM t", &[]).await.unwrap_err().is_bad_conn());
    assert!(!conn.is_valid());
}

#[tokio::test]
async fn test_commit_twice_is_invalid() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut tx = conn.begin(TxOptions::default()).await.unwrap();
    assert_eq!(tx.id(), b"xact-1");
    tx.exec("DELETE FROM t", &[]).await.unwrap();
    tx.commit().await.unwrap();
    assert!(tx.is_finished());

    assert!(matches!(tx.commit().await, Err(MdbError::InvalidConn)));
    assert!(matches!(tx.rollback().await, Err(MdbError::InvalidConn)));
    assert!(matches!(
        tx.exec("DELETE FROM t", &[]).await,
        Err(MdbError::InvalidConn)
    ));
    assert_eq!(transport.statements(), vec!["DELETE FROM t", "COMMIT"]);
}

#[tokio::test]
async fn test_commit_with_open_rows_can_be_retried() {
    let transport = MemoryTransport::new();
    transport.push_query(vec![chunk(Some(id_schema()), vec![int_row(1)], false)]);
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut tx = conn.begin(TxOptions::default()).await.unwrap();
    let mut rows = tx.query("SELECT id FROM t", &[]).await.unwrap();

    assert!(matches!(tx.commit().await, Err(MdbError::Busy)));
    assert!(!tx.is_finished());

    rows.close();
    tx.commit().await.unwrap();
    assert!(tx.is_finished());
    assert_eq!(transport.statements(), vec!["SELECT id FROM t", "COMMIT"]);
}

#[tokio::test]
async fn test_binary_argument_reaches_transport() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport)
        .open("/main?interpolateParams=true")
        .await
        .unwrap();

    conn.exec("INSERT INTO t VALUES (?)", &[Arg::Bytes(vec![0xff, 0, b'"'])])
        .await
        .unwrap();
    assert_eq!(
        transport.raw_statements(),
        vec![Bytes::from_static(b"INSERT INTO t VALUES (\"\xff\\0\\\"\")")]
    );
}

#[tokio::test]
async fn test_rollback() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport).open("/main").await.unwrap();

    let mut tx = conn
        .begin(TxOptions {
            read_only: true,
            ..TxOptions::default()
        })
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(transport.begin_requests()[0].read_only);
    assert_eq!(transport.statements(), vec!["ROLLBACK"]);
}

#[tokio::test]
async fn test_liveness_check_after_reset() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport).open("/main").await.unwrap();

    conn.exec("SELECT 1", &[]).await.unwrap();
    assert_eq!(transport.calls().ping, 0);

    conn.reset_session();
    conn.exec("SELECT 1", &[]).await.unwrap();
    assert_eq!(transport.calls().ping, 1);

    // Checked once per reset.
    conn.exec("SELECT 1", &[]).await.unwrap();
    assert_eq!(transport.calls().ping, 1);

    transport.set_fail_ping(true);
    conn.reset_session();
    let err = conn.exec("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_bad_conn());
    assert!(!conn.is_valid());
    assert_eq!(transport.calls().exec, 3);
}

#[tokio::test]
async fn test_liveness_check_disabled() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport)
        .open("/main?checkConnLiveness=false")
        .await
        .unwrap();

    conn.reset_session();
    conn.exec("SELECT 1", &[]).await.unwrap();
    assert_eq!(transport.calls().ping, 0);
}

#[tokio::test]
async fn test_connect_forwards_session_fields() {
    let transport = MemoryTransport::new();
    let _conn = driver(&transport)
        .open("app:pw@tcp(db.internal)/ledger?clientFoundRows=true&app_name=billing")
        .await
        .unwrap();

    let init = &transport.init_requests()[0];
    assert_eq!(init.user, "app");
    assert_eq!(init.password, "pw");
    assert_eq!(init.db_name, "ledger");
    assert!(init.client_found_rows);
    assert_eq!(
        init.params,
        vec![("app_name".to_string(), "billing".to_string())]
    );
}

#[tokio::test]
async fn test_reject_read_only() {
    let transport = MemoryTransport::new();
    transport.set_session(Session {
        auth: AuthToken(Bytes::from_static(b"s")),
        status: ServerStatus {
            no_backslash_escapes: false,
            read_only: true,
        },
    });

    let err = driver(&transport)
        .open("/main?rejectReadOnly=true")
        .await
        .unwrap_err();
    assert!(err.is_bad_conn());
    assert_eq!(transport.calls().close, 1);

    let conn = driver(&transport).open("/main").await.unwrap();
    assert!(conn.status().read_only);
}

#[tokio::test]
async fn test_dial_failure() {
    let transport = MemoryTransport::new();
    transport.set_fail_dial(Some(TransportError::Unavailable("refused".into())));

    let err = driver(&transport).open("/main").await.unwrap_err();
    assert!(err.is_bad_conn());
    assert_eq!(transport.calls().initialize, 0);
}

#[tokio::test]
async fn test_connection_close_is_idempotent() {
    let transport = MemoryTransport::new();
    let conn = driver(&transport).open("/main").await.unwrap();

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    assert_eq!(transport.calls().close, 1);
    assert!(conn.is_closed());

    assert!(conn.query("SELECT 1", &[]).await.unwrap_err().is_bad_conn());
    assert_eq!(transport.calls().query, 0);
}

#[tokio::test]
async fn test_connector_keeps_private_config() {
    let transport = MemoryTransport::new();
    let driver = driver(&transport);

    let mut config = parse_dsn("/main", driver.registry()).unwrap();
    let connector = driver.connector(&config).unwrap();
    config.db_name = "other".to_string();

    let _conn = connector.connect().await.unwrap();
    assert_eq!(connector.config().db_name, "main");
    assert_eq!(transport.init_requests()[0].db_name, "main");
}

#[tokio::test]
async fn test_parse_errors_surface_before_dialing() {
    let transport = MemoryTransport::new();
    let err = driver(&transport).open("user@tcp(host").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(transport.calls().dial, 0);
}
