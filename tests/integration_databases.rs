//! Round trips against real servers.
//!
//! Each test needs its backend's host variable (`DBDESK_TEST_PG_HOST`,
//! `DBDESK_TEST_MYSQL_HOST`) and returns early when it is unset.

use dbdesk_lib::engine::limits::Limits;
use dbdesk_lib::engine::SqlxDialer;
use dbdesk_lib::{ColumnDescriptor, ConnectionProfile, EngineError, EngineResult, Workbench};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_DB: &str = "testdb";

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16_or_default(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn postgres_profile() -> Option<ConnectionProfile> {
    let host = std::env::var("DBDESK_TEST_PG_HOST").ok()?;
    Some(ConnectionProfile {
        id: "pg-test".to_string(),
        name: "postgres test".to_string(),
        kind: "postgres".to_string(),
        host,
        port: env_u16_or_default("DBDESK_TEST_PG_PORT", 5432),
        username: env_or_default("DBDESK_TEST_PG_USER", "dbdesk"),
        password: env_or_default("DBDESK_TEST_PG_PASSWORD", "dbdesk_test"),
        database: env_or_default("DBDESK_TEST_PG_DB", DEFAULT_DB),
        tls_mode: std::env::var("DBDESK_TEST_PG_SSLMODE").ok(),
    })
}

fn mysql_profile() -> Option<ConnectionProfile> {
    let host = std::env::var("DBDESK_TEST_MYSQL_HOST").ok()?;
    Some(ConnectionProfile {
        id: "mysql-test".to_string(),
        name: "mysql test".to_string(),
        kind: "mysql".to_string(),
        host,
        port: env_u16_or_default("DBDESK_TEST_MYSQL_PORT", 3306),
        username: env_or_default("DBDESK_TEST_MYSQL_USER", "dbdesk"),
        password: env_or_default("DBDESK_TEST_MYSQL_PASSWORD", "dbdesk_test"),
        database: env_or_default("DBDESK_TEST_MYSQL_DB", DEFAULT_DB),
        tls_mode: std::env::var("DBDESK_TEST_MYSQL_TLS").ok(),
    })
}

fn workbench() -> Workbench {
    let limits = Limits {
        dial: Some(Duration::from_secs(10)),
        probe: Some(Duration::from_secs(10)),
        fetch: Some(Duration::from_secs(30)),
        cancel: None,
    };
    Workbench::new(SqlxDialer, limits)
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[tokio::test]
async fn postgres_select_one() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let workbench = workbench();

    workbench.test_connection(&profile).await?;

    let sets = workbench.run(&profile, "SELECT 1 AS n").await?;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].columns, vec![ColumnDescriptor::new("n", "INT4")]);
    assert_eq!(sets[0].rows, vec![vec!["1".to_string()]]);
    Ok(())
}

#[tokio::test]
async fn postgres_multi_statement_batch() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let workbench = workbench();
    let table = unique_name("dbdesk_pg");

    let sets = workbench
        .run(
            &profile,
            &format!(
                "CREATE TABLE {t} (id INT PRIMARY KEY, name TEXT, price NUMERIC(10,2), seen TIMESTAMPTZ);\
                 INSERT INTO {t} VALUES (1, 'alpha', 12.50, '2024-05-01 10:00:00+00'), (2, NULL, NULL, NULL);\
                 SELECT id, name, price, seen FROM {t} ORDER BY id;\
                 SELECT count(*) AS c FROM {t};\
                 DROP TABLE {t};",
                t = table
            ),
        )
        .await?;

    // DDL and DML produce no result sets
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].column_count(), 4);
    assert_eq!(
        sets[0].rows,
        vec![
            vec!["1", "alpha", "12.50", "2024-05-01T10:00:00Z"],
            vec!["2", "NULL", "NULL", "NULL"],
        ]
    );
    assert_eq!(sets[1].rows, vec![vec!["2"]]);
    Ok(())
}

#[tokio::test]
async fn postgres_ddl_only_batch_has_no_sets() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let table = unique_name("dbdesk_ddl");
    let sets = workbench()
        .run(
            &profile,
            &format!("CREATE TABLE {t} (id INT); DROP TABLE {t};", t = table),
        )
        .await?;
    assert!(sets.is_empty());
    Ok(())
}

#[tokio::test]
async fn postgres_empty_select_keeps_columns() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let sets = workbench()
        .run(&profile, "SELECT 1 AS a, 'x'::text AS b WHERE false")
        .await?;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].column_count(), 2);
    assert_eq!(sets[0].row_count(), 0);
    Ok(())
}

#[tokio::test]
async fn postgres_zero_row_select_inside_batch_keeps_its_place() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let sets = workbench()
        .run(&profile, "SELECT 1 AS a; SELECT 2 AS b WHERE false; SELECT 3 AS c")
        .await?;
    assert_eq!(sets.len(), 3);
    let names: Vec<&str> = sets.iter().map(|s| s.columns[0].name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(sets[1].column_count(), 1);
    assert_eq!(sets[1].row_count(), 0);
    assert_eq!(sets[2].rows, vec![vec!["3"]]);
    Ok(())
}

#[tokio::test]
async fn postgres_enum_columns_report_their_type_name() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let workbench = workbench();
    let ty = unique_name("dbdesk_mood");

    workbench
        .run(&profile, &format!("CREATE TYPE {} AS ENUM ('sad', 'happy')", ty))
        .await?;
    let sets = workbench
        .run(&profile, &format!("SELECT 'happy'::{} AS e, 1 AS n", ty))
        .await;
    workbench.run(&profile, &format!("DROP TYPE {}", ty)).await?;

    let sets = sets?;
    assert_eq!(sets[0].columns[0], ColumnDescriptor::new("e", ty.as_str()));
    assert_eq!(sets[0].columns[1].type_name, "INT4");
    assert_eq!(sets[0].rows, vec![vec!["happy", "1"]]);
    Ok(())
}

#[tokio::test]
async fn postgres_cancelled_statement_stops_on_server() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let workbench = workbench();
    let marker = unique_name("dbdesk_sleep");
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = workbench
        .run_cancellable(&profile, &format!("SELECT pg_sleep(5) AS {}", marker), token)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Cancelled);

    let count_sql = format!(
        "SELECT count(*) AS n FROM pg_stat_activity \
         WHERE state = 'active' AND query LIKE '%{}%' AND pid <> pg_backend_pid()",
        marker
    );
    assert!(
        still_running(&workbench, &profile, &count_sql).await? == "0",
        "statement kept running after cancel"
    );
    Ok(())
}

/// Polls an activity count until it reaches zero or a second has passed.
async fn still_running(
    workbench: &Workbench,
    profile: &ConnectionProfile,
    count_sql: &str,
) -> EngineResult<String> {
    let mut count = String::new();
    for _ in 0..10 {
        let sets = workbench.run(profile, count_sql).await?;
        count = sets[0].rows[0][0].clone();
        if count == "0" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(count)
}

#[tokio::test]
async fn postgres_syntax_error_is_execution_error() -> EngineResult<()> {
    let Some(profile) = postgres_profile() else {
        return Ok(());
    };
    let err = workbench().run(&profile, "SELEC 1").await.unwrap_err();
    match err {
        EngineError::ExecutionError { message } => assert!(message.contains("syntax")),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn postgres_wrong_password_fails_to_connect() -> EngineResult<()> {
    let Some(mut profile) = postgres_profile() else {
        return Ok(());
    };
    profile.password = "definitely-not-the-password".to_string();
    let err = workbench().test_connection(&profile).await.unwrap_err();
    assert!(err.is_connection_failure(), "unexpected error: {err:?}");
    Ok(())
}

#[tokio::test]
async fn mysql_select_and_types() -> EngineResult<()> {
    let Some(profile) = mysql_profile() else {
        return Ok(());
    };
    let workbench = workbench();
    workbench.test_connection(&profile).await?;

    let sets = workbench
        .run(
            &profile,
            "SELECT 1 AS n, CAST(18446744073709551615 AS UNSIGNED) AS big, \
             CAST(1.50 AS DECIMAL(5,2)) AS d, NULL AS nothing, '' AS empty",
        )
        .await?;
    assert_eq!(sets.len(), 1);
    assert_eq!(
        sets[0].rows,
        vec![vec!["1", "18446744073709551615", "1.50", "NULL", ""]]
    );
    Ok(())
}

#[tokio::test]
async fn mysql_multi_statement_batch() -> EngineResult<()> {
    let Some(profile) = mysql_profile() else {
        return Ok(());
    };
    let table = unique_name("dbdesk_my");
    let sets = workbench()
        .run(
            &profile,
            &format!(
                "CREATE TABLE {t} (id INT PRIMARY KEY, name VARCHAR(20));\
                 INSERT INTO {t} VALUES (1, 'a'), (2, 'b');\
                 SELECT id, name FROM {t} ORDER BY id;\
                 DROP TABLE {t};",
                t = table
            ),
        )
        .await?;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].rows, vec![vec!["1", "a"], vec!["2", "b"]]);
    Ok(())
}

#[tokio::test]
async fn mysql_zero_row_select_inside_batch_keeps_its_place() -> EngineResult<()> {
    let Some(profile) = mysql_profile() else {
        return Ok(());
    };
    let sets = workbench()
        .run(&profile, "SELECT 1 AS a; SELECT 2 AS b FROM DUAL WHERE 1 = 0; SELECT 3 AS c")
        .await?;
    assert_eq!(sets.len(), 3);
    assert_eq!(sets[1].columns[0].name, "b");
    assert_eq!(sets[1].row_count(), 0);
    assert_eq!(sets[2].rows, vec![vec!["3"]]);
    Ok(())
}

#[tokio::test]
async fn mysql_timed_out_statement_is_killed_on_server() -> EngineResult<()> {
    let Some(profile) = mysql_profile() else {
        return Ok(());
    };
    let marker = unique_name("dbdesk_sleep");
    let limits = Limits {
        dial: Some(Duration::from_secs(10)),
        probe: Some(Duration::from_secs(10)),
        fetch: Some(Duration::from_millis(300)),
        cancel: None,
    };
    let err = Workbench::new(SqlxDialer, limits)
        .run(&profile, &format!("SELECT SLEEP(5) AS {}", marker))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }), "unexpected error: {err:?}");

    let count_sql = format!(
        "SELECT COUNT(*) AS n FROM information_schema.PROCESSLIST \
         WHERE INFO LIKE '%{}%' AND ID <> CONNECTION_ID()",
        marker
    );
    assert_eq!(still_running(&workbench(), &profile, &count_sql).await?, "0");
    Ok(())
}

#[tokio::test]
async fn unreachable_server_fails_fast_with_dial_timeout() -> EngineResult<()> {
    if postgres_profile().is_none() {
        return Ok(());
    }
    let profile = ConnectionProfile {
        id: "nowhere".to_string(),
        name: "unreachable".to_string(),
        kind: "postgres".to_string(),
        // TEST-NET-1, never routed
        host: "192.0.2.1".to_string(),
        port: 5432,
        username: "nobody".to_string(),
        password: String::new(),
        database: "none".to_string(),
        tls_mode: Some("disable".to_string()),
    };
    let limits = Limits {
        dial: Some(Duration::from_millis(300)),
        ..Limits::default()
    };
    let err = Workbench::new(SqlxDialer, limits)
        .test_connection(&profile)
        .await
        .unwrap_err();
    assert!(err.is_connection_failure(), "unexpected error: {err:?}");
    Ok(())
}
