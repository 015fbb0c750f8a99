mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{MockExecutor, row};
use stratum::StratumError;
use stratum::ast::{ColumnDef, ColumnType, CreateTable, Value};
use stratum::migrate::{Migration, Runner};

fn create_cities() -> Migration {
    Migration::new("1700000000000_create_cities")
        .up(|ops| async move {
            ops.create_table(
                CreateTable::new("cities")
                    .column("id", ColumnDef::new(ColumnType::Serial).primary_key())
                    .column("name", ColumnDef::new(ColumnType::Varchar(None)).not_null()),
            )
            .await
        })
        .down(|ops| async move { ops.drop_table("cities").await })
}

fn add_population() -> Migration {
    Migration::new("1700000000001_add_population")
        .up(|ops| async move {
            ops.alter_table(
                stratum::ast::AlterTable::new("cities")
                    .add_column("population", ColumnDef::new(ColumnType::BigInt)),
            )
            .await
        })
        .down(|ops| async move {
            ops.alter_table(stratum::ast::AlterTable::new("cities").drop_column("population"))
                .await
        })
}

fn runner(mock: &Arc<MockExecutor>, migrations: Vec<Migration>) -> Runner {
    Runner::new(mock.clone(), migrations).unwrap()
}

#[tokio::test]
async fn test_up_runs_each_migration_in_its_own_transaction() {
    let mock = MockExecutor::new();
    let r = runner(&mock, vec![create_cities(), add_population()]);

    let report = r.up().await.unwrap();
    assert_eq!(report.applied(), 2);
    assert_eq!(report.pending(), 0);

    let sqls = mock.sqls();
    assert!(sqls[0].starts_with(r#"CREATE TABLE IF NOT EXISTS "migrations""#));
    assert!(sqls[1].starts_with(r#"SELECT "name" FROM "migrations""#));
    assert_eq!(
        &sqls[2..],
        &[
            "<begin>".to_string(),
            r#"CREATE TABLE "cities" ("id" SERIAL PRIMARY KEY, "name" varchar NOT NULL)"#
                .to_string(),
            r#"INSERT INTO "migrations" ("name", "run_on") VALUES (?, now())"#.to_string(),
            "<commit>".to_string(),
            "<begin>".to_string(),
            r#"ALTER TABLE "cities" ADD COLUMN "population" bigint"#.to_string(),
            r#"INSERT INTO "migrations" ("name", "run_on") VALUES (?, now())"#.to_string(),
            "<commit>".to_string(),
        ]
    );

    // every in-transaction statement rode the same handle
    let calls = mock.calls();
    let first_tx = calls[2].tx;
    assert!(first_tx.is_some());
    assert_eq!(calls[3].tx, first_tx);
    assert_eq!(calls[4].tx, first_tx);
    assert_eq!(calls[5].tx, first_tx);
    assert_ne!(calls[6].tx, first_tx);
}

#[tokio::test]
async fn test_tracking_row_carries_the_migration_name() {
    let mock = MockExecutor::new();
    let r = runner(&mock, vec![create_cities()]);

    r.up().await.unwrap();

    let insert = mock
        .calls()
        .into_iter()
        .find(|c| c.sql.starts_with("INSERT INTO"))
        .unwrap();
    assert_eq!(
        insert.values,
        vec![Value::String("1700000000000_create_cities".into())]
    );
}

#[tokio::test]
async fn test_second_up_run_has_nothing_pending() {
    let mock = MockExecutor::new();
    let r = runner(&mock, vec![create_cities(), add_population()]);

    let first = r.up().await.unwrap();
    assert_eq!(first.applied(), 2);

    // the tracking table now lists both names
    mock.push_rows(vec![
        row(json!({"name": "1700000000000_create_cities"})),
        row(json!({"name": "1700000000001_add_population"})),
    ]);
    let begins_before = mock.sqls().iter().filter(|s| *s == "<begin>").count();

    let second = r.up().await.unwrap();
    assert_eq!(second.applied(), 0);
    assert_eq!(second.pending(), 0);

    let begins_after = mock.sqls().iter().filter(|s| *s == "<begin>").count();
    assert_eq!(begins_before, begins_after);
}

#[tokio::test]
async fn test_down_reverts_the_most_recent_migration() {
    let mock = MockExecutor::new();
    let r = runner(&mock, vec![create_cities(), add_population()]);

    mock.push_rows(vec![
        row(json!({"name": "1700000000000_create_cities"})),
        row(json!({"name": "1700000000001_add_population"})),
    ]);

    let report = r.down().await.unwrap();
    assert_eq!(report.applied(), 1);

    let sqls = mock.statements();
    assert!(sqls.iter().any(|s| s.contains("DROP COLUMN \"population\"")));
    assert!(!sqls.iter().any(|s| s.contains("DROP TABLE")));

    let delete = mock
        .calls()
        .into_iter()
        .find(|c| c.sql.starts_with("DELETE FROM"))
        .unwrap();
    assert_eq!(
        delete.sql,
        r#"DELETE FROM "migrations" WHERE "name" = ?"#
    );
    assert_eq!(
        delete.values,
        vec![Value::String("1700000000001_add_population".into())]
    );
}

#[tokio::test]
async fn test_down_many_walks_newest_first() {
    let mock = MockExecutor::new();
    let r = runner(&mock, vec![create_cities(), add_population()]);

    mock.push_rows(vec![
        row(json!({"name": "1700000000000_create_cities"})),
        row(json!({"name": "1700000000001_add_population"})),
    ]);

    r.down_many(2).await.unwrap();

    let sqls = mock.statements();
    let drop_col = sqls
        .iter()
        .position(|s| s.contains("DROP COLUMN"))
        .unwrap();
    let drop_table = sqls.iter().position(|s| s.contains("DROP TABLE")).unwrap();
    assert!(drop_col < drop_table);
}

#[tokio::test]
async fn test_down_fails_loudly_when_an_applied_definition_is_gone() {
    let mock = MockExecutor::new();
    let r = runner(&mock, vec![create_cities()]);

    mock.push_rows(vec![
        row(json!({"name": "1700000000000_create_cities"})),
        row(json!({"name": "1700000000001_add_population"})),
    ]);

    let err = r.down().await.unwrap_err();
    assert!(matches!(err, StratumError::MigrationLoad(_)));
    // nothing ran
    assert!(!mock.sqls().contains(&"<begin>".to_string()));
}

#[tokio::test]
async fn test_failing_action_rolls_back_and_halts_the_queue() {
    let mock = MockExecutor::new();
    let failing = Migration::new("1700000000000_breaks")
        .up(|_ops| async move { Err(StratumError::Query("duplicate key".into())) })
        .down(|_ops| async move { Ok(()) });
    let r = runner(&mock, vec![failing, add_population()]);

    let err = r.up().await.unwrap_err();
    match err {
        StratumError::MigrationApply { name, source } => {
            assert_eq!(name, "1700000000000_breaks");
            assert!(matches!(*source, StratumError::Query(_)));
        }
        other => panic!("expected MigrationApply, got {}", other),
    }

    let sqls = mock.sqls();
    assert_eq!(sqls.iter().filter(|s| *s == "<begin>").count(), 1);
    assert_eq!(sqls.iter().filter(|s| *s == "<rollback>").count(), 1);
    assert!(!sqls.contains(&"<commit>".to_string()));
    // no tracking row was written, and the second migration never started
    assert!(!sqls.iter().any(|s| s.starts_with("INSERT INTO")));
    assert!(!sqls.iter().any(|s| s.contains("ADD COLUMN")));
}

#[tokio::test]
async fn test_runner_rejects_malformed_ordering_keys() {
    let mock = MockExecutor::new();

    for name in ["create_cities", "20240208190500255_x", "abc_create"] {
        let err = Runner::new(
            mock.clone(),
            vec![Migration::new(name).up(|_| async { Ok(()) })],
        )
        .unwrap_err();
        assert!(
            matches!(err, StratumError::MigrationLoad(_)),
            "expected '{}' to be rejected",
            name
        );
    }
}

#[tokio::test]
async fn test_runner_orders_by_key_then_name() {
    let mock = MockExecutor::new();
    let r = runner(
        &mock,
        vec![
            Migration::new("1700000000001_b").up(|_| async { Ok(()) }),
            Migration::new("1700000000000_z").up(|_| async { Ok(()) }),
            Migration::new("1700000000001_a").up(|_| async { Ok(()) }),
        ],
    );

    let names: Vec<&str> = r.migrations().iter().map(|m| m.name()).collect();
    assert_eq!(
        names,
        vec!["1700000000000_z", "1700000000001_a", "1700000000001_b"]
    );
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() {
    let mock = MockExecutor::new();
    let err = Runner::new(
        mock.clone(),
        vec![
            Migration::new("1700000000000_same").up(|_| async { Ok(()) }),
            Migration::new("1700000000000_same").up(|_| async { Ok(()) }),
        ],
    )
    .unwrap_err();

    assert!(matches!(err, StratumError::MigrationLoad(_)));
}

#[tokio::test]
async fn test_missing_direction_action_fails_before_beginning() {
    let mock = MockExecutor::new();
    let up_only =
        Migration::new("1700000000000_one_way").up(|_| async { Ok(()) });
    let r = runner(&mock, vec![up_only]);

    mock.push_rows(vec![row(json!({"name": "1700000000000_one_way"}))]);

    let err = r.down().await.unwrap_err();
    assert!(matches!(err, StratumError::MigrationLoad(_)));
    assert!(!mock.sqls().contains(&"<begin>".to_string()));
}

#[tokio::test]
async fn test_seed_data_through_schema_ops() {
    let mock = MockExecutor::new();
    let seed = Migration::new("1700000000000_seed_countries")
        .up(|ops| async move {
            ops.insert(
                stratum::ast::Insert::new("countries")
                    .value("name", "Chile")
                    .value("order", 1),
            )
            .await
        })
        .down(|_| async { Ok(()) });
    let r = runner(&mock, vec![seed]);

    r.up().await.unwrap();

    assert!(mock.sqls().contains(
        &r#"INSERT INTO "countries" ("name", "order") VALUES ('Chile', 1)"#.to_string()
    ));
}
