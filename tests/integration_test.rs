//! End-to-end checks over a real SQLite database: migration, seeded
//! group/rule/member rows, DbStore, and the Authorizer on top.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

use portcullis::settings::{Auth, AuthMode, Schema};
use portcullis::storage::DbStore;
use portcullis::{
    Authorizer, MatchMode, MemorySession, Relation, RuleType, SessionStore, SubjectId,
};

/// Test database with automatic cleanup
struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    async fn new() -> Self {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

async fn seed_access_data(db: &DatabaseConnection) {
    let statements = [
        // group 1 active, group 2 inactive, group 3 active
        "INSERT INTO auth_group (id, title, status, rules) VALUES \
         (1, 'editors', 1, '1,2,3'), (2, 'retired', 0, '4'), (3, 'players', 1, '5')",
        // alice (7) is an editor and a retired member; bob (8) only plays
        "INSERT INTO auth_group_access (subject_id, group_id) VALUES \
         ('7', 1), ('7', 2), ('8', 3), ('7', 3)",
        "INSERT INTO auth_rule (id, name, type, status, condition) VALUES \
         (1, 'Order/Edit', 1, 1, NULL), \
         (2, 'order/export?status=1', 1, 1, NULL), \
         (3, 'order/delete', 1, 0, NULL), \
         (4, 'admin/panel', 1, 1, NULL), \
         (5, 'ranked/play', 1, 1, '{score}>5 and {score}<100')",
        // alice qualifies for ranked play, bob does not
        "INSERT INTO member (id, username, score) VALUES (7, 'alice', 50), (8, 'bob', 3)",
    ];
    for sql in statements {
        db.execute_unprepared(sql).await.expect("Failed to seed");
    }
}

fn authorizer(db: &DatabaseConnection) -> Authorizer<DbStore> {
    let auth = Auth {
        enabled: true,
        mode: AuthMode::Realtime,
    };
    Authorizer::new(auth, DbStore::new(db.clone(), Schema::default()))
}

#[tokio::test]
async fn test_check_through_database() {
    let test_db = TestDb::new().await;
    seed_access_data(test_db.connection()).await;
    let authorizer = authorizer(test_db.connection());
    let alice = SubjectId::from(7);

    // granted through the editors group, case-insensitively
    assert!(authorizer
        .check(
            "order/edit",
            &alice,
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::Or,
        )
        .await
        .unwrap());

    // rule 3 is inactive, rule 4 only reachable via the inactive group
    for name in ["order/delete", "admin/panel"] {
        assert!(!authorizer
            .check(
                name,
                &alice,
                RuleType::REALTIME,
                MatchMode::Plain,
                Relation::Or,
            )
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn test_condition_gating_through_database() {
    let test_db = TestDb::new().await;
    seed_access_data(test_db.connection()).await;
    let authorizer = authorizer(test_db.connection());

    // alice has score 50, bob score 3; both are in the players group
    assert!(authorizer
        .check(
            "ranked/play",
            &SubjectId::from(7),
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::Or,
        )
        .await
        .unwrap());
    assert!(!authorizer
        .check(
            "ranked/play",
            &SubjectId::from(8),
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::Or,
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_param_aware_check_through_database() {
    let test_db = TestDb::new().await;
    seed_access_data(test_db.connection()).await;
    let authorizer = authorizer(test_db.connection());
    let alice = SubjectId::from(7);

    assert!(authorizer
        .check(
            "order/export",
            &alice,
            RuleType::REALTIME,
            MatchMode::params([("status", "1"), ("page", "2")]),
            Relation::Or,
        )
        .await
        .unwrap());

    assert!(!authorizer
        .check(
            "order/export",
            &alice,
            RuleType::REALTIME,
            MatchMode::params([("status", "2")]),
            Relation::Or,
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_and_relation_through_database() {
    let test_db = TestDb::new().await;
    seed_access_data(test_db.connection()).await;
    let authorizer = authorizer(test_db.connection());
    let alice = SubjectId::from(7);

    assert!(authorizer
        .check(
            "order/edit,ranked/play",
            &alice,
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::And,
        )
        .await
        .unwrap());

    assert!(!authorizer
        .check(
            "order/edit,admin/panel",
            &alice,
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::And,
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_effective_rules_diagnostics() {
    let test_db = TestDb::new().await;
    seed_access_data(test_db.connection()).await;
    let authorizer = authorizer(test_db.connection());

    let rules = authorizer
        .effective_rules(&SubjectId::from(7), RuleType::REALTIME)
        .await
        .unwrap();
    let mut names: Vec<&str> = rules.iter().map(|r| r.raw.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["order/edit", "order/export?status=1", "ranked/play"]
    );

    let groups = authorizer.groups(&SubjectId::from(7)).await.unwrap();
    let mut titles: Vec<&str> = groups.iter().map(|g| g.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["editors", "players"]);
}

#[tokio::test]
async fn test_session_mode_survives_store_loss() {
    let test_db = TestDb::new().await;
    seed_access_data(test_db.connection()).await;

    let session: Arc<dyn SessionStore> = Arc::new(MemorySession::new());
    let session_auth = Auth {
        enabled: true,
        mode: AuthMode::Session,
    };
    let alice = SubjectId::from(7);

    let first = Authorizer::new(
        session_auth.clone(),
        DbStore::new(test_db.connection().clone(), Schema::default()),
    )
    .with_session_store(Arc::clone(&session));
    assert!(first
        .check(
            "order/edit",
            &alice,
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::Or,
        )
        .await
        .unwrap());

    // wipe the grants; a fresh session-mode authorizer still answers from
    // the persisted list
    test_db
        .connection()
        .execute_unprepared("DELETE FROM auth_group_access")
        .await
        .expect("Failed to clear grants");

    let second = Authorizer::new(
        session_auth,
        DbStore::new(test_db.connection().clone(), Schema::default()),
    )
    .with_session_store(session);
    assert!(second
        .check(
            "order/edit",
            &alice,
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::Or,
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn test_disabled_auth_bypasses_database() {
    let test_db = TestDb::new().await;
    // no seeding at all: the switch must short-circuit before any query
    let auth = Auth {
        enabled: false,
        mode: AuthMode::Realtime,
    };
    let authorizer = Authorizer::new(
        auth,
        DbStore::new(test_db.connection().clone(), Schema::default()),
    );

    assert!(authorizer
        .check(
            "anything",
            &SubjectId::from(1),
            RuleType::REALTIME,
            MatchMode::Plain,
            Relation::And,
        )
        .await
        .unwrap());
}
