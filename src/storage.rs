use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Asterisk, Expr, JoinType, Query};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, FromQueryResult, JsonValue, Value};

use crate::errors::AuthError;
use crate::settings::{Database as DbCfg, Schema};
use crate::store::AccessStore;
use crate::types::{Attributes, Group, RuleRow, RuleType, SubjectId};

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, AuthError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// `AccessStore` over a relational database.
///
/// Table names and the subject primary key come from the schema mapping, so
/// queries are built with dynamic identifiers instead of static entities.
#[derive(Debug, Clone)]
pub struct DbStore {
    db: DatabaseConnection,
    schema: Schema,
}

impl DbStore {
    pub fn new(db: DatabaseConnection, schema: Schema) -> Self {
        Self { db, schema }
    }

    /// Bind the subject id numerically when it parses as an integer so the
    /// comparison also works against integer primary keys.
    fn subject_value(subject: &SubjectId) -> Value {
        match subject.as_str().parse::<i64>() {
            Ok(n) => n.into(),
            Err(_) => subject.as_str().into(),
        }
    }
}

/// The group's rule grants are stored as a comma-separated id list.
fn parse_rule_ids(csv: &str) -> Vec<i64> {
    csv.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

#[async_trait]
impl AccessStore for DbStore {
    async fn find_active_groups(&self, subject: &SubjectId) -> Result<Vec<Group>, AuthError> {
        let a = Alias::new("a");
        let g = Alias::new("g");

        let mut query = Query::select();
        query
            .column((g.clone(), Alias::new("id")))
            .column((g.clone(), Alias::new("title")))
            .column((g.clone(), Alias::new("rules")))
            .from_as(Alias::new(&self.schema.membership_table), a.clone())
            .join_as(
                JoinType::InnerJoin,
                Alias::new(&self.schema.group_table),
                g.clone(),
                Expr::col((g.clone(), Alias::new("id")))
                    .equals((a.clone(), Alias::new("group_id"))),
            )
            .and_where(
                Expr::col((a.clone(), Alias::new("subject_id"))).eq(Self::subject_value(subject)),
            )
            .and_where(Expr::col((g.clone(), Alias::new("status"))).eq(1));

        let backend = self.db.get_database_backend();
        let rows = self.db.query_all(backend.build(&query)).await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("", "id")?;
            let title: String = row.try_get("", "title")?;
            let rules: String = row.try_get("", "rules")?;
            groups.push(Group {
                id,
                title,
                rule_ids: parse_rule_ids(&rules),
            });
        }
        Ok(groups)
    }

    async fn find_rules_by_ids(
        &self,
        ids: &[i64],
        rule_type: RuleType,
    ) -> Result<Vec<RuleRow>, AuthError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = Query::select();
        query
            .column(Alias::new("name"))
            .column(Alias::new("condition"))
            .from(Alias::new(&self.schema.rule_table))
            .and_where(Expr::col(Alias::new("id")).is_in(ids.iter().copied()))
            .and_where(Expr::col(Alias::new("type")).eq(rule_type.0))
            .and_where(Expr::col(Alias::new("status")).eq(1));

        let backend = self.db.get_database_backend();
        let rows = self.db.query_all(backend.build(&query)).await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("", "name")?;
            let condition: Option<String> = row.try_get("", "condition")?;
            rules.push(RuleRow {
                name,
                condition: condition.filter(|c| !c.trim().is_empty()),
            });
        }
        Ok(rules)
    }

    async fn find_subject_attributes(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<Attributes>, AuthError> {
        let mut query = Query::select();
        query
            .column(Asterisk)
            .from(Alias::new(&self.schema.subject_table))
            .and_where(
                Expr::col(Alias::new(&self.schema.subject_pk)).eq(Self::subject_value(subject)),
            )
            .limit(1);

        let backend = self.db.get_database_backend();
        let row = JsonValue::find_by_statement(backend.build(&query))
            .one(&self.db)
            .await?;

        Ok(row.and_then(|value| match value {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    /// Test database helper that keeps the temp file alive
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

    async fn seed(db: &DatabaseConnection) {
        let statements = [
            "INSERT INTO auth_group (id, title, status, rules) VALUES \
             (1, 'editors', 1, '1,2'), (2, 'admins', 0, '3'), (3, 'reviewers', 1, '2,4')",
            "INSERT INTO auth_group_access (subject_id, group_id) VALUES \
             ('7', 1), ('7', 2), ('8', 3)",
            "INSERT INTO auth_rule (id, name, type, status, condition) VALUES \
             (1, 'Order/Edit', 1, 1, NULL), \
             (2, 'order/view?status=1', 1, 1, ''), \
             (3, 'order/delete', 1, 0, NULL), \
             (4, 'report/export', 2, 1, '{score}>5')",
            "INSERT INTO member (id, username, score) VALUES (7, 'alice', 50)",
        ];
        for sql in statements {
            db.execute_unprepared(sql).await.expect("Failed to seed");
        }
    }

    fn store(db: &DatabaseConnection) -> DbStore {
        DbStore::new(db.clone(), Schema::default())
    }

    #[tokio::test]
    async fn test_find_active_groups_filters_inactive() {
        let test_db = TestDb::new().await;
        seed(test_db.connection()).await;
        let store = store(test_db.connection());

        // subject 7 belongs to groups 1 (active) and 2 (inactive)
        let groups = store
            .find_active_groups(&SubjectId::from(7))
            .await
            .expect("query failed");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title, "editors");
        assert_eq!(groups[0].rule_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_find_active_groups_unknown_subject() {
        let test_db = TestDb::new().await;
        seed(test_db.connection()).await;
        let store = store(test_db.connection());

        let groups = store
            .find_active_groups(&SubjectId::from("nobody"))
            .await
            .expect("query failed");
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn test_find_rules_filters_type_and_status() {
        let test_db = TestDb::new().await;
        seed(test_db.connection()).await;
        let store = store(test_db.connection());

        let rules = store
            .find_rules_by_ids(&[1, 2, 3, 4], RuleType::REALTIME)
            .await
            .expect("query failed");

        // rule 3 is inactive, rule 4 is a different type
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Order/Edit", "order/view?status=1"]);
        // empty-string conditions normalize to None
        assert!(rules.iter().all(|r| r.condition.is_none()));
    }

    #[tokio::test]
    async fn test_find_rules_other_type() {
        let test_db = TestDb::new().await;
        seed(test_db.connection()).await;
        let store = store(test_db.connection());

        let rules = store
            .find_rules_by_ids(&[1, 2, 3, 4], RuleType::LOGIN)
            .await
            .expect("query failed");

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "report/export");
        assert_eq!(rules[0].condition.as_deref(), Some("{score}>5"));
    }

    #[tokio::test]
    async fn test_find_subject_attributes() {
        let test_db = TestDb::new().await;
        seed(test_db.connection()).await;
        let store = store(test_db.connection());

        let attributes = store
            .find_subject_attributes(&SubjectId::from(7))
            .await
            .expect("query failed")
            .expect("attribute record not found");

        assert_eq!(attributes.get("username"), Some(&serde_json::json!("alice")));
        assert_eq!(attributes.get("score"), Some(&serde_json::json!(50)));

        let missing = store
            .find_subject_attributes(&SubjectId::from(99))
            .await
            .expect("query failed");
        assert!(missing.is_none());
    }

    #[test]
    fn test_parse_rule_ids() {
        assert_eq!(parse_rule_ids("1,2,3"), vec![1, 2, 3]);
        assert_eq!(parse_rule_ids(",1, 2,"), vec![1, 2]);
        assert_eq!(parse_rule_ids(""), Vec::<i64>::new());
    }
}
