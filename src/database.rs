use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid id '{}'", raw))
}

fn parse_optional_uuid(raw: Option<String>) -> Result<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("invalid JSON column")
}

fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `sqlite::memory:` opens its own database, so an
        // in-memory pool is pinned to one long-lived connection.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(connect_options).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                created_by TEXT,
                source_type TEXT NOT NULL DEFAULT 'teacher_uploaded',
                artifact_id TEXT,
                type TEXT NOT NULL,
                parent_id TEXT,
                order_in_parent INTEGER,
                label TEXT,
                content TEXT NOT NULL DEFAULT '{}',
                subject_id TEXT,
                year_level TEXT,
                subject_component TEXT,
                curriculum_codes TEXT,
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                created_by TEXT NOT NULL,
                artifact_type TEXT NOT NULL,
                artifact_name TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assignments (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                teacher_id TEXT NOT NULL,
                class_id TEXT,
                student_ids TEXT NOT NULL DEFAULT '[]',
                artifact_id TEXT,
                title TEXT,
                instructions TEXT,
                due_date TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                grades_released_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS student_assignments (
                id TEXT PRIMARY KEY,
                assignment_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                progress TEXT NOT NULL DEFAULT '{}',
                submission TEXT,
                grade REAL,
                feedback TEXT,
                status TEXT NOT NULL DEFAULT 'not_started',
                auto_graded INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                submitted_at TEXT,
                graded_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (assignment_id) REFERENCES assignments(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "migrate", "schema ready");
        Ok(())
    }

    // Question operations
    pub async fn insert_question(&self, question: &Question) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, organization_id, created_by, source_type, artifact_id, type,
                                   parent_id, order_in_parent, label, content, subject_id, year_level,
                                   subject_component, curriculum_codes, is_public, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(question.id.to_string())
        .bind(&question.organization_id)
        .bind(&question.created_by)
        .bind(&question.source_type)
        .bind(question.artifact_id.map(|id| id.to_string()))
        .bind(question.question_type.as_str())
        .bind(question.parent_id.map(|id| id.to_string()))
        .bind(question.order_in_parent)
        .bind(&question.label)
        .bind(to_json_text(&question.content)?)
        .bind(&question.subject_id)
        .bind(&question.year_level)
        .bind(&question.subject_component)
        .bind(question.curriculum_codes.as_ref().map(to_json_text).transpose()?)
        .bind(question.is_public)
        .bind(timestamp(&question.created_at))
        .bind(timestamp(&question.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        let row = sqlx::query("SELECT * FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_question).transpose()
    }

    /// Questions of `organization_id` visible to `user_id`: their own plus
    /// public ones, newest first.
    pub async fn list_questions(
        &self,
        organization_id: &str,
        user_id: &str,
        filters: &QuestionFilters,
    ) -> Result<Vec<Question>> {
        let start = Instant::now();
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM questions WHERE organization_id = ");
        builder.push_bind(organization_id.to_string());
        builder.push(" AND (created_by = ");
        builder.push_bind(user_id.to_string());
        builder.push(" OR is_public = 1)");

        if let Some(ids) = filters.id_list() {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(id.to_string());
            }
            separated.push_unseparated(")");
        }
        if let Some(kind) = filters.question_type {
            builder.push(" AND type = ");
            builder.push_bind(kind.as_str());
        }
        if let Some(subject_id) = &filters.subject_id {
            builder.push(" AND subject_id = ");
            builder.push_bind(subject_id.clone());
        }
        if let Some(year_level) = &filters.year_level {
            builder.push(" AND year_level = ");
            builder.push_bind(year_level.clone());
        }
        if let Some(component) = &filters.subject_component {
            builder.push(" AND subject_component = ");
            builder.push_bind(component.clone());
        }
        if let Some(code) = &filters.curriculum_code {
            builder.push(
                " AND EXISTS (SELECT 1 FROM json_each(questions.curriculum_codes) WHERE json_each.value = ",
            );
            builder.push_bind(code.clone());
            builder.push(")");
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        log_db_operation!(
            debug,
            "list_questions",
            count = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        rows.iter().map(row_to_question).collect()
    }

    /// Questions of an organization by id, in storage order.
    pub async fn get_questions_by_ids(&self, organization_id: &str, ids: &[Uuid]) -> Result<Vec<Question>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM questions WHERE organization_id = ");
        builder.push_bind(organization_id.to_string());
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_question).collect()
    }

    pub async fn update_question(&self, question: &Question) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE questions
            SET type = ?1, content = ?2, source_type = ?3, parent_id = ?4, order_in_parent = ?5,
                label = ?6, subject_id = ?7, year_level = ?8, subject_component = ?9,
                curriculum_codes = ?10, is_public = ?11, updated_at = ?12
            WHERE id = ?13
            "#,
        )
        .bind(question.question_type.as_str())
        .bind(to_json_text(&question.content)?)
        .bind(&question.source_type)
        .bind(question.parent_id.map(|id| id.to_string()))
        .bind(question.order_in_parent)
        .bind(&question.label)
        .bind(&question.subject_id)
        .bind(&question.year_level)
        .bind(&question.subject_component)
        .bind(question.curriculum_codes.as_ref().map(to_json_text).transpose()?)
        .bind(question.is_public)
        .bind(timestamp(&question.updated_at))
        .bind(question.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_question(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Artifact operations
    pub async fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, organization_id, created_by, artifact_type, artifact_name, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(artifact.id.to_string())
        .bind(&artifact.organization_id)
        .bind(&artifact.created_by)
        .bind(&artifact.artifact_type)
        .bind(&artifact.artifact_name)
        .bind(to_json_text(&artifact.content)?)
        .bind(timestamp(&artifact.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref()
            .map(|row| -> Result<Artifact> {
                Ok(Artifact {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    organization_id: row.get("organization_id"),
                    created_by: row.get("created_by"),
                    artifact_type: row.get("artifact_type"),
                    artifact_name: row.get("artifact_name"),
                    content: parse_json(&row.get::<String, _>("content"))?,
                    created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                })
            })
            .transpose()
    }

    // Assignment operations

    /// Inserts the assignment and its student rows in one transaction.
    pub async fn insert_assignment(&self, assignment: &Assignment, rows: &[StudentAssignment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO assignments (id, organization_id, teacher_id, class_id, student_ids, artifact_id,
                                     title, instructions, due_date, status, grades_released_at,
                                     created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(assignment.id.to_string())
        .bind(&assignment.organization_id)
        .bind(&assignment.teacher_id)
        .bind(&assignment.class_id)
        .bind(to_json_text(&assignment.student_ids)?)
        .bind(assignment.artifact_id.map(|id| id.to_string()))
        .bind(&assignment.title)
        .bind(&assignment.instructions)
        .bind(assignment.due_date.as_ref().map(timestamp))
        .bind(assignment.status.as_str())
        .bind(assignment.grades_released_at.as_ref().map(timestamp))
        .bind(timestamp(&assignment.created_at))
        .bind(timestamp(&assignment.updated_at))
        .execute(&mut *tx)
        .await?;

        for row in rows {
            insert_student_assignment(&mut *tx, row).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        let row = sqlx::query("SELECT * FROM assignments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_assignment).transpose()
    }

    /// Assignments of an organization, newest first. `teacher_id` restricts to
    /// one teacher; `student_id` restricts to published assignments that
    /// include that student.
    pub async fn list_assignments(
        &self,
        organization_id: &str,
        teacher_id: Option<&str>,
        student_id: Option<&str>,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<Assignment>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM assignments WHERE organization_id = ");
        builder.push_bind(organization_id.to_string());

        if let Some(teacher_id) = teacher_id {
            builder.push(" AND teacher_id = ");
            builder.push_bind(teacher_id.to_string());
        }
        if let Some(student_id) = student_id {
            builder.push(" AND status = 'published'");
            builder.push(
                " AND EXISTS (SELECT 1 FROM json_each(assignments.student_ids) WHERE json_each.value = ",
            );
            builder.push_bind(student_id.to_string());
            builder.push(")");
        }
        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_assignment).collect()
    }

    pub async fn update_assignment_status(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(
            "UPDATE assignments SET status = ?1, grades_released_at = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(assignment.status.as_str())
        .bind(assignment.grades_released_at.as_ref().map(timestamp))
        .bind(timestamp(&assignment.updated_at))
        .bind(assignment.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the assignment and its student rows in one transaction.
    pub async fn delete_assignment(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM student_assignments WHERE assignment_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM assignments WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of student rows of an assignment that are submitted or graded.
    pub async fn count_turned_in(&self, assignment_id: Uuid) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS turned_in FROM student_assignments WHERE assignment_id = ?1 AND status IN ('submitted', 'graded')",
        )
        .bind(assignment_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("turned_in") as usize)
    }

    // Student assignment operations
    pub async fn get_student_assignment(&self, id: Uuid) -> Result<Option<StudentAssignment>> {
        let row = sqlx::query("SELECT * FROM student_assignments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_student_assignment).transpose()
    }

    /// Student rows of one assignment, oldest first.
    pub async fn list_student_assignments(&self, assignment_id: Uuid) -> Result<Vec<StudentAssignment>> {
        let rows = sqlx::query(
            "SELECT * FROM student_assignments WHERE assignment_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(assignment_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_student_assignment).collect()
    }

    /// One student's rows across assignments, newest first.
    pub async fn list_student_assignments_for_student(
        &self,
        organization_id: &str,
        student_id: &str,
    ) -> Result<Vec<StudentAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM student_assignments
            WHERE student_id = ?1 AND organization_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(student_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_student_assignment).collect()
    }

    /// Rows whose grade comes from the auto-grader or is still missing:
    /// submitted rows, and graded rows that no teacher has overridden.
    pub async fn list_auto_gradable_submissions(&self) -> Result<Vec<StudentAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM student_assignments
            WHERE status = 'submitted' OR (status = 'graded' AND auto_graded = 1)
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_student_assignment).collect()
    }

    /// Writes `row` only if the stored row still carries `read_at` as its
    /// `updated_at`. Returns false when another write got there first.
    pub async fn update_student_assignment(
        &self,
        row: &StudentAssignment,
        read_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE student_assignments
            SET progress = ?1, submission = ?2, grade = ?3, feedback = ?4, status = ?5,
                auto_graded = ?6, started_at = ?7, submitted_at = ?8, graded_at = ?9, updated_at = ?10
            WHERE id = ?11 AND updated_at = ?12
            "#,
        )
        .bind(to_json_text(&row.progress)?)
        .bind(row.submission.as_ref().map(to_json_text).transpose()?)
        .bind(row.grade)
        .bind(&row.feedback)
        .bind(row.status.as_str())
        .bind(row.auto_graded)
        .bind(row.started_at.as_ref().map(timestamp))
        .bind(row.submitted_at.as_ref().map(timestamp))
        .bind(row.graded_at.as_ref().map(timestamp))
        .bind(timestamp(&row.updated_at))
        .bind(row.id.to_string())
        .bind(timestamp(read_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn insert_student_assignment(conn: &mut SqliteConnection, row: &StudentAssignment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_assignments (id, assignment_id, student_id, organization_id, progress,
                                         submission, grade, feedback, status, auto_graded, started_at,
                                         submitted_at, graded_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(row.id.to_string())
    .bind(row.assignment_id.to_string())
    .bind(&row.student_id)
    .bind(&row.organization_id)
    .bind(to_json_text(&row.progress)?)
    .bind(row.submission.as_ref().map(to_json_text).transpose()?)
    .bind(row.grade)
    .bind(&row.feedback)
    .bind(row.status.as_str())
    .bind(row.auto_graded)
    .bind(row.started_at.as_ref().map(timestamp))
    .bind(row.submitted_at.as_ref().map(timestamp))
    .bind(row.graded_at.as_ref().map(timestamp))
    .bind(timestamp(&row.created_at))
    .bind(timestamp(&row.updated_at))
    .execute(conn)
    .await?;

    Ok(())
}

fn row_to_question(row: &SqliteRow) -> Result<Question> {
    Ok(Question {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        organization_id: row.get("organization_id"),
        created_by: row.get("created_by"),
        source_type: row.get("source_type"),
        artifact_id: parse_optional_uuid(row.get("artifact_id"))?,
        question_type: row.get::<String, _>("type").parse()?,
        parent_id: parse_optional_uuid(row.get("parent_id"))?,
        order_in_parent: row.get("order_in_parent"),
        label: row.get("label"),
        content: parse_json(&row.get::<String, _>("content"))?,
        subject_id: row.get("subject_id"),
        year_level: row.get("year_level"),
        subject_component: row.get("subject_component"),
        curriculum_codes: row
            .get::<Option<String>, _>("curriculum_codes")
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        is_public: row.get("is_public"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn row_to_assignment(row: &SqliteRow) -> Result<Assignment> {
    let student_ids: Vec<String> = serde_json::from_str(&row.get::<String, _>("student_ids"))?;
    Ok(Assignment {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        organization_id: row.get("organization_id"),
        teacher_id: row.get("teacher_id"),
        class_id: row.get("class_id"),
        student_count: student_ids.len(),
        student_ids,
        artifact_id: parse_optional_uuid(row.get("artifact_id"))?,
        title: row.get("title"),
        instructions: row.get("instructions"),
        due_date: parse_optional_timestamp(row.get("due_date"))?,
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(anyhow::Error::msg)?,
        grades_released_at: parse_optional_timestamp(row.get("grades_released_at"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        submitted_count: 0,
    })
}

fn row_to_student_assignment(row: &SqliteRow) -> Result<StudentAssignment> {
    Ok(StudentAssignment {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        assignment_id: parse_uuid(&row.get::<String, _>("assignment_id"))?,
        student_id: row.get("student_id"),
        organization_id: row.get("organization_id"),
        progress: parse_json(&row.get::<String, _>("progress"))?,
        submission: row
            .get::<Option<String>, _>("submission")
            .as_deref()
            .map(parse_json)
            .transpose()?,
        grade: row.get("grade"),
        feedback: row.get("feedback"),
        status: row
            .get::<String, _>("status")
            .parse()
            .map_err(anyhow::Error::msg)?,
        auto_graded: row.get("auto_graded"),
        started_at: parse_optional_timestamp(row.get("started_at"))?,
        submitted_at: parse_optional_timestamp(row.get("submitted_at"))?,
        graded_at: parse_optional_timestamp(row.get("graded_at"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;
    use serde_json::json;

    fn question(org: &str, owner: &str, kind: QuestionType, is_public: bool) -> Question {
        let now = Utc::now();
        Question {
            id: Uuid::new_v4(),
            organization_id: org.to_string(),
            created_by: Some(owner.to_string()),
            source_type: "teacher_uploaded".to_string(),
            artifact_id: None,
            question_type: kind,
            parent_id: None,
            order_in_parent: None,
            label: None,
            content: json!({"question": "?"}),
            subject_id: Some("math".to_string()),
            year_level: None,
            subject_component: None,
            curriculum_codes: Some(vec!["MAT.1".to_string()]),
            is_public,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_question_round_trip() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let stored = question("org", "t1", QuestionType::Matching, false);
        db.insert_question(&stored).await.unwrap();

        let loaded = db.get_question(stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, stored.id);
        assert_eq!(loaded.question_type, QuestionType::Matching);
        assert_eq!(loaded.content, stored.content);
        assert_eq!(loaded.curriculum_codes, stored.curriculum_codes);
        assert!(db.get_question(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_questions_visibility_and_filters() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let own = question("org", "t1", QuestionType::MultipleChoice, false);
        let shared = question("org", "t2", QuestionType::TrueFalse, true);
        let private = question("org", "t2", QuestionType::TrueFalse, false);
        let other_org = question("other", "t1", QuestionType::TrueFalse, true);
        for q in [&own, &shared, &private, &other_org] {
            db.insert_question(q).await.unwrap();
        }

        let visible = db.list_questions("org", "t1", &QuestionFilters::default()).await.unwrap();
        let ids: Vec<Uuid> = visible.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![shared.id, own.id]);

        let filters = QuestionFilters {
            question_type: Some(QuestionType::TrueFalse),
            ..Default::default()
        };
        let filtered = db.list_questions("org", "t1", &filters).await.unwrap();
        assert_eq!(filtered.len(), 1);

        let filters = QuestionFilters {
            curriculum_code: Some("MAT.1".to_string()),
            ids: Some(own.id.to_string()),
            ..Default::default()
        };
        let filtered = db.list_questions("org", "t1", &filters).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, own.id);
    }

    fn assignment(student_ids: &[&str]) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Uuid::new_v4(),
            organization_id: "org".to_string(),
            teacher_id: "t1".to_string(),
            class_id: None,
            student_ids: student_ids.iter().map(|id| id.to_string()).collect(),
            artifact_id: None,
            title: Some("TPC".to_string()),
            instructions: None,
            due_date: None,
            status: AssignmentStatus::Published,
            grades_released_at: None,
            created_at: now,
            updated_at: now,
            student_count: student_ids.len(),
            submitted_count: 0,
        }
    }

    fn student_row(assignment: &Assignment, student_id: &str, status: StudentAssignmentStatus) -> StudentAssignment {
        let now = Utc::now();
        StudentAssignment {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            student_id: student_id.to_string(),
            organization_id: assignment.organization_id.clone(),
            progress: json!({}),
            submission: None,
            grade: None,
            feedback: None,
            status,
            auto_graded: false,
            started_at: None,
            submitted_at: None,
            graded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_delete_assignment_removes_student_rows() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let assignment = assignment(&["s1"]);
        let row = student_row(&assignment, "s1", StudentAssignmentStatus::Submitted);
        db.insert_assignment(&assignment, std::slice::from_ref(&row)).await.unwrap();
        assert_eq!(db.count_turned_in(assignment.id).await.unwrap(), 1);

        let listed = db.list_assignments("org", None, Some("s1"), None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(db.list_assignments("org", None, Some("s2"), None).await.unwrap().is_empty());

        assert!(db.delete_assignment(assignment.id).await.unwrap());
        assert!(db.get_student_assignment(row.id).await.unwrap().is_none());
        assert!(!db.delete_assignment(assignment.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_student_insert_rolls_back_assignment() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let assignment = assignment(&["s1", "s2"]);
        let first = student_row(&assignment, "s1", StudentAssignmentStatus::NotStarted);
        let mut clash = student_row(&assignment, "s2", StudentAssignmentStatus::NotStarted);
        clash.id = first.id;

        assert!(db.insert_assignment(&assignment, &[first.clone(), clash]).await.is_err());
        assert!(db.get_assignment(assignment.id).await.unwrap().is_none());
        assert!(db.get_student_assignment(first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_student_write_is_rejected() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let assignment = assignment(&["s1"]);
        let row = student_row(&assignment, "s1", StudentAssignmentStatus::InProgress);
        db.insert_assignment(&assignment, std::slice::from_ref(&row)).await.unwrap();
        let read = db.get_student_assignment(row.id).await.unwrap().unwrap();

        let mut submitted = read.clone();
        submitted.status = StudentAssignmentStatus::Submitted;
        submitted.updated_at = read.updated_at + chrono::Duration::seconds(1);
        assert!(db.update_student_assignment(&submitted, &read.updated_at).await.unwrap());

        let mut autosave = read.clone();
        autosave.progress = json!({"answers": {"q1": "old"}});
        autosave.updated_at = read.updated_at + chrono::Duration::seconds(2);
        assert!(!db.update_student_assignment(&autosave, &read.updated_at).await.unwrap());

        let stored = db.get_student_assignment(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, StudentAssignmentStatus::Submitted);
        assert_eq!(stored.progress, json!({}));
    }
}
