use anyhow::Result;
use chrono::{DateTime, Utc};
use lusia_quiz::{log_performance, log_service_error, AssignmentService, Database, QuestionService, StudentAssignment};
use std::env;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Default)]
struct RegradeStats {
    total_submissions: usize,
    submissions_changed: usize,
    submissions_updated: usize,
    submissions_skipped: usize,
    errors: Vec<String>,
}

impl RegradeStats {
    fn print_summary(&self, dry_run: bool) {
        println!("\n=== Regrade Summary ===");
        println!("Submissions examined: {}", self.total_submissions);
        println!("Submissions with a different grade: {}", self.submissions_changed);

        if dry_run {
            println!("Submissions that WOULD BE updated: {}", self.submissions_changed);
            println!("\n** DRY RUN MODE - No changes were made **");
        } else {
            println!("Submissions successfully updated: {}", self.submissions_updated);
            if self.submissions_skipped > 0 {
                println!("Submissions skipped (changed while regrading): {}", self.submissions_skipped);
            }
        }
        if !self.errors.is_empty() {
            println!("Errors encountered: {}", self.errors.len());
            for error in &self.errors {
                println!("  - {}", error);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct GradeChange {
    id: Uuid,
    student_id: String,
    previous_grade: Option<f64>,
    read_at: DateTime<Utc>,
    updated: StudentAssignment,
}

impl GradeChange {
    fn print_preview(&self) {
        println!(
            "\nSubmission {} (student {}): {} -> {} [{}]",
            self.id,
            self.student_id,
            format_grade(self.previous_grade),
            format_grade(self.updated.grade),
            self.updated.status
        );
    }
}

fn format_grade(grade: Option<f64>) -> String {
    grade.map(|g| format!("{:.2}", g)).unwrap_or_else(|| "-".to_string())
}

async fn find_changes(service: &AssignmentService, rows: &[StudentAssignment], stats: &mut RegradeStats) -> Vec<GradeChange> {
    let mut changes = Vec::new();

    for row in rows {
        match service.regrade_submission(row).await {
            Ok(Some(updated)) => changes.push(GradeChange {
                id: row.id,
                student_id: row.student_id.clone(),
                previous_grade: row.grade,
                read_at: row.updated_at,
                updated,
            }),
            Ok(None) => {}
            Err(e) => {
                log_service_error!("regrade", "regrade_submission", student_assignment_id = row.id, error = e);
                stats.errors.push(format!("Failed to grade submission {}: {}", row.id, e));
            }
        }
    }

    changes
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    let dry_run = args.iter().any(|arg| arg == "--dry-run");

    println!("=== Submission Regrade Tool ===");
    if dry_run {
        println!("** RUNNING IN DRY-RUN MODE **");
        println!("This will show which grades would change without making any updates.");
    } else {
        println!("** LIVE MODE - Grades will be rewritten in the database **");
    }

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:lusia_quiz.db".to_string());
    println!("\nConnecting to database: {}", database_url);
    let db = Database::new(&database_url).await?;
    let service = AssignmentService::new(db.clone(), QuestionService::new(db.clone()));

    let started = Instant::now();
    let rows = db.list_auto_gradable_submissions().await?;
    let mut stats = RegradeStats {
        total_submissions: rows.len(),
        ..Default::default()
    };

    println!("\nRe-grading {} auto-graded submissions...", rows.len());
    let changes = find_changes(&service, &rows, &mut stats).await;
    stats.submissions_changed = changes.len();

    for (i, change) in changes.iter().enumerate() {
        if i < 5 || dry_run {
            change.print_preview();
        } else if i == 5 {
            println!("\n... and {} more submissions", changes.len() - 5);
            break;
        }
    }

    if !dry_run {
        for change in &changes {
            match db.update_student_assignment(&change.updated, &change.read_at).await {
                Ok(true) => stats.submissions_updated += 1,
                Ok(false) => stats.submissions_skipped += 1,
                Err(e) => stats.errors.push(format!("Failed to update submission {}: {}", change.id, e)),
            }
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let throughput = if elapsed_ms == 0 {
        stats.total_submissions as u64
    } else {
        stats.total_submissions as u64 * 1000 / elapsed_ms
    };
    log_performance!("regrade", duration_ms = elapsed_ms, throughput = throughput);

    stats.print_summary(dry_run);
    println!("\nFinished in {} ms", elapsed_ms);

    Ok(())
}
