use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{ServiceError, ServiceResult};
use crate::grading::{apply_question_overrides, grade_quiz_attempt, GradableQuestion, QuizGrading};
use crate::models::*;
use crate::question_service::QuestionService;

// Import logging macros
use crate::{log_grading, log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "assignment_service";

/// Assignments, per-student submission state and grading.
#[derive(Clone)]
pub struct AssignmentService {
    db: Database,
    questions: QuestionService,
}

fn require_staff(actor: &Actor) -> ServiceResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Only teachers and admins can manage assignments".to_string()))
    }
}

fn embed_grading(submission: &mut Option<Value>, grading: &QuizGrading) -> ServiceResult<()> {
    if let Some(Value::Object(map)) = submission {
        let summary = serde_json::to_value(grading).context("failed to serialize grading summary")?;
        map.insert("grading".to_string(), summary);
    }
    Ok(())
}

fn embedded_grading(submission: Option<&Value>) -> Option<QuizGrading> {
    let grading = submission?.get("grading")?;
    serde_json::from_value(grading.clone()).ok()
}

impl AssignmentService {
    pub fn new(db: Database, questions: QuestionService) -> Self {
        Self { db, questions }
    }

    async fn hydrate(&self, mut assignment: Assignment) -> ServiceResult<Assignment> {
        assignment.submitted_count = self.db.count_turned_in(assignment.id).await?;
        Ok(assignment)
    }

    async fn org_assignment(&self, actor: &Actor, id: Uuid) -> ServiceResult<Assignment> {
        match self.db.get_assignment(id).await? {
            Some(assignment) if assignment.organization_id == actor.organization_id => Ok(assignment),
            _ => Err(ServiceError::NotFound("assignment".to_string())),
        }
    }

    async fn owned_assignment(&self, actor: &Actor, id: Uuid) -> ServiceResult<Assignment> {
        require_staff(actor)?;
        let assignment = self.org_assignment(actor, id).await?;
        if assignment.teacher_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Only the teacher who created the assignment can change it".to_string(),
            ));
        }
        Ok(assignment)
    }

    pub async fn create_assignment(
        &self,
        actor: &Actor,
        request: CreateAssignmentRequest,
    ) -> ServiceResult<Assignment> {
        require_staff(actor)?;
        if request.status == AssignmentStatus::Closed {
            return Err(ServiceError::Validation(
                "An assignment cannot be created closed".to_string(),
            ));
        }
        if let Some(artifact_id) = request.artifact_id {
            if self.questions.get_artifact(actor, artifact_id).await.is_err() {
                return Err(ServiceError::Validation(format!("artifact {} does not exist", artifact_id)));
            }
        }
        log_service_start!(SERVICE, "create_assignment");

        let mut student_ids: Vec<String> = Vec::new();
        for student_id in request.student_ids.unwrap_or_default() {
            let student_id = student_id.trim().to_string();
            if !student_id.is_empty() && !student_ids.contains(&student_id) {
                student_ids.push(student_id);
            }
        }

        let now = Utc::now();
        let assignment = Assignment {
            id: Uuid::new_v4(),
            organization_id: actor.organization_id.clone(),
            teacher_id: actor.user_id.clone(),
            class_id: request.class_id,
            student_count: student_ids.len(),
            student_ids,
            artifact_id: request.artifact_id,
            title: request.title,
            instructions: request.instructions,
            due_date: request.due_date,
            status: request.status,
            grades_released_at: None,
            created_at: now,
            updated_at: now,
            submitted_count: 0,
        };
        let rows: Vec<StudentAssignment> = assignment
            .student_ids
            .iter()
            .map(|student_id| StudentAssignment {
                id: Uuid::new_v4(),
                assignment_id: assignment.id,
                student_id: student_id.clone(),
                organization_id: assignment.organization_id.clone(),
                progress: json!({}),
                submission: None,
                grade: None,
                feedback: None,
                status: StudentAssignmentStatus::NotStarted,
                auto_graded: false,
                started_at: None,
                submitted_at: None,
                graded_at: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        self.db.insert_assignment(&assignment, &rows).await?;

        log_service_success!(SERVICE, "create_assignment", assignment_id = assignment.id, "assignment created");
        Ok(assignment)
    }

    /// Teachers see their own assignments, admins every assignment of the
    /// organization, students the published ones that include them.
    pub async fn list_assignments(
        &self,
        actor: &Actor,
        query: &AssignmentListQuery,
    ) -> ServiceResult<Vec<Assignment>> {
        let start = Instant::now();
        let (teacher_id, student_id) = match actor.role {
            Role::Admin => (None, None),
            Role::Teacher => (Some(actor.user_id.as_str()), None),
            Role::Student => (None, Some(actor.user_id.as_str())),
        };

        let assignments = self
            .db
            .list_assignments(&actor.organization_id, teacher_id, student_id, query.status)
            .await?;

        let mut hydrated = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            hydrated.push(self.hydrate(assignment).await?);
        }

        log_service_success!(
            SERVICE,
            "list_assignments",
            count = hydrated.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(hydrated)
    }

    pub async fn get_assignment(&self, actor: &Actor, id: Uuid) -> ServiceResult<Assignment> {
        let assignment = self.org_assignment(actor, id).await?;
        if actor.role == Role::Student
            && (assignment.status == AssignmentStatus::Draft || !assignment.student_ids.contains(&actor.user_id))
        {
            return Err(ServiceError::NotFound("assignment".to_string()));
        }
        self.hydrate(assignment).await
    }

    pub async fn delete_assignment(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        self.owned_assignment(actor, id).await?;
        if !self.db.delete_assignment(id).await? {
            return Err(ServiceError::NotFound("assignment".to_string()));
        }
        log_service_success!(SERVICE, "delete_assignment", assignment_id = id, "assignment deleted");
        Ok(())
    }

    /// Closing an assignment releases grades; the release time is kept from
    /// the first close.
    pub async fn update_assignment_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: AssignmentStatus,
    ) -> ServiceResult<Assignment> {
        let mut assignment = self.owned_assignment(actor, id).await?;
        let now = Utc::now();

        assignment.status = status;
        if status == AssignmentStatus::Closed && assignment.grades_released_at.is_none() {
            assignment.grades_released_at = Some(now);
        }
        assignment.updated_at = now;

        self.db.update_assignment_status(&assignment).await?;
        log_service_success!(
            SERVICE,
            "update_assignment_status",
            assignment_id = id,
            format!("status set to {}", status)
        );
        self.hydrate(assignment).await
    }

    /// Every student row of an assignment. Teachers must own it.
    pub async fn list_student_assignments(
        &self,
        actor: &Actor,
        assignment_id: Uuid,
    ) -> ServiceResult<Vec<StudentAssignment>> {
        require_staff(actor)?;
        let assignment = self.org_assignment(actor, assignment_id).await?;
        if !actor.is_admin() && assignment.teacher_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Only the teacher who created the assignment can view its submissions".to_string(),
            ));
        }
        Ok(self.db.list_student_assignments(assignment_id).await?)
    }

    /// The caller's rows whose assignment is published or closed.
    pub async fn my_assignments(&self, actor: &Actor) -> ServiceResult<Vec<MyAssignment>> {
        let rows = self
            .db
            .list_student_assignments_for_student(&actor.organization_id, &actor.user_id)
            .await?;

        let mut mine = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(assignment) = self.db.get_assignment(row.assignment_id).await? else {
                continue;
            };
            if assignment.status == AssignmentStatus::Draft {
                continue;
            }
            mine.push(MyAssignment {
                student_assignment: row,
                assignment,
            });
        }
        Ok(mine)
    }

    /// Grades an attempt against the quiz of an assignment. `None` when the
    /// assignment has no quiz or nothing in it can be auto-graded.
    async fn grade_attempt(&self, assignment_id: Uuid, attempt: &Value) -> ServiceResult<Option<QuizGrading>> {
        let Some(assignment) = self.db.get_assignment(assignment_id).await? else {
            return Ok(None);
        };
        let Some(artifact_id) = assignment.artifact_id else {
            return Ok(None);
        };
        let Some(artifact) = self.db.get_artifact(artifact_id).await? else {
            log_service_warn!(SERVICE, "grade_attempt", format!("artifact {} is missing", artifact_id));
            return Ok(None);
        };

        let questions: Vec<GradableQuestion> = self
            .questions
            .load_quiz_questions(&artifact)
            .await?
            .iter()
            .map(GradableQuestion::from)
            .collect();
        Ok(grade_quiz_attempt(&questions, attempt))
    }

    /// Writes a row read earlier in the request. A row changed in between,
    /// such as a submission landing during an autosave, is a conflict.
    async fn save_student_assignment(&self, row: &mut StudentAssignment, now: DateTime<Utc>) -> ServiceResult<()> {
        let read_at = row.updated_at;
        row.updated_at = now;
        if !self.db.update_student_assignment(row, &read_at).await? {
            log_service_warn!(SERVICE, "save_student_assignment", format!("row {} changed concurrently", row.id));
            return Err(ServiceError::Conflict(
                "The assignment was updated by another request, reload and try again".to_string(),
            ));
        }
        Ok(())
    }

    /// A student saving progress or turning in their work.
    pub async fn update_student_assignment(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateStudentAssignmentRequest,
    ) -> ServiceResult<StudentAssignment> {
        let mut row = match self.db.get_student_assignment(id).await? {
            Some(row) if row.student_id == actor.user_id && row.organization_id == actor.organization_id => row,
            _ => return Err(ServiceError::NotFound("student assignment".to_string())),
        };
        log_service_start!(SERVICE, "update_student_assignment", student_assignment_id = id);

        if let Some(status) = request.status {
            match status {
                StudentAssignmentStatus::InProgress | StudentAssignmentStatus::Submitted => {}
                other => {
                    return Err(ServiceError::Validation(format!(
                        "status must be in_progress or submitted, got {}",
                        other
                    )));
                }
            }
            if status == StudentAssignmentStatus::InProgress && row.status.is_turned_in() {
                return Err(ServiceError::Conflict(
                    "Cannot move a submitted assignment back to in progress".to_string(),
                ));
            }
        }

        let now = Utc::now();
        if let Some(progress) = request.progress {
            row.progress = progress;
        }
        let submission_sent = request.submission.is_some();
        let submission_is_object = matches!(request.submission, Some(Value::Object(_)));
        if let Some(submission) = request.submission {
            row.submission = Some(submission);
            row.submitted_at = Some(now);
        }
        match request.status {
            Some(StudentAssignmentStatus::InProgress) => {
                row.status = StudentAssignmentStatus::InProgress;
                row.started_at.get_or_insert(now);
            }
            Some(StudentAssignmentStatus::Submitted) => {
                row.status = StudentAssignmentStatus::Submitted;
                row.submitted_at = Some(now);
            }
            _ => {}
        }

        let submitting = request.status == Some(StudentAssignmentStatus::Submitted);
        let attempt = if submission_sent || submitting {
            Some(row.submission.clone().unwrap_or_else(|| row.progress.clone()))
        } else {
            None
        };

        if let Some(attempt) = attempt {
            match self.grade_attempt(row.assignment_id, &attempt).await? {
                Some(grading) => {
                    row.grade = Some(grading.score);
                    row.auto_graded = true;
                    row.graded_at = Some(now);
                    if submitting {
                        row.status = StudentAssignmentStatus::Graded;
                    }
                    if submission_is_object {
                        embed_grading(&mut row.submission, &grading)?;
                    }
                    log_grading!(
                        auto,
                        student_assignment_id = id,
                        score = grading.score,
                        total = grading.total_questions,
                        correct = grading.correct_questions
                    );
                }
                None => {
                    log_grading!(skipped, student_assignment_id = id, "no auto-gradable questions");
                }
            }
        }

        self.save_student_assignment(&mut row, now).await?;
        Ok(row)
    }

    /// A teacher's grade. Per-question overrides rewrite the embedded
    /// grading summary; an explicit grade wins over the recomputed score.
    pub async fn teacher_grade(
        &self,
        actor: &Actor,
        id: Uuid,
        request: TeacherGradeRequest,
    ) -> ServiceResult<StudentAssignment> {
        require_staff(actor)?;
        let mut row = match self.db.get_student_assignment(id).await? {
            Some(row) if row.organization_id == actor.organization_id => row,
            _ => return Err(ServiceError::NotFound("student assignment".to_string())),
        };
        let assignment = self.org_assignment(actor, row.assignment_id).await?;
        if assignment.teacher_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "Only the teacher who created the assignment can grade it".to_string(),
            ));
        }
        if let Some(grade) = request.grade {
            if !grade.is_finite() {
                return Err(ServiceError::Validation("grade must be a number".to_string()));
            }
        }

        let now = Utc::now();
        row.status = StudentAssignmentStatus::Graded;
        row.auto_graded = false;
        row.graded_at = Some(now);
        if let Some(feedback) = request.feedback {
            row.feedback = Some(feedback);
        }

        let overrides = request.question_overrides.unwrap_or_default();
        if !overrides.is_empty() {
            match embedded_grading(row.submission.as_ref()) {
                Some(grading) => {
                    let regraded = apply_question_overrides(&grading, &overrides);
                    if request.grade.is_none() {
                        row.grade = Some(regraded.score);
                    }
                    embed_grading(&mut row.submission, &regraded)?;
                }
                None => {
                    log_service_warn!(
                        SERVICE,
                        "teacher_grade",
                        format!("submission {} has no grading to override", id)
                    );
                }
            }
        }
        if let Some(grade) = request.grade {
            row.grade = Some(grade.clamp(0.0, 100.0));
        }

        self.save_student_assignment(&mut row, now).await?;
        log_grading!(teacher, student_assignment_id = id, grade = row.grade, overrides = overrides.len());
        Ok(row)
    }

    /// Re-runs auto-grading on a stored submission. Returns the updated row
    /// when the grade or status would change; nothing is written.
    pub async fn regrade_submission(&self, row: &StudentAssignment) -> ServiceResult<Option<StudentAssignment>> {
        let attempt = row.submission.clone().unwrap_or_else(|| row.progress.clone());
        let Some(grading) = self.grade_attempt(row.assignment_id, &attempt).await? else {
            return Ok(None);
        };

        let mut updated = row.clone();
        updated.grade = Some(grading.score);
        updated.auto_graded = true;
        if updated.status == StudentAssignmentStatus::Submitted {
            updated.status = StudentAssignmentStatus::Graded;
        }
        embed_grading(&mut updated.submission, &grading)?;

        if updated.grade == row.grade && updated.status == row.status && updated.submission == row.submission {
            return Ok(None);
        }
        let now = Utc::now();
        updated.graded_at.get_or_insert(now);
        updated.updated_at = now;
        Ok(Some(updated))
    }
}
