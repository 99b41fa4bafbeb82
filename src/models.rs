use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::grading::GradableQuestion;
use crate::question::{EditorQuestion, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The caller of a request, as established by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            role,
        }
    }

    /// Teachers and admins.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Question bank

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub organization_id: String,
    pub created_by: Option<String>,
    pub source_type: String, // teacher_uploaded, ai_created, national_exam, ...
    pub artifact_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub parent_id: Option<Uuid>,
    pub order_in_parent: Option<i64>,
    pub label: Option<String>,
    pub content: Value,
    pub subject_id: Option<String>,
    pub year_level: Option<String>,
    pub subject_component: Option<String>,
    pub curriculum_codes: Option<Vec<String>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Question> for GradableQuestion {
    fn from(question: &Question) -> Self {
        GradableQuestion {
            id: question.id.to_string(),
            question_type: question.question_type,
            content: question.content.clone(),
        }
    }
}

fn default_source_type() -> String {
    "teacher_uploaded".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub content: Value,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    pub artifact_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub order_in_parent: Option<i64>,
    pub label: Option<String>,
    pub subject_id: Option<String>,
    pub year_level: Option<String>,
    pub subject_component: Option<String>,
    pub curriculum_codes: Option<Vec<String>>,
    #[serde(default)]
    pub is_public: bool,
}

/// Partial update. Absent fields are left untouched; an explicit `null`
/// clears the optional ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: Option<QuestionType>,
    pub content: Option<Value>,
    pub source_type: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub order_in_parent: Option<Option<i64>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub label: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub year_level: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub subject_component: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub curriculum_codes: Option<Option<Vec<String>>>,
    pub is_public: Option<bool>,
}

/// A present field, `null` included, becomes `Some`. Absent fields fall back
/// to `None` through `#[serde(default)]`.
fn clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateQuestionRequest {
    pub fn is_empty(&self) -> bool {
        self.question_type.is_none()
            && self.content.is_none()
            && self.source_type.is_none()
            && self.parent_id.is_none()
            && self.order_in_parent.is_none()
            && self.label.is_none()
            && self.subject_id.is_none()
            && self.year_level.is_none()
            && self.subject_component.is_none()
            && self.curriculum_codes.is_none()
            && self.is_public.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionFilters {
    /// Comma-separated question ids.
    pub ids: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<QuestionType>,
    pub subject_id: Option<String>,
    pub year_level: Option<String>,
    pub subject_component: Option<String>,
    pub curriculum_code: Option<String>,
}

impl QuestionFilters {
    /// Parsed `ids`; entries that are not valid ids are dropped.
    pub fn id_list(&self) -> Option<Vec<Uuid>> {
        self.ids.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .filter_map(|id| Uuid::parse_str(id).ok())
                .collect()
        })
    }
}

// Artifacts

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub organization_id: String,
    pub created_by: String,
    pub artifact_type: String, // quiz, note, uploaded_file, ...
    pub artifact_name: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn is_quiz(&self) -> bool {
        self.artifact_type == "quiz"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArtifactRequest {
    pub artifact_type: String,
    pub artifact_name: String,
    #[serde(default)]
    pub content: Value,
}

// Assignments

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Draft,
    Published,
    Closed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Draft => "draft",
            AssignmentStatus::Published => "published",
            AssignmentStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AssignmentStatus::Draft),
            "published" => Ok(AssignmentStatus::Published),
            "closed" => Ok(AssignmentStatus::Closed),
            other => Err(format!("unknown assignment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentAssignmentStatus {
    #[default]
    NotStarted,
    InProgress,
    Submitted,
    Graded,
}

impl StudentAssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentAssignmentStatus::NotStarted => "not_started",
            StudentAssignmentStatus::InProgress => "in_progress",
            StudentAssignmentStatus::Submitted => "submitted",
            StudentAssignmentStatus::Graded => "graded",
        }
    }

    /// Submitted or graded.
    pub fn is_turned_in(&self) -> bool {
        matches!(self, StudentAssignmentStatus::Submitted | StudentAssignmentStatus::Graded)
    }
}

impl fmt::Display for StudentAssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentAssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(StudentAssignmentStatus::NotStarted),
            "in_progress" => Ok(StudentAssignmentStatus::InProgress),
            "submitted" => Ok(StudentAssignmentStatus::Submitted),
            "graded" => Ok(StudentAssignmentStatus::Graded),
            other => Err(format!("unknown student assignment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub organization_id: String,
    pub teacher_id: String,
    pub class_id: Option<String>,
    pub student_ids: Vec<String>,
    pub artifact_id: Option<Uuid>,
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: AssignmentStatus,
    pub grades_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Hydrated
    #[serde(default)]
    pub student_count: usize,
    #[serde(default)]
    pub submitted_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignmentRequest {
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub artifact_id: Option<Uuid>,
    pub class_id: Option<String>,
    pub student_ids: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAssignmentStatusRequest {
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentListQuery {
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAssignment {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: String,
    pub organization_id: String,
    pub progress: Value,
    pub submission: Option<Value>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub status: StudentAssignmentStatus,
    pub auto_graded: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A student's row together with the assignment it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyAssignment {
    #[serde(flatten)]
    pub student_assignment: StudentAssignment,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStudentAssignmentRequest {
    pub progress: Option<Value>,
    pub submission: Option<Value>,
    pub status: Option<StudentAssignmentStatus>, // only in_progress or submitted
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeacherGradeRequest {
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub question_overrides: Option<HashMap<String, bool>>,
}

// Editor endpoints

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredContent {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub question: EditorQuestion,
    pub target_type: QuestionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub questions: Vec<GradableQuestion>,
    #[serde(default)]
    pub answers: Value,
}
