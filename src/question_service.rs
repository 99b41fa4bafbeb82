use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{ServiceError, ServiceResult};
use crate::grading::quiz_question_ids;
use crate::models::*;
use crate::normalizer::{denormalize_question, normalize_question, without_answer_key};
use crate::question::EditorQuestion;

// Import logging macros
use crate::{log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "question_service";

/// Question bank and quiz artifacts, scoped to the caller's organization.
#[derive(Clone)]
pub struct QuestionService {
    db: Database,
}

fn require_staff(actor: &Actor) -> ServiceResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Only teachers and admins can manage questions".to_string()))
    }
}

fn object_content(content: Value) -> ServiceResult<Value> {
    match content {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(map) => Ok(Value::Object(map)),
        _ => Err(ServiceError::Validation("content must be a JSON object".to_string())),
    }
}

/// Students never see answer keys.
fn visible_to(actor: &Actor, mut question: Question) -> Question {
    if !actor.is_staff() {
        question.content = without_answer_key(&question.content);
    }
    question
}

impl QuestionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list_questions(&self, actor: &Actor, filters: &QuestionFilters) -> ServiceResult<Vec<Question>> {
        let questions = self
            .db
            .list_questions(&actor.organization_id, &actor.user_id, filters)
            .await?;
        Ok(questions.into_iter().map(|question| visible_to(actor, question)).collect())
    }

    pub async fn create_question(&self, actor: &Actor, request: CreateQuestionRequest) -> ServiceResult<Question> {
        require_staff(actor)?;
        log_service_start!(SERVICE, "create_question");

        let now = Utc::now();
        let question = Question {
            id: Uuid::new_v4(),
            organization_id: actor.organization_id.clone(),
            created_by: Some(actor.user_id.clone()),
            source_type: request.source_type,
            artifact_id: request.artifact_id,
            question_type: request.question_type,
            parent_id: request.parent_id,
            order_in_parent: request.order_in_parent,
            label: request.label.filter(|label| !label.is_empty()),
            content: object_content(request.content)?,
            subject_id: request.subject_id.filter(|s| !s.is_empty()),
            year_level: request.year_level.filter(|s| !s.is_empty()),
            subject_component: request.subject_component.filter(|s| !s.is_empty()),
            curriculum_codes: request.curriculum_codes,
            is_public: request.is_public,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_question(&question).await?;

        log_service_success!(SERVICE, "create_question", question_id = question.id, "question created");
        Ok(question)
    }

    /// A question the caller may view: their own or a public one.
    pub async fn get_question(&self, actor: &Actor, id: Uuid) -> ServiceResult<Question> {
        match self.db.get_question(id).await? {
            Some(question)
                if question.organization_id == actor.organization_id
                    && (question.is_public || question.created_by.as_deref() == Some(actor.user_id.as_str())) =>
            {
                Ok(visible_to(actor, question))
            }
            _ => Err(ServiceError::NotFound("question".to_string())),
        }
    }

    /// A question the caller may modify. Admins may modify any question of
    /// their organization, teachers only their own.
    async fn editable_question(&self, actor: &Actor, id: Uuid) -> ServiceResult<Question> {
        require_staff(actor)?;
        match self.db.get_question(id).await? {
            Some(question)
                if question.organization_id == actor.organization_id
                    && (actor.is_admin() || question.created_by.as_deref() == Some(actor.user_id.as_str())) =>
            {
                Ok(question)
            }
            _ => Err(ServiceError::NotFound("question".to_string())),
        }
    }

    pub async fn update_question(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: UpdateQuestionRequest,
    ) -> ServiceResult<Question> {
        let mut question = self.editable_question(actor, id).await?;
        if patch.is_empty() {
            return Ok(question);
        }
        log_service_start!(SERVICE, "update_question", question_id = id);

        if let Some(kind) = patch.question_type {
            question.question_type = kind;
        }
        if let Some(content) = patch.content {
            question.content = object_content(content)?;
        }
        if let Some(source_type) = patch.source_type {
            question.source_type = source_type;
        }
        if let Some(parent_id) = patch.parent_id {
            question.parent_id = parent_id;
        }
        if let Some(order) = patch.order_in_parent {
            question.order_in_parent = order;
        }
        if let Some(label) = patch.label {
            question.label = label.filter(|label| !label.is_empty());
        }
        if let Some(subject_id) = patch.subject_id {
            question.subject_id = subject_id.filter(|s| !s.is_empty());
        }
        if let Some(year_level) = patch.year_level {
            question.year_level = year_level.filter(|s| !s.is_empty());
        }
        if let Some(component) = patch.subject_component {
            question.subject_component = component.filter(|s| !s.is_empty());
        }
        if let Some(codes) = patch.curriculum_codes {
            question.curriculum_codes = codes;
        }
        if let Some(is_public) = patch.is_public {
            question.is_public = is_public;
        }
        question.updated_at = Utc::now();

        self.db.update_question(&question).await?;
        log_service_success!(SERVICE, "update_question", question_id = id, "question updated");
        Ok(question)
    }

    /// Deletes the question and returns it as it was.
    pub async fn delete_question(&self, actor: &Actor, id: Uuid) -> ServiceResult<Question> {
        let question = self.editable_question(actor, id).await?;
        if !self.db.delete_question(id).await? {
            return Err(ServiceError::NotFound("question".to_string()));
        }
        log_service_success!(SERVICE, "delete_question", question_id = id, "question deleted");
        Ok(question)
    }

    /// The question in the id-based editor schema.
    pub async fn get_editor_question(&self, actor: &Actor, id: Uuid) -> ServiceResult<EditorQuestion> {
        let question = self.get_question(actor, id).await?;
        Ok(normalize_question(
            &question.id.to_string(),
            question.question_type,
            &question.content,
        ))
    }

    /// Stores an edited question back in label-based form. The editor may
    /// have changed the question type.
    pub async fn save_editor_question(&self, actor: &Actor, editor: EditorQuestion) -> ServiceResult<Question> {
        let id = Uuid::parse_str(&editor.id)
            .map_err(|_| ServiceError::Validation(format!("invalid question id '{}'", editor.id)))?;
        let mut question = self.editable_question(actor, id).await?;
        log_service_start!(SERVICE, "save_editor_question", question_id = id);

        let (kind, content) = denormalize_question(&editor);
        question.question_type = kind;
        question.content = content;
        question.updated_at = Utc::now();

        self.db.update_question(&question).await?;
        log_service_success!(SERVICE, "save_editor_question", question_id = id, "editor question saved");
        Ok(question)
    }

    // Artifact operations
    pub async fn create_artifact(&self, actor: &Actor, request: CreateArtifactRequest) -> ServiceResult<Artifact> {
        if request.artifact_type.trim().is_empty() {
            return Err(ServiceError::Validation("artifact_type is required".to_string()));
        }
        if request.artifact_name.trim().is_empty() {
            return Err(ServiceError::Validation("artifact_name is required".to_string()));
        }

        let artifact = Artifact {
            id: Uuid::new_v4(),
            organization_id: actor.organization_id.clone(),
            created_by: actor.user_id.clone(),
            artifact_type: request.artifact_type,
            artifact_name: request.artifact_name,
            content: object_content(request.content)?,
            created_at: Utc::now(),
        };
        self.db.insert_artifact(&artifact).await?;

        log_service_success!(SERVICE, "create_artifact", "artifact created");
        Ok(artifact)
    }

    pub async fn get_artifact(&self, actor: &Actor, id: Uuid) -> ServiceResult<Artifact> {
        match self.db.get_artifact(id).await? {
            Some(artifact) if artifact.organization_id == actor.organization_id => Ok(artifact),
            _ => Err(ServiceError::NotFound("artifact".to_string())),
        }
    }

    /// Questions of a quiz artifact in quiz order. Ids that no longer exist
    /// are skipped; a non-quiz artifact has no questions.
    pub async fn load_quiz_questions(&self, artifact: &Artifact) -> ServiceResult<Vec<Question>> {
        if !artifact.is_quiz() {
            log_service_warn!(SERVICE, "load_quiz_questions", format!("artifact {} is not a quiz", artifact.id));
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = quiz_question_ids(&artifact.content)
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect();
        let mut found = self.db.get_questions_by_ids(&artifact.organization_id, &ids).await?;

        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(position) = found.iter().position(|question| question.id == id) {
                ordered.push(found.swap_remove(position));
            }
        }
        Ok(ordered)
    }

    /// Quiz questions of an artifact of the caller's organization.
    pub async fn artifact_questions(&self, actor: &Actor, artifact_id: Uuid) -> ServiceResult<Vec<Question>> {
        let artifact = self.get_artifact(actor, artifact_id).await?;
        let questions = self.load_quiz_questions(&artifact).await?;
        Ok(questions.into_iter().map(|question| visible_to(actor, question)).collect())
    }
}
