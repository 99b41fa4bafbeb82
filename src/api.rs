use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    assignment_service::AssignmentService,
    conversion::{convert_question_type, ConversionReport},
    errors::{ApiError, ErrorContext, ServiceError},
    grading::{grade_quiz_attempt, QuizGrading},
    models::*,
    normalizer::{denormalize_question, normalize_question},
    question::EditorQuestion,
    question_service::QuestionService,
};

// Import logging macros
use crate::{api_error, log_api_error, log_api_start, log_api_success, log_api_warn};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState {
    pub question_service: QuestionService,
    pub assignment_service: AssignmentService,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

fn service_failure(error: ServiceError, context: ErrorContext) -> ErrorResponse {
    if let ServiceError::Storage(cause) = &error {
        log_api_error!(context.operation.as_str(), error = cause, "storage failure");
    }
    ApiError::from(error).to_response_with_context(context)
}

/// The caller, read from the identity headers set by the gateway.
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Result<String, ErrorResponse> {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("missing or invalid {} header", name))
                        .to_response_with_context(ErrorContext::new("identify_caller", "actor"))
                })
        };

        let user_id = header(USER_ID_HEADER)?;
        let organization_id = header(ORGANIZATION_ID_HEADER)?;
        let role = header(USER_ROLE_HEADER)?.parse::<Role>().map_err(|message| {
            ApiError::BadRequest(message)
                .to_response_with_context(ErrorContext::new("identify_caller", "actor").with_id(&user_id))
        })?;

        Ok(Actor::new(user_id, organization_id, role))
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// Question bank endpoints
pub async fn list_questions(
    State(state): State<AppState>,
    actor: Actor,
    Query(filters): Query<QuestionFilters>,
) -> ApiResult<Vec<Question>> {
    log_api_start!("list_questions", user_id = actor.user_id);

    match state.question_service.list_questions(&actor, &filters).await {
        Ok(questions) => {
            log_api_success!("list_questions", count = questions.len(), "questions listed");
            Ok(Json(ApiResponse::success(questions)))
        }
        Err(e) => Err(service_failure(e, ErrorContext::new("list_questions", "question"))),
    }
}

pub async fn create_question(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateQuestionRequest>,
) -> ApiResult<Question> {
    log_api_start!("create_question", user_id = actor.user_id);

    match state.question_service.create_question(&actor, request).await {
        Ok(question) => {
            log_api_success!("create_question", question_id = question.id, "question created");
            Ok(Json(ApiResponse::success(question)))
        }
        Err(e) => Err(service_failure(e, ErrorContext::new("create_question", "question"))),
    }
}

pub async fn get_question(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Question> {
    log_api_start!("get_question", question_id = id);

    match state.question_service.get_question(&actor, id).await {
        Ok(question) => Ok(Json(ApiResponse::success(question))),
        Err(e) => {
            let context = ErrorContext::new("get_question", "question").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn update_question(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateQuestionRequest>,
) -> ApiResult<Question> {
    log_api_start!("update_question", question_id = id);

    match state.question_service.update_question(&actor, id, patch).await {
        Ok(question) => {
            log_api_success!("update_question", question_id = id, "question updated");
            Ok(Json(ApiResponse::success(question)))
        }
        Err(e) => {
            let context = ErrorContext::new("update_question", "question").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn delete_question(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Question> {
    log_api_start!("delete_question", question_id = id);

    match state.question_service.delete_question(&actor, id).await {
        Ok(question) => {
            log_api_success!("delete_question", question_id = id, "question deleted");
            Ok(Json(ApiResponse::success(question)))
        }
        Err(e) => {
            let context = ErrorContext::new("delete_question", "question").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn get_editor_question(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<EditorQuestion> {
    match state.question_service.get_editor_question(&actor, id).await {
        Ok(question) => Ok(Json(ApiResponse::success(question))),
        Err(e) => {
            let context = ErrorContext::new("get_editor_question", "question").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn save_editor_question(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(mut editor): Json<EditorQuestion>,
) -> ApiResult<Question> {
    log_api_start!("save_editor_question", question_id = id);

    if editor.id.is_empty() {
        editor.id = id.to_string();
    } else if editor.id != id.to_string() {
        log_api_warn!("save_editor_question", question_id = id, "body id does not match path");
        let message = format!("question id '{}' does not match the path", editor.id);
        return Err(api_error!(validation, "save_editor_question", "question", message));
    }

    match state.question_service.save_editor_question(&actor, editor).await {
        Ok(question) => {
            log_api_success!("save_editor_question", question_id = id, "editor question saved");
            Ok(Json(ApiResponse::success(question)))
        }
        Err(e) => {
            let context = ErrorContext::new("save_editor_question", "question").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

// Artifact endpoints
pub async fn create_artifact(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateArtifactRequest>,
) -> ApiResult<Artifact> {
    match state.question_service.create_artifact(&actor, request).await {
        Ok(artifact) => Ok(Json(ApiResponse::success(artifact))),
        Err(e) => Err(service_failure(e, ErrorContext::new("create_artifact", "artifact"))),
    }
}

pub async fn get_artifact(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Artifact> {
    match state.question_service.get_artifact(&actor, id).await {
        Ok(artifact) => Ok(Json(ApiResponse::success(artifact))),
        Err(e) => {
            let context = ErrorContext::new("get_artifact", "artifact").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn get_artifact_questions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Question>> {
    match state.question_service.artifact_questions(&actor, id).await {
        Ok(questions) => Ok(Json(ApiResponse::success(questions))),
        Err(e) => {
            let context = ErrorContext::new("get_artifact_questions", "artifact").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

// Assignment endpoints
pub async fn list_assignments(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<AssignmentListQuery>,
) -> ApiResult<Vec<Assignment>> {
    log_api_start!("list_assignments", user_id = actor.user_id);

    match state.assignment_service.list_assignments(&actor, &query).await {
        Ok(assignments) => {
            log_api_success!("list_assignments", count = assignments.len(), "assignments listed");
            Ok(Json(ApiResponse::success(assignments)))
        }
        Err(e) => Err(service_failure(e, ErrorContext::new("list_assignments", "assignment"))),
    }
}

pub async fn create_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateAssignmentRequest>,
) -> ApiResult<Assignment> {
    log_api_start!("create_assignment", user_id = actor.user_id);

    match state.assignment_service.create_assignment(&actor, request).await {
        Ok(assignment) => {
            log_api_success!("create_assignment", assignment_id = assignment.id, "assignment created");
            Ok(Json(ApiResponse::success(assignment)))
        }
        Err(e) => Err(service_failure(e, ErrorContext::new("create_assignment", "assignment"))),
    }
}

pub async fn get_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Assignment> {
    match state.assignment_service.get_assignment(&actor, id).await {
        Ok(assignment) => Ok(Json(ApiResponse::success(assignment))),
        Err(e) => {
            let context = ErrorContext::new("get_assignment", "assignment").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn delete_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_assignment", assignment_id = id);

    match state.assignment_service.delete_assignment(&actor, id).await {
        Ok(()) => {
            log_api_success!("delete_assignment", assignment_id = id, "assignment deleted");
            Ok(Json(ApiResponse::success(true)))
        }
        Err(e) => {
            let context = ErrorContext::new("delete_assignment", "assignment").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn update_assignment_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAssignmentStatusRequest>,
) -> ApiResult<Assignment> {
    log_api_start!("update_assignment_status", assignment_id = id);

    match state
        .assignment_service
        .update_assignment_status(&actor, id, request.status)
        .await
    {
        Ok(assignment) => {
            log_api_success!("update_assignment_status", assignment_id = id, "status updated");
            Ok(Json(ApiResponse::success(assignment)))
        }
        Err(e) => {
            let context = ErrorContext::new("update_assignment_status", "assignment").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn list_student_assignments(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<StudentAssignment>> {
    match state.assignment_service.list_student_assignments(&actor, id).await {
        Ok(rows) => {
            log_api_success!("list_student_assignments", count = rows.len(), "student rows listed");
            Ok(Json(ApiResponse::success(rows)))
        }
        Err(e) => {
            let context = ErrorContext::new("list_student_assignments", "assignment").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn my_assignments(State(state): State<AppState>, actor: Actor) -> ApiResult<Vec<MyAssignment>> {
    log_api_start!("my_assignments", user_id = actor.user_id);

    match state.assignment_service.my_assignments(&actor).await {
        Ok(rows) => Ok(Json(ApiResponse::success(rows))),
        Err(e) => Err(service_failure(e, ErrorContext::new("my_assignments", "student assignment"))),
    }
}

pub async fn update_student_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStudentAssignmentRequest>,
) -> ApiResult<StudentAssignment> {
    log_api_start!("update_student_assignment", student_assignment_id = id);

    match state
        .assignment_service
        .update_student_assignment(&actor, id, request)
        .await
    {
        Ok(row) => {
            log_api_success!("update_student_assignment", student_assignment_id = id, row.status.as_str());
            Ok(Json(ApiResponse::success(row)))
        }
        Err(e) => {
            if matches!(e, ServiceError::Conflict(_)) {
                log_api_warn!("update_student_assignment", student_assignment_id = id, e.to_string());
            }
            let context = ErrorContext::new("update_student_assignment", "student assignment").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

pub async fn grade_student_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<TeacherGradeRequest>,
) -> ApiResult<StudentAssignment> {
    log_api_start!("grade_student_assignment", student_assignment_id = id);

    match state.assignment_service.teacher_grade(&actor, id, request).await {
        Ok(row) => {
            log_api_success!("grade_student_assignment", student_assignment_id = id, "graded");
            Ok(Json(ApiResponse::success(row)))
        }
        Err(e) => {
            let context = ErrorContext::new("grade_student_assignment", "student assignment").with_id(&id.to_string());
            Err(service_failure(e, context))
        }
    }
}

// Editor endpoints. Pure transformations, no storage.
pub async fn normalize(Json(request): Json<NormalizeRequest>) -> ApiResult<EditorQuestion> {
    let question = normalize_question(&request.id, request.question_type, &request.content);
    Ok(Json(ApiResponse::success(question)))
}

pub async fn denormalize(Json(question): Json<EditorQuestion>) -> ApiResult<StoredContent> {
    let (question_type, content) = denormalize_question(&question);
    Ok(Json(ApiResponse::success(StoredContent { question_type, content })))
}

pub async fn convert(Json(request): Json<ConvertRequest>) -> ApiResult<ConversionReport> {
    let report = convert_question_type(&request.question, request.target_type);
    Ok(Json(ApiResponse::success(report)))
}

pub async fn grade(Json(request): Json<GradeRequest>) -> ApiResult<Option<QuizGrading>> {
    let grading = grade_quiz_attempt(&request.questions, &request.answers);
    Ok(Json(ApiResponse::success(grading)))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Question bank routes
        .route("/api/questions", get(list_questions).post(create_question))
        .route(
            "/api/questions/:id",
            get(get_question).patch(update_question).delete(delete_question),
        )
        .route(
            "/api/questions/:id/editor",
            get(get_editor_question).put(save_editor_question),
        )
        // Artifact routes
        .route("/api/artifacts", post(create_artifact))
        .route("/api/artifacts/:id", get(get_artifact))
        .route("/api/artifacts/:id/questions", get(get_artifact_questions))
        // Assignment routes
        .route("/api/assignments", get(list_assignments).post(create_assignment))
        .route("/api/assignments/:id", get(get_assignment).delete(delete_assignment))
        .route("/api/assignments/:id/status", patch(update_assignment_status))
        .route("/api/assignments/:id/students", get(list_student_assignments))
        // Student submission routes
        .route("/api/student-assignments/mine", get(my_assignments))
        .route("/api/student-assignments/:id", patch(update_student_assignment))
        .route("/api/student-assignments/:id/grade", patch(grade_student_assignment))
        // Editor routes
        .route("/api/quiz/normalize", post(normalize))
        .route("/api/quiz/denormalize", post(denormalize))
        .route("/api/quiz/convert", post(convert))
        .route("/api/quiz/grade", post(grade))
        .with_state(state)
}
