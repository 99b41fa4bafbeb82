use axum::http::StatusCode;
use lusia_quiz::{
    grade_quiz_attempt, normalize_question, Actor, ApiError, AssignmentService, CreateQuestionRequest, Database,
    QuestionService, QuestionType, Role, ServiceError, TeacherGradeRequest, UpdateQuestionRequest,
    UpdateStudentAssignmentRequest,
};
use lusia_quiz::grading::GradableQuestion;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn test_database_connection_failure() {
    let result = Database::new("invalid://url").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let questions = QuestionService::new(db.clone());
    let assignments = AssignmentService::new(db, questions.clone());
    let teacher = Actor::new("t1", "org-1", Role::Teacher);
    let missing = Uuid::new_v4();

    assert!(matches!(
        questions.get_question(&teacher, missing).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        questions
            .update_question(&teacher, missing, UpdateQuestionRequest::default())
            .await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        assignments.get_assignment(&teacher, missing).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        assignments
            .teacher_grade(&teacher, missing, TeacherGradeRequest::default())
            .await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        assignments
            .update_student_assignment(&teacher, missing, UpdateStudentAssignmentRequest::default())
            .await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cross_organization_access_is_hidden() {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let questions = QuestionService::new(db);
    let owner = Actor::new("admin-1", "org-1", Role::Admin);
    let outsider = Actor::new("admin-2", "org-2", Role::Admin);

    let request: CreateQuestionRequest = serde_json::from_value(json!({
        "type": "short_answer",
        "content": {"question": "Capital of France?", "solution": "Paris"},
        "is_public": true
    }))
    .unwrap();
    let question = questions.create_question(&owner, request).await.unwrap();

    assert!(matches!(
        questions.get_question(&outsider, question.id).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        questions.delete_question(&outsider, question.id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn test_service_errors_map_to_status_codes() {
    let cases = vec![
        (ServiceError::NotFound("question".to_string()), StatusCode::NOT_FOUND),
        (ServiceError::Forbidden("no".to_string()), StatusCode::FORBIDDEN),
        (ServiceError::Conflict("reverted".to_string()), StatusCode::CONFLICT),
        (ServiceError::Validation("bad".to_string()), StatusCode::BAD_REQUEST),
        (
            ServiceError::Storage(anyhow::anyhow!("disk I/O error")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, expected) in cases {
        let (status, _) = ApiError::from(error).to_response();
        assert_eq!(status, expected);
    }
}

#[test]
fn test_malformed_content_never_panics() {
    let shapes: Vec<Value> = vec![
        Value::Null,
        json!(42),
        json!("just text"),
        json!([1, 2, 3]),
        json!({"options": "not a list", "solution": {"weird": true}}),
        json!({"options": [null, 7, {"label": 3}], "solution": [null]}),
        json!({"blanks": [{"id": null}], "left_items": {"a": 1}, "correct_pairs": "x"}),
    ];

    for kind in QuestionType::ALL {
        for content in &shapes {
            let editor = normalize_question("q1", kind, content);
            assert_eq!(editor.question_type(), kind);

            let questions = vec![GradableQuestion {
                id: "q1".to_string(),
                question_type: kind,
                content: content.clone(),
            }];
            for attempt in [Value::Null, json!({"answers": {"q1": {"value": [1, null]}}}), json!("x")] {
                let _ = grade_quiz_attempt(&questions, &attempt);
            }
        }
    }
}
