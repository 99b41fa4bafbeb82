use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use lusia_quiz::{api::*, AssignmentService, Database, QuestionService};
use serde_json::{json, Value};

const ORG: &str = "org-1";

async fn create_test_server() -> TestServer {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let question_service = QuestionService::new(db.clone());
    let assignment_service = AssignmentService::new(db, question_service.clone());
    let app_state = AppState {
        question_service,
        assignment_service,
    };

    let app = create_router(app_state);
    TestServer::new(app).unwrap()
}

fn header(name: &'static str, value: &str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from_str(value).unwrap())
}

fn as_user(request: TestRequest, user_id: &str, role: &str) -> TestRequest {
    let (user_name, user_value) = header(USER_ID_HEADER, user_id);
    let (org_name, org_value) = header(ORGANIZATION_ID_HEADER, ORG);
    let (role_name, role_value) = header(USER_ROLE_HEADER, role);
    request
        .add_header(user_name, user_value)
        .add_header(org_name, org_value)
        .add_header(role_name, role_value)
}

async fn create_mc_question(server: &TestServer) -> String {
    let response = as_user(server.post("/api/questions"), "t1", "teacher")
        .json(&json!({
            "type": "multiple_choice",
            "content": {
                "question": "Which is a prime number?",
                "options": [
                    {"label": "A", "text": "4"},
                    {"label": "B", "text": "7"},
                    {"label": "C", "text": "9"}
                ],
                "solution": "B"
            }
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let server = create_test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_identity_headers() {
    let server = create_test_server().await;
    let response = server.get("/api/questions").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);

    let (name, value) = header(USER_ROLE_HEADER, "guardian");
    let (user_name, user_value) = header(USER_ID_HEADER, "u1");
    let (org_name, org_value) = header(ORGANIZATION_ID_HEADER, ORG);
    let response = server
        .get("/api/questions")
        .add_header(user_name, user_value)
        .add_header(org_name, org_value)
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_students_cannot_create_questions() {
    let server = create_test_server().await;
    let response = as_user(server.post("/api/questions"), "s1", "student")
        .json(&json!({"type": "true_false", "content": {"question": "?", "solution": true}}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_question_crud() {
    let server = create_test_server().await;
    let id = create_mc_question(&server).await;

    let response = as_user(server.get(&format!("/api/questions/{}", id)), "t1", "teacher").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["type"], "multiple_choice");
    assert_eq!(body["data"]["source_type"], "teacher_uploaded");

    let response = as_user(server.get("/api/questions?type=multiple_choice"), "t1", "teacher").await;
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let response = as_user(server.get(&format!("/api/questions/{}", id)), "t2", "teacher").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = as_user(server.patch(&format!("/api/questions/{}", id)), "t1", "teacher")
        .json(&json!({"is_public": true, "label": "1."}))
        .await;
    response.assert_status_ok();

    let response = as_user(server.get(&format!("/api/questions/{}", id)), "t2", "teacher").await;
    response.assert_status_ok();

    let response = as_user(server.delete(&format!("/api/questions/{}", id)), "t1", "teacher").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["label"], "1.");

    let response = as_user(server.get(&format!("/api/questions/{}", id)), "t1", "teacher").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_editor_round_trip() {
    let server = create_test_server().await;
    let id = create_mc_question(&server).await;

    let response = as_user(server.get(&format!("/api/questions/{}/editor", id)), "t1", "teacher").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let mut editor = body["data"].clone();
    assert_eq!(editor["key"]["correct_answer"], format!("{}__opt_B", id));

    editor["key"]["correct_answer"] = json!(format!("{}__opt_C", id));
    let response = as_user(server.put(&format!("/api/questions/{}/editor", id)), "t1", "teacher")
        .json(&editor)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["content"]["solution"], "C");
}

#[tokio::test]
async fn test_pure_quiz_endpoints() {
    let server = create_test_server().await;

    let response = server
        .post("/api/quiz/normalize")
        .json(&json!({
            "id": "q1",
            "type": "true_false",
            "content": {"question": "Water boils at 100C at sea level.", "solution": true}
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let editor = body["data"].clone();
    assert_eq!(editor["key"]["correct_answer"], true);

    let response = server.post("/api/quiz/denormalize").json(&editor).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["type"], "true_false");
    assert_eq!(body["data"]["content"]["solution"], true);

    let response = server
        .post("/api/quiz/convert")
        .json(&json!({"question": editor, "target_type": "open_extended"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["answer_key_preserved"], false);

    let response = server
        .post("/api/quiz/grade")
        .json(&json!({
            "questions": [{"id": "q1", "type": "true_false", "content": {"solution": true}}],
            "answers": {"answers": {"q1": "true"}}
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["score"], 100.0);
    assert_eq!(body["data"]["correct_questions"], 1);
}

#[tokio::test]
async fn test_students_do_not_receive_answer_keys() {
    let server = create_test_server().await;
    let question_id = create_mc_question(&server).await;

    let response = as_user(server.post("/api/artifacts"), "t1", "teacher")
        .json(&json!({
            "artifact_type": "quiz",
            "artifact_name": "Primes",
            "content": {"question_ids": [question_id]}
        }))
        .await;
    let body: Value = response.json();
    let artifact_id = body["data"]["id"].as_str().unwrap().to_string();
    let path = format!("/api/artifacts/{}/questions", artifact_id);

    let response = as_user(server.get(&path), "s1", "student").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let content = &body["data"][0]["content"];
    assert_eq!(content["options"].as_array().unwrap().len(), 3);
    assert!(content.get("solution").is_none());

    let response = as_user(server.get(&path), "t1", "teacher").await;
    let body: Value = response.json();
    assert_eq!(body["data"][0]["content"]["solution"], "B");
}

#[tokio::test]
async fn test_assignment_flow() {
    let server = create_test_server().await;
    let question_id = create_mc_question(&server).await;

    let response = as_user(server.post("/api/artifacts"), "t1", "teacher")
        .json(&json!({
            "artifact_type": "quiz",
            "artifact_name": "Primes",
            "content": {"question_ids": [question_id]}
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let artifact_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = as_user(server.post("/api/assignments"), "t1", "teacher")
        .json(&json!({
            "title": "TPC primes",
            "artifact_id": artifact_id,
            "student_ids": ["s1"],
            "status": "published"
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let assignment_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["student_count"], 1);

    let response = as_user(server.get("/api/student-assignments/mine"), "s1", "student").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let row_id = body["data"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"][0]["assignment"]["id"], assignment_id.as_str());

    let response = as_user(server.patch(&format!("/api/student-assignments/{}", row_id)), "s1", "student")
        .json(&json!({
            "submission": {"answers": {question_id.clone(): format!("{}__opt_B", question_id)}},
            "status": "submitted"
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "graded");
    assert_eq!(body["data"]["grade"], 100.0);
    assert_eq!(body["data"]["submission"]["grading"]["total_questions"], 1);

    let response = as_user(server.patch(&format!("/api/student-assignments/{}", row_id)), "s1", "student")
        .json(&json!({"status": "in_progress"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let response = as_user(
        server.patch(&format!("/api/student-assignments/{}/grade", row_id)),
        "t1",
        "teacher",
    )
    .json(&json!({"question_overrides": {question_id.clone(): false}, "feedback": "Check 7 again"}))
    .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["grade"], 0.0);
    assert_eq!(body["data"]["auto_graded"], false);

    let response = as_user(server.get(&format!("/api/assignments/{}/students", assignment_id)), "s1", "student").await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = as_user(server.get(&format!("/api/assignments/{}", assignment_id)), "t1", "teacher").await;
    let body: Value = response.json();
    assert_eq!(body["data"]["submitted_count"], 1);

    let response = as_user(server.patch(&format!("/api/assignments/{}/status", assignment_id)), "t1", "teacher")
        .json(&json!({"status": "closed"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["data"]["grades_released_at"].is_string());

    let response = as_user(server.delete(&format!("/api/assignments/{}", assignment_id)), "t1", "teacher").await;
    response.assert_status_ok();
    let response = as_user(server.get(&format!("/api/assignments/{}", assignment_id)), "t1", "teacher").await;
    response.assert_status(StatusCode::NOT_FOUND);
}
