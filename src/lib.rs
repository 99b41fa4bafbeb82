pub mod api;
pub mod assignment_service;
pub mod config;
pub mod conversion;
pub mod database;
pub mod errors;
pub mod grading;
pub mod json_values;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod question;
pub mod question_service;

pub use assignment_service::AssignmentService;
pub use config::Config;
pub use conversion::{convert_question_type, ConversionReport};
pub use database::Database;
pub use errors::*;
pub use grading::{apply_question_overrides, grade_editor_attempt, grade_question, grade_quiz_attempt, QuizGrading};
pub use models::*;
pub use normalizer::{denormalize_question, normalize_question, to_editor_content, without_answer_key};
pub use question::{AnswerKey, EditorQuestion, QuestionType};
pub use question_service::QuestionService;
