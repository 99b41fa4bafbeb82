//! Auto-grading of quiz attempts against the id-based answer key.
//!
//! Every function here is pure: grading the same attempt twice gives the same
//! result, and malformed answers grade as incorrect rather than failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::json_values::{first_truthy, is_nonempty_answer, non_empty_string, value_to_bool, value_to_string};
use crate::normalizer::{normalize_question, parse_pairs};
use crate::question::{AnswerKey, EditorQuestion, QuestionType};

static NO_ANSWER: Value = Value::Null;

/// A stored question as handed to the grader: id, type and raw content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradableQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub is_correct: bool,
    pub answered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_override: Option<bool>,
}

/// Summary embedded into a submission under `grading`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizGrading {
    pub score: f64,
    pub total_questions: usize,
    pub correct_questions: usize,
    pub answered_questions: usize,
    pub results: Vec<QuestionResult>,
}

/// Percentage rounded to two decimals, ties to even.
pub fn score_percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = correct as f64 / total as f64 * 100.0;
    (raw * 100.0).round_ties_even() / 100.0
}

/// The answers map of an attempt payload: `{answers: {...}}` yields the inner
/// map, any other object is taken as the answers map itself.
pub fn extract_answers(payload: &Value) -> Option<&Map<String, Value>> {
    let map = payload.as_object()?;
    match map.get("answers") {
        Some(Value::Object(answers)) => Some(answers),
        _ => Some(map),
    }
}

fn id_list(value: &Value, preserve_order: bool) -> Vec<String> {
    let value = match value {
        Value::Object(map) => first_truthy(map, &["value", "selected", "order"]).unwrap_or(&NO_ANSWER),
        other => other,
    };
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    let ids = items.iter().filter_map(non_empty_string);
    if preserve_order {
        ids.collect()
    } else {
        ids.collect::<BTreeSet<_>>().into_iter().collect()
    }
}

/// Grade one answer. `None` means the question cannot be graded: it has no
/// usable answer key or its type is never auto-graded.
pub fn grade_question(question: &EditorQuestion, answer: Option<&Value>) -> Option<bool> {
    let answer = answer.unwrap_or(&NO_ANSWER);
    let answer = match answer {
        Value::Object(map) if map.contains_key("value") => &map["value"],
        other => other,
    };

    match &question.key {
        AnswerKey::MultipleChoice { correct_answer, .. } => {
            let correct = correct_answer.as_deref().filter(|id| !id.is_empty())?;
            let selected = match answer {
                Value::Object(map) => first_truthy(map, &["selected_option_id", "option_id"])
                    .and_then(value_to_string),
                other => value_to_string(other),
            };
            Some(selected.as_deref() == Some(correct))
        }
        AnswerKey::TrueFalse { correct_answer } => {
            let correct = (*correct_answer)?;
            Some(value_to_bool(answer) == Some(correct))
        }
        AnswerKey::FillBlank { blanks, .. } => {
            let expected: Vec<(&str, &str)> = blanks
                .iter()
                .filter(|blank| !blank.id.is_empty() && !blank.correct_answer.is_empty())
                .map(|blank| (blank.id.as_str(), blank.correct_answer.as_str()))
                .collect();
            if expected.is_empty() {
                return None;
            }
            let selected = selected_blanks(answer);
            Some(
                expected
                    .iter()
                    .all(|(blank, correct)| selected.get(*blank).map(String::as_str) == Some(*correct)),
            )
        }
        AnswerKey::Matching { correct_pairs, .. } => {
            let correct: BTreeSet<(String, String)> = correct_pairs
                .iter()
                .filter(|(left, right)| !left.is_empty() && !right.is_empty())
                .cloned()
                .collect();
            if correct.is_empty() {
                return None;
            }
            let selected: BTreeSet<(String, String)> = parse_pairs(answer).into_iter().collect();
            Some(selected == correct)
        }
        AnswerKey::ShortAnswer {
            correct_answers,
            case_sensitive,
        } => {
            if correct_answers.is_empty() {
                return None;
            }
            let fold = |text: &str| {
                if *case_sensitive {
                    text.trim().to_string()
                } else {
                    text.trim().to_lowercase()
                }
            };
            let selected = match answer {
                Value::Object(map) => map.get("text").and_then(value_to_string),
                other => value_to_string(other),
            }
            .unwrap_or_default();
            let accepted: HashSet<String> = correct_answers
                .iter()
                .filter(|accepted| !accepted.trim().is_empty())
                .map(|accepted| fold(accepted))
                .collect();
            Some(accepted.contains(&fold(&selected)))
        }
        AnswerKey::MultipleResponse {
            correct_answers, ..
        } => {
            let correct: BTreeSet<&str> = correct_answers
                .iter()
                .map(String::as_str)
                .filter(|id| !id.is_empty())
                .collect();
            if correct.is_empty() {
                return None;
            }
            let selected = id_list(answer, false);
            Some(selected.iter().map(String::as_str).collect::<BTreeSet<_>>() == correct)
        }
        AnswerKey::Ordering { correct_order, .. } => {
            let correct: Vec<&str> = correct_order
                .iter()
                .map(String::as_str)
                .filter(|id| !id.is_empty())
                .collect();
            if correct.is_empty() {
                return None;
            }
            let selected = id_list(answer, true);
            Some(selected.iter().map(String::as_str).eq(correct.iter().copied()))
        }
        AnswerKey::OpenExtended {} | AnswerKey::ContextGroup {} => None,
    }
}

fn selected_blanks(answer: &Value) -> HashMap<String, String> {
    let source = match answer {
        Value::Object(map) => map.get("blanks").unwrap_or(answer),
        other => other,
    };

    let mut selected = HashMap::new();
    match source {
        Value::Array(items) => {
            for item in items.iter().filter_map(Value::as_object) {
                let blank = first_truthy(item, &["id", "blank_id"]).and_then(non_empty_string);
                let choice = first_truthy(item, &["selected_option_id", "answer", "value"])
                    .and_then(non_empty_string);
                if let (Some(blank), Some(choice)) = (blank, choice) {
                    selected.insert(blank, choice);
                }
            }
        }
        Value::Object(map) => {
            for (blank, choice) in map {
                if let Some(choice) = non_empty_string(choice).filter(|_| !blank.is_empty()) {
                    selected.insert(blank.clone(), choice);
                }
            }
        }
        _ => {}
    }
    selected
}

/// Grade an attempt over questions already in the editor schema.
///
/// Returns `None` when no question is gradable.
pub fn grade_editor_attempt(questions: &[EditorQuestion], payload: &Value) -> Option<QuizGrading> {
    let answers = extract_answers(payload);

    let mut total_questions = 0;
    let mut correct_questions = 0;
    let mut answered_questions = 0;
    let mut results = Vec::new();

    for question in questions.iter().filter(|q| !q.id.is_empty()) {
        let answer = answers.and_then(|answers| answers.get(&question.id));
        let answered = is_nonempty_answer(answer);
        if answered {
            answered_questions += 1;
        }

        let Some(is_correct) = grade_question(question, answer) else {
            continue;
        };

        total_questions += 1;
        if is_correct {
            correct_questions += 1;
        }
        results.push(QuestionResult {
            question_id: question.id.clone(),
            question_type: question.question_type(),
            is_correct,
            answered,
            teacher_override: None,
        });
    }

    if total_questions == 0 {
        debug!(question_count = questions.len(), "No gradable questions in attempt");
        return None;
    }

    let score = score_percentage(correct_questions, total_questions);
    debug!(
        score,
        total_questions, correct_questions, answered_questions, "Attempt graded"
    );
    Some(QuizGrading {
        score,
        total_questions,
        correct_questions,
        answered_questions,
        results,
    })
}

/// Normalize stored questions and grade the attempt against them.
pub fn grade_quiz_attempt(questions: &[GradableQuestion], payload: &Value) -> Option<QuizGrading> {
    let normalized: Vec<EditorQuestion> = questions
        .iter()
        .map(|q| normalize_question(&q.id, q.question_type, &q.content))
        .collect();
    grade_editor_attempt(&normalized, payload)
}

/// Apply a teacher's per-question verdicts and recompute the score over all
/// results.
pub fn apply_question_overrides(grading: &QuizGrading, overrides: &HashMap<String, bool>) -> QuizGrading {
    let mut results = grading.results.clone();
    for result in results.iter_mut() {
        if let Some(verdict) = overrides.get(&result.question_id) {
            result.is_correct = *verdict;
            result.teacher_override = Some(true);
        }
    }

    let correct_questions = results.iter().filter(|r| r.is_correct).count();
    QuizGrading {
        score: score_percentage(correct_questions, results.len()),
        total_questions: grading.total_questions,
        correct_questions,
        answered_questions: grading.answered_questions,
        results,
    }
}

/// Question ids referenced by a quiz artifact, in order, without duplicates.
pub fn quiz_question_ids(artifact_content: &Value) -> Vec<String> {
    let Some(content) = artifact_content.as_object() else {
        return Vec::new();
    };

    let mut ordered: Vec<String> = Vec::new();
    let mut push = |raw: Option<&Value>| {
        if let Some(id) = raw.and_then(non_empty_string) {
            if !ordered.contains(&id) {
                ordered.push(id);
            }
        }
    };

    for key in ["question_ids", "quiz_question_ids"] {
        if let Some(ids) = content.get(key).and_then(Value::as_array) {
            ids.iter().for_each(|id| push(Some(id)));
        }
    }

    if let Some(quiz) = content.get("quiz").and_then(Value::as_object) {
        if let Some(ids) = first_truthy(quiz, &["question_ids", "quiz_question_ids"]).and_then(Value::as_array) {
            ids.iter().for_each(|id| push(Some(id)));
        }
    }

    if let Some(inline) = content.get("questions").and_then(Value::as_array) {
        for entry in inline.iter().filter_map(Value::as_object) {
            push(first_truthy(entry, &["id", "question_id"]));
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{Blank, Choice, QuestionStem};
    use serde_json::json;

    fn editor(id: &str, key: AnswerKey) -> EditorQuestion {
        EditorQuestion {
            id: id.to_string(),
            stem: QuestionStem::default(),
            key,
        }
    }

    fn mc() -> EditorQuestion {
        normalize_question(
            "mc",
            QuestionType::MultipleChoice,
            &json!({"options": [{"label": "A", "text": "x"}, {"label": "B", "text": "y"}], "solution": "B"}),
        )
    }

    #[test]
    fn test_multiple_choice_answer_shapes() {
        let q = mc();
        assert_eq!(grade_question(&q, Some(&json!("mc__opt_B"))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!("mc__opt_A"))), Some(false));
        assert_eq!(grade_question(&q, Some(&json!({"value": "mc__opt_B"}))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!({"selected_option_id": "mc__opt_B"}))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!({"option_id": "mc__opt_B"}))), Some(true));
        assert_eq!(grade_question(&q, None), Some(false));
    }

    #[test]
    fn test_ungradable_keys_return_none() {
        let no_key = editor("q", AnswerKey::empty(QuestionType::MultipleChoice));
        assert_eq!(grade_question(&no_key, Some(&json!("x"))), None);
        let open = editor("q", AnswerKey::OpenExtended {});
        assert_eq!(grade_question(&open, Some(&json!("texto"))), None);
    }

    #[test]
    fn test_true_false_coercion() {
        let q = editor("tf", AnswerKey::TrueFalse { correct_answer: Some(true) });
        assert_eq!(grade_question(&q, Some(&json!(true))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!("yes"))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!("false"))), Some(false));
        assert_eq!(grade_question(&q, Some(&json!("talvez"))), Some(false));
    }

    #[test]
    fn test_fill_blank_answer_shapes() {
        let q = editor(
            "f",
            AnswerKey::FillBlank {
                options: vec![Choice::new("o1", None, "a"), Choice::new("o2", None, "b")],
                blanks: vec![
                    Blank { id: "b0".into(), correct_answer: "o1".into() },
                    Blank { id: "b1".into(), correct_answer: "o2".into() },
                ],
            },
        );
        assert_eq!(grade_question(&q, Some(&json!({"b0": "o1", "b1": "o2"}))), Some(true));
        assert_eq!(
            grade_question(&q, Some(&json!({"blanks": [{"blank_id": "b0", "answer": "o1"}, {"id": "b1", "selected_option_id": "o2"}]}))),
            Some(true)
        );
        assert_eq!(grade_question(&q, Some(&json!({"b0": "o1"}))), Some(false));
        assert_eq!(grade_question(&q, Some(&json!("o1"))), Some(false));
    }

    #[test]
    fn test_matching_ignores_pair_order() {
        let q = editor(
            "m",
            AnswerKey::Matching {
                left_items: vec![],
                right_items: vec![],
                correct_pairs: vec![("l1".into(), "r1".into()), ("l2".into(), "r2".into())],
            },
        );
        assert_eq!(grade_question(&q, Some(&json!([["l2", "r2"], ["l1", "r1"]]))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!({"l1": "r1", "l2": "r2"}))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!({"l1": "r2", "l2": "r1"}))), Some(false));
    }

    #[test]
    fn test_short_answer_case_handling() {
        let insensitive = editor(
            "s",
            AnswerKey::ShortAnswer { correct_answers: vec!["Lisboa".into()], case_sensitive: false },
        );
        assert_eq!(grade_question(&insensitive, Some(&json!("  lisboa "))), Some(true));
        assert_eq!(grade_question(&insensitive, Some(&json!({"text": "LISBOA"}))), Some(true));

        let sensitive = editor(
            "s",
            AnswerKey::ShortAnswer { correct_answers: vec!["H2O".into()], case_sensitive: true },
        );
        assert_eq!(grade_question(&sensitive, Some(&json!("h2o"))), Some(false));
        assert_eq!(grade_question(&sensitive, Some(&json!("H2O"))), Some(true));
    }

    #[test]
    fn test_multiple_response_is_a_set() {
        let q = editor(
            "r",
            AnswerKey::MultipleResponse { options: vec![], correct_answers: vec!["a".into(), "c".into()] },
        );
        assert_eq!(grade_question(&q, Some(&json!(["c", "a", "a"]))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!({"selected": ["a", "c"]}))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!(["a"]))), Some(false));
    }

    #[test]
    fn test_ordering_is_a_sequence() {
        let q = editor(
            "o",
            AnswerKey::Ordering { items: vec![], correct_order: vec!["c".into(), "a".into(), "b".into()] },
        );
        assert_eq!(grade_question(&q, Some(&json!(["c", "a", "b"]))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!({"order": ["c", "a", "b"]}))), Some(true));
        assert_eq!(grade_question(&q, Some(&json!(["a", "b", "c"]))), Some(false));
    }

    #[test]
    fn test_grade_quiz_attempt_summary() {
        let questions = vec![
            GradableQuestion {
                id: "q1".into(),
                question_type: QuestionType::MultipleChoice,
                content: json!({"options": [{"label": "A"}, {"label": "B"}], "solution": "A"}),
            },
            GradableQuestion {
                id: "q2".into(),
                question_type: QuestionType::TrueFalse,
                content: json!({"solution": true}),
            },
            GradableQuestion {
                id: "q3".into(),
                question_type: QuestionType::OpenExtended,
                content: json!({"question": "Explica"}),
            },
        ];
        let payload = json!({"answers": {"q1": "q1__opt_A", "q2": false, "q3": "resposta longa"}});
        let grading = grade_quiz_attempt(&questions, &payload).unwrap();
        assert_eq!(grading.total_questions, 2);
        assert_eq!(grading.correct_questions, 1);
        assert_eq!(grading.answered_questions, 3);
        assert_eq!(grading.score, 50.0);
        assert_eq!(grading.results.len(), 2);

        let again = grade_quiz_attempt(&questions, &payload).unwrap();
        assert_eq!(again, grading);
    }

    #[test]
    fn test_attempt_without_gradable_questions() {
        let questions = vec![GradableQuestion {
            id: "q".into(),
            question_type: QuestionType::ContextGroup,
            content: json!({}),
        }];
        assert!(grade_quiz_attempt(&questions, &json!({"q": "x"})).is_none());
        assert!(grade_quiz_attempt(&[], &json!({})).is_none());
    }

    #[test]
    fn test_score_rounding() {
        assert_eq!(score_percentage(1, 3), 33.33);
        assert_eq!(score_percentage(2, 3), 66.67);
        assert_eq!(score_percentage(0, 0), 0.0);
    }

    #[test]
    fn test_score_rounding_ties_to_even() {
        assert_eq!(score_percentage(1, 32), 3.12);
        assert_eq!(score_percentage(3, 32), 9.38);
    }

    #[test]
    fn test_overrides_recompute_score() {
        let grading = QuizGrading {
            score: 50.0,
            total_questions: 2,
            correct_questions: 1,
            answered_questions: 2,
            results: vec![
                QuestionResult { question_id: "a".into(), question_type: QuestionType::ShortAnswer, is_correct: true, answered: true, teacher_override: None },
                QuestionResult { question_id: "b".into(), question_type: QuestionType::ShortAnswer, is_correct: false, answered: true, teacher_override: None },
            ],
        };
        let overrides = HashMap::from([("b".to_string(), true)]);
        let updated = apply_question_overrides(&grading, &overrides);
        assert_eq!(updated.score, 100.0);
        assert_eq!(updated.correct_questions, 2);
        assert_eq!(updated.results[1].teacher_override, Some(true));
        assert_eq!(updated.results[0].teacher_override, None);
    }

    #[test]
    fn test_quiz_question_ids_sources() {
        let content = json!({
            "question_ids": ["a", "b"],
            "quiz_question_ids": ["b", "c"],
            "quiz": {"question_ids": ["d"]},
            "questions": [{"id": "e"}, {"question_id": "a"}, "junk"],
        });
        assert_eq!(quiz_question_ids(&content), vec!["a", "b", "c", "d", "e"]);
        assert!(quiz_question_ids(&json!(null)).is_empty());
    }
}
