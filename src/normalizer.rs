//! Conversion between the label-based content stored by the backend and the
//! id-based schema the quiz editor and grader work with.
//!
//! Label-based content keys options by letter/number labels and stores the
//! answer as `solution`. The editor schema gives every option a stable id
//! (see [`deterministic_id`]) and stores the answer as `correct_*` fields
//! that reference those ids.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::json_values::{
    first_truthy, is_truthy, non_empty_string, truthy_field, value_to_bool, value_to_string,
};
use crate::question::{
    assign_missing_labels, deterministic_id, letter_label, number_label, AnswerKey, Blank,
    Choice, EditorQuestion, QuestionStem, QuestionType,
};

static NUMERIC_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("numeric label pattern"));

const TRUE_FALSE_OPTIONS: [(&str, &str); 2] = [("V", "Verdadeiro"), ("F", "Falso")];

/// Normalize stored content into the editor schema.
///
/// Accepts label-based content, id-based content, or a mix of both. Ids and
/// `correct_*` fields already present are kept, which makes the operation
/// idempotent over [`to_editor_content`].
pub fn normalize_question(question_id: &str, kind: QuestionType, content: &Value) -> EditorQuestion {
    let empty = Map::new();
    let content = content.as_object().unwrap_or(&empty);

    let key = match kind {
        QuestionType::MultipleChoice => normalize_multiple_choice(question_id, content),
        QuestionType::MultipleResponse => normalize_multiple_response(question_id, content),
        QuestionType::Ordering => normalize_ordering(question_id, content),
        QuestionType::Matching => normalize_matching(question_id, content),
        QuestionType::FillBlank => normalize_fill_blank(question_id, content),
        QuestionType::TrueFalse => normalize_true_false(content),
        QuestionType::ShortAnswer => normalize_short_answer(content),
        QuestionType::OpenExtended => AnswerKey::OpenExtended {},
        QuestionType::ContextGroup => AnswerKey::ContextGroup {},
    };

    EditorQuestion {
        id: question_id.to_string(),
        stem: parse_stem(content),
        key,
    }
}

fn parse_stem(content: &Map<String, Value>) -> QuestionStem {
    QuestionStem {
        question: content
            .get("question")
            .and_then(value_to_string)
            .unwrap_or_default(),
        image_url: content.get("image_url").and_then(non_empty_string),
        criteria: content.get("criteria").and_then(non_empty_string),
        original_grade: content.get("original_grade").and_then(non_empty_string),
        ai_generated_fields: content
            .get("ai_generated_fields")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(non_empty_string).collect())
            .unwrap_or_default(),
    }
}

fn parse_choice(entry: &Value, question_id: &str, namespace: &str, index: usize) -> Choice {
    match entry {
        Value::Object(map) => {
            let label = map.get("label").and_then(non_empty_string);
            let id = map
                .get("id")
                .and_then(non_empty_string)
                .unwrap_or_else(|| match &label {
                    Some(label) => deterministic_id(question_id, namespace, label),
                    None => deterministic_id(question_id, namespace, index),
                });
            Choice {
                id,
                label,
                text: map.get("text").and_then(value_to_string).unwrap_or_default(),
                image_url: map.get("image_url").and_then(non_empty_string),
            }
        }
        other => Choice {
            id: deterministic_id(question_id, namespace, index),
            label: None,
            text: value_to_string(other).unwrap_or_default(),
            image_url: None,
        },
    }
}

fn parse_choices(raw: &[Value], question_id: &str, namespace: &str) -> Vec<Choice> {
    raw.iter()
        .enumerate()
        .map(|(index, entry)| parse_choice(entry, question_id, namespace, index))
        .collect()
}

fn as_list(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(non_empty_string).collect())
        .unwrap_or_default()
}

fn solution_labels(content: &Map<String, Value>) -> Option<Vec<String>> {
    content
        .get("solution")
        .and_then(Value::as_array)
        .map(|labels| labels.iter().filter_map(value_to_string).collect())
}

fn id_for_label(choices: &[Choice], label: &str) -> Option<String> {
    choices
        .iter()
        .find(|choice| choice.label.as_deref().unwrap_or("") == label)
        .map(|choice| choice.id.clone())
}

fn normalize_multiple_choice(question_id: &str, content: &Map<String, Value>) -> AnswerKey {
    let options = parse_choices(as_list(content.get("options")), question_id, "opt");
    let correct_answer = truthy_field(content, "correct_answer")
        .and_then(non_empty_string)
        .or_else(|| {
            content
                .get("solution")
                .and_then(value_to_string)
                .and_then(|label| id_for_label(&options, &label))
        });
    AnswerKey::MultipleChoice {
        options,
        correct_answer,
    }
}

fn normalize_multiple_response(question_id: &str, content: &Map<String, Value>) -> AnswerKey {
    let options = parse_choices(as_list(content.get("options")), question_id, "opt");
    let correct_answers = match truthy_field(content, "correct_answers") {
        Some(existing) => string_list(existing),
        None => solution_labels(content)
            .map(|labels| {
                options
                    .iter()
                    .filter(|option| {
                        labels
                            .iter()
                            .any(|l| option.label.as_deref().unwrap_or("") == l.as_str())
                    })
                    .map(|option| option.id.clone())
                    .collect()
            })
            .unwrap_or_default(),
    };
    AnswerKey::MultipleResponse {
        options,
        correct_answers,
    }
}

fn normalize_ordering(question_id: &str, content: &Map<String, Value>) -> AnswerKey {
    let raw_items = first_truthy(content, &["items", "options"]);
    let items = parse_choices(as_list(raw_items), question_id, "item");
    let correct_order = match truthy_field(content, "correct_order") {
        Some(existing) => string_list(existing),
        None => solution_labels(content)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|label| id_for_label(&items, label))
                    .collect()
            })
            .unwrap_or_default(),
    };
    AnswerKey::Ordering {
        items,
        correct_order,
    }
}

/// Pairs from any of the shapes the editor or a student may send:
/// `{pairs: ...}`, `{left_id: right_id}`, `[[left, right]]` or
/// `[{left_id|left, right_id|right}]`. Order is kept, duplicates dropped.
pub fn parse_pairs(value: &Value) -> Vec<(String, String)> {
    let value = match value {
        Value::Object(map) => map.get("pairs").unwrap_or(value),
        other => other,
    };

    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut push = |left: Option<String>, right: Option<String>| {
        if let (Some(left), Some(right)) = (left, right) {
            let pair = (left, right);
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
    };

    match value {
        Value::Object(map) => {
            for (left, right) in map {
                push(Some(left.clone()).filter(|l| !l.is_empty()), non_empty_string(right));
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                match entry {
                    Value::Array(pair) if pair.len() == 2 => {
                        push(non_empty_string(&pair[0]), non_empty_string(&pair[1]));
                    }
                    Value::Object(pair) => {
                        push(
                            first_truthy(pair, &["left_id", "left"]).and_then(non_empty_string),
                            first_truthy(pair, &["right_id", "right"]).and_then(non_empty_string),
                        );
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    pairs
}

fn normalize_matching(question_id: &str, content: &Map<String, Value>) -> AnswerKey {
    let mut raw_left: Vec<Value> = as_list(content.get("left_items")).to_vec();
    let mut raw_right: Vec<Value> = as_list(content.get("right_items")).to_vec();

    if raw_left.is_empty() && raw_right.is_empty() {
        for option in as_list(content.get("options")) {
            let label = option
                .get("label")
                .and_then(value_to_string)
                .unwrap_or_default();
            if NUMERIC_LABEL.is_match(&label) {
                raw_right.push(option.clone());
            } else {
                raw_left.push(option.clone());
            }
        }
    }

    let left_items = parse_choices(&raw_left, question_id, "left");
    let right_items = parse_choices(&raw_right, question_id, "right");

    let correct_pairs = match truthy_field(content, "correct_pairs") {
        Some(existing) => parse_pairs(existing),
        None => as_list(content.get("solution"))
            .iter()
            .filter_map(|entry| {
                let (left_label, right_label) = match entry {
                    Value::Object(pair) => (
                        pair.get("left").and_then(value_to_string).unwrap_or_default(),
                        pair.get("right").and_then(value_to_string).unwrap_or_default(),
                    ),
                    Value::Array(pair) if pair.len() == 2 => (
                        value_to_string(&pair[0]).unwrap_or_default(),
                        value_to_string(&pair[1]).unwrap_or_default(),
                    ),
                    _ => return None,
                };
                let left = id_for_label(&left_items, &left_label)?;
                let right = id_for_label(&right_items, &right_label)?;
                Some((left, right))
            })
            .collect(),
    };

    AnswerKey::Matching {
        left_items,
        right_items,
        correct_pairs,
    }
}

fn fill_blank_answer_text(entry: &Value) -> String {
    match entry {
        Value::Object(map) => map.get("answer").and_then(value_to_string).unwrap_or_default(),
        other => value_to_string(other).unwrap_or_default(),
    }
}

fn normalize_fill_blank(question_id: &str, content: &Map<String, Value>) -> AnswerKey {
    let solution = as_list(truthy_field(content, "solution"));
    let raw_options = as_list(truthy_field(content, "options"));
    let raw_blanks = as_list(content.get("blanks"));

    let already_flat = raw_options
        .first()
        .and_then(Value::as_object)
        .is_some_and(|first| first.get("id").is_some_and(is_truthy));
    let blanks_only = raw_options.is_empty() && solution.is_empty() && !raw_blanks.is_empty();

    if already_flat || blanks_only {
        let options = raw_options
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut choice = parse_choice(entry, question_id, "fopt", index);
                let has_id = entry.get("id").and_then(non_empty_string).is_some();
                if !has_id {
                    let discriminator = if !choice.text.is_empty() {
                        choice.text.clone()
                    } else {
                        choice.label.clone().unwrap_or_else(|| index.to_string())
                    };
                    choice.id = deterministic_id(question_id, "fopt", discriminator);
                }
                choice
            })
            .collect();
        let blanks = raw_blanks
            .iter()
            .enumerate()
            .map(|(index, blank)| Blank {
                id: blank
                    .get("id")
                    .and_then(non_empty_string)
                    .unwrap_or_else(|| deterministic_id(question_id, "blank", index)),
                correct_answer: blank
                    .get("correct_answer")
                    .and_then(value_to_string)
                    .unwrap_or_default(),
            })
            .collect();
        return AnswerKey::FillBlank { options, blanks };
    }

    let mut by_text: HashMap<String, String> = HashMap::new();
    let mut options: Vec<Choice> = Vec::new();
    let mut add_option = |text: String| {
        if text.is_empty() || by_text.contains_key(&text) {
            return;
        }
        let id = deterministic_id(question_id, "fopt", &text);
        by_text.insert(text.clone(), id.clone());
        options.push(Choice::new(id, None, text));
    };

    for entry in solution {
        add_option(fill_blank_answer_text(entry));
    }
    for per_blank in raw_options {
        match per_blank {
            Value::Array(texts) => {
                for text in texts {
                    add_option(value_to_string(text).unwrap_or_default());
                }
            }
            Value::Object(option) => {
                add_option(option.get("text").and_then(value_to_string).unwrap_or_default());
            }
            scalar => add_option(value_to_string(scalar).unwrap_or_default()),
        }
    }

    let blanks = solution
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let text = fill_blank_answer_text(entry);
            Blank {
                id: deterministic_id(question_id, "blank", index),
                correct_answer: by_text.get(&text).cloned().unwrap_or_default(),
            }
        })
        .collect();

    AnswerKey::FillBlank { options, blanks }
}

fn normalize_true_false(content: &Map<String, Value>) -> AnswerKey {
    let correct_answer = match content.get("correct_answer") {
        Some(explicit) if !explicit.is_null() => value_to_bool(explicit),
        _ => content.get("solution").filter(|s| !s.is_null()).map(|solution| {
            matches!(solution, Value::Bool(true))
                || matches!(solution.as_str(), Some("true") | Some("V"))
        }),
    };
    AnswerKey::TrueFalse { correct_answer }
}

fn normalize_short_answer(content: &Map<String, Value>) -> AnswerKey {
    let accepted = |value: &Value| value_to_string(value).filter(|s| !s.trim().is_empty());
    let correct_answers = match truthy_field(content, "correct_answers") {
        Some(existing) => existing
            .as_array()
            .map(|answers| answers.iter().filter_map(accepted).collect())
            .unwrap_or_default(),
        None => match content.get("solution") {
            Some(Value::Array(answers)) => answers.iter().filter_map(accepted).collect(),
            Some(solution) => accepted(solution).into_iter().collect(),
            None => Vec::new(),
        },
    };
    AnswerKey::ShortAnswer {
        correct_answers,
        case_sensitive: content.get("case_sensitive").is_some_and(is_truthy),
    }
}

fn stem_fields(stem: &QuestionStem) -> Map<String, Value> {
    let stem = stem.cleaned();
    let mut content = Map::new();
    content.insert("question".into(), json!(stem.question));
    content.insert("image_url".into(), json!(stem.image_url));
    if let Some(criteria) = &stem.criteria {
        content.insert("criteria".into(), json!(criteria));
    }
    if let Some(grade) = &stem.original_grade {
        content.insert("original_grade".into(), json!(grade));
    }
    if !stem.ai_generated_fields.is_empty() {
        content.insert("ai_generated_fields".into(), json!(stem.ai_generated_fields));
    }
    content
}

fn choice_with_id(choice: &Choice) -> Value {
    let mut entry = Map::new();
    entry.insert("id".into(), json!(choice.id));
    if let Some(label) = &choice.label {
        entry.insert("label".into(), json!(label));
    }
    entry.insert("text".into(), json!(choice.text));
    entry.insert("image_url".into(), json!(choice.image_url));
    Value::Object(entry)
}

fn choice_with_label(choice: &Choice) -> Value {
    json!({
        "label": choice.label,
        "text": choice.text,
        "image_url": choice.image_url,
    })
}

fn choices_with_ids(choices: &[Choice]) -> Value {
    Value::Array(choices.iter().map(choice_with_id).collect())
}

/// Id-based content as the editor stores it.
pub fn to_editor_content(question: &EditorQuestion) -> Value {
    let mut content = stem_fields(&question.stem);
    match &question.key {
        AnswerKey::MultipleChoice {
            options,
            correct_answer,
        } => {
            content.insert("options".into(), choices_with_ids(options));
            content.insert("correct_answer".into(), json!(correct_answer));
        }
        AnswerKey::MultipleResponse {
            options,
            correct_answers,
        } => {
            content.insert("options".into(), choices_with_ids(options));
            content.insert("correct_answers".into(), json!(correct_answers));
        }
        AnswerKey::TrueFalse { correct_answer } => {
            content.insert("correct_answer".into(), json!(correct_answer));
        }
        AnswerKey::FillBlank { options, blanks } => {
            content.insert("options".into(), choices_with_ids(options));
            content.insert(
                "blanks".into(),
                Value::Array(
                    blanks
                        .iter()
                        .map(|b| json!({"id": b.id, "correct_answer": b.correct_answer}))
                        .collect(),
                ),
            );
        }
        AnswerKey::Matching {
            left_items,
            right_items,
            correct_pairs,
        } => {
            content.insert("left_items".into(), choices_with_ids(left_items));
            content.insert("right_items".into(), choices_with_ids(right_items));
            content.insert("correct_pairs".into(), json!(correct_pairs));
        }
        AnswerKey::ShortAnswer {
            correct_answers,
            case_sensitive,
        } => {
            content.insert("correct_answers".into(), json!(correct_answers));
            content.insert("case_sensitive".into(), json!(case_sensitive));
        }
        AnswerKey::Ordering {
            items,
            correct_order,
        } => {
            content.insert("items".into(), choices_with_ids(items));
            content.insert("correct_order".into(), json!(correct_order));
        }
        AnswerKey::OpenExtended {} | AnswerKey::ContextGroup {} => {}
    }
    Value::Object(content)
}

fn labeled(choices: &[Choice], make_label: fn(usize) -> String) -> Vec<Choice> {
    let mut choices = choices.to_vec();
    assign_missing_labels(&mut choices, make_label);
    choices
}

fn label_of(choices: &[Choice], id: &str) -> Option<String> {
    choices
        .iter()
        .find(|choice| choice.id == id)
        .and_then(|choice| choice.label.clone())
}

/// Label-based content for storage.
///
/// Ids are not written: on the next [`normalize_question`] they are derived
/// again from the labels (and, for fill-blank options, from the text).
/// Options without a label get the next free one.
pub fn denormalize_question(question: &EditorQuestion) -> (QuestionType, Value) {
    let mut content = stem_fields(&question.stem);
    let kind = question.question_type();

    match &question.key {
        AnswerKey::MultipleChoice {
            options,
            correct_answer,
        } => {
            let options = labeled(options, letter_label);
            let solution = correct_answer.as_deref().and_then(|id| label_of(&options, id));
            content.insert(
                "options".into(),
                Value::Array(options.iter().map(choice_with_label).collect()),
            );
            content.insert("solution".into(), json!(solution));
        }
        AnswerKey::MultipleResponse {
            options,
            correct_answers,
        } => {
            let options = labeled(options, letter_label);
            let solution: Vec<String> = options
                .iter()
                .filter(|option| correct_answers.contains(&option.id))
                .filter_map(|option| option.label.clone())
                .collect();
            content.insert(
                "options".into(),
                Value::Array(options.iter().map(choice_with_label).collect()),
            );
            content.insert("solution".into(), json!(solution));
        }
        AnswerKey::Ordering {
            items,
            correct_order,
        } => {
            let items = labeled(items, letter_label);
            let solution: Vec<String> = correct_order
                .iter()
                .filter_map(|id| label_of(&items, id))
                .collect();
            content.insert(
                "options".into(),
                Value::Array(items.iter().map(choice_with_label).collect()),
            );
            content.insert("solution".into(), json!(solution));
        }
        AnswerKey::Matching {
            left_items,
            right_items,
            correct_pairs,
        } => {
            let left_items = labeled(left_items, letter_label);
            let right_items = labeled(right_items, number_label);
            let solution: Vec<Value> = correct_pairs
                .iter()
                .filter_map(|(left, right)| {
                    let left = label_of(&left_items, left)?;
                    let right = label_of(&right_items, right)?;
                    Some(json!({"left": left, "right": right}))
                })
                .collect();
            content.insert(
                "left_items".into(),
                Value::Array(left_items.iter().map(choice_with_label).collect()),
            );
            content.insert(
                "right_items".into(),
                Value::Array(right_items.iter().map(choice_with_label).collect()),
            );
            content.insert("solution".into(), Value::Array(solution));
        }
        AnswerKey::FillBlank { options, blanks } => {
            let texts: Vec<String> = options.iter().map(|option| option.text.clone()).collect();
            let solution: Vec<Value> = blanks
                .iter()
                .map(|blank| {
                    let answer = options
                        .iter()
                        .find(|option| option.id == blank.correct_answer)
                        .map(|option| option.text.clone())
                        .unwrap_or_default();
                    json!({"answer": answer, "image_url": null})
                })
                .collect();
            let per_blank: Vec<Value> = if blanks.is_empty() && !texts.is_empty() {
                vec![json!(texts)]
            } else {
                blanks.iter().map(|_| json!(texts)).collect()
            };
            content.insert("options".into(), Value::Array(per_blank));
            content.insert("solution".into(), Value::Array(solution));
        }
        AnswerKey::TrueFalse { correct_answer } => {
            content.insert(
                "options".into(),
                Value::Array(
                    TRUE_FALSE_OPTIONS
                        .iter()
                        .map(|(label, text)| json!({"label": label, "text": text}))
                        .collect(),
                ),
            );
            content.insert("solution".into(), json!(correct_answer));
        }
        AnswerKey::ShortAnswer {
            correct_answers,
            case_sensitive,
        } => {
            let solution = match correct_answers.as_slice() {
                [] => Value::Null,
                [single] => json!(single),
                many => json!(many),
            };
            content.insert("solution".into(), solution);
            if *case_sensitive {
                content.insert("case_sensitive".into(), json!(true));
            }
        }
        AnswerKey::OpenExtended {} | AnswerKey::ContextGroup {} => {
            content.insert("options".into(), json!([]));
            content.insert("solution".into(), Value::Null);
        }
    }

    (kind, Value::Object(content))
}

const ANSWER_FIELDS: [&str; 5] = [
    "solution",
    "correct_answer",
    "correct_answers",
    "correct_order",
    "correct_pairs",
];

/// Stored or editor content with the answer key removed, for students
/// taking the quiz. Blanks keep their ids so answers can still be keyed.
pub fn without_answer_key(content: &Value) -> Value {
    let Some(map) = content.as_object() else {
        return content.clone();
    };
    let mut map = map.clone();
    for field in ANSWER_FIELDS {
        map.remove(field);
    }
    if let Some(Value::Array(blanks)) = map.get_mut("blanks") {
        for blank in blanks.iter_mut() {
            if let Value::Object(blank) = blank {
                blank.remove("correct_answer");
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renormalize(question: &EditorQuestion) -> EditorQuestion {
        normalize_question(&question.id, question.question_type(), &to_editor_content(question))
    }

    fn round_trip_labels(question: &EditorQuestion) -> EditorQuestion {
        let (kind, content) = denormalize_question(question);
        normalize_question(&question.id, kind, &content)
    }

    #[test]
    fn test_multiple_choice_from_labels() {
        let content = json!({
            "question": "Qual é o maior planeta?",
            "options": [
                {"label": "A", "text": "Marte"},
                {"label": "B", "text": "Júpiter"},
            ],
            "solution": "B",
        });
        let question = normalize_question("q1", QuestionType::MultipleChoice, &content);
        assert_eq!(question.stem.question, "Qual é o maior planeta?");
        match &question.key {
            AnswerKey::MultipleChoice {
                options,
                correct_answer,
            } => {
                assert_eq!(options[0].id, "q1__opt_A");
                assert_eq!(options[1].id, "q1__opt_B");
                assert_eq!(correct_answer.as_deref(), Some("q1__opt_B"));
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_existing_ids_and_answers_are_kept() {
        let content = json!({
            "options": [{"id": "custom", "label": "A", "text": "x"}],
            "correct_answer": "custom",
            "solution": "A",
        });
        let question = normalize_question("q1", QuestionType::MultipleChoice, &content);
        assert_eq!(
            question.key,
            AnswerKey::MultipleChoice {
                options: vec![Choice::new("custom", Some("A".into()), "x")],
                correct_answer: Some("custom".into()),
            }
        );
    }

    #[test]
    fn test_unlabeled_options_use_index() {
        let content = json!({"options": ["um", "dois"], "solution": ["B"]});
        let question = normalize_question("q", QuestionType::MultipleResponse, &content);
        match question.key {
            AnswerKey::MultipleResponse {
                options,
                correct_answers,
            } => {
                assert_eq!(options[1].id, "q__opt_1");
                assert_eq!(options[1].text, "dois");
                assert!(correct_answers.is_empty());
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_ordering_drops_unknown_labels() {
        let content = json!({
            "options": [{"label": "A", "text": "1"}, {"label": "B", "text": "2"}, {"label": "C", "text": "3"}],
            "solution": ["C", "Z", "A", "B"],
        });
        let question = normalize_question("o", QuestionType::Ordering, &content);
        match question.key {
            AnswerKey::Ordering { correct_order, .. } => {
                assert_eq!(correct_order, vec!["o__item_C", "o__item_A", "o__item_B"]);
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_matching_splits_numeric_labels() {
        let content = json!({
            "options": [
                {"label": "A", "text": "Lisboa"},
                {"label": "B", "text": "Madrid"},
                {"label": "1", "text": "Espanha"},
                {"label": "2", "text": "Portugal"},
            ],
            "solution": [{"left": "A", "right": "2"}, ["B", "1"], {"left": "C", "right": "1"}],
        });
        let question = normalize_question("m", QuestionType::Matching, &content);
        match question.key {
            AnswerKey::Matching {
                left_items,
                right_items,
                correct_pairs,
            } => {
                assert_eq!(left_items.len(), 2);
                assert_eq!(right_items.len(), 2);
                assert_eq!(right_items[0].id, "m__right_1");
                assert_eq!(
                    correct_pairs,
                    vec![
                        ("m__left_A".to_string(), "m__right_2".to_string()),
                        ("m__left_B".to_string(), "m__right_1".to_string()),
                    ]
                );
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_fill_blank_flattens_options() {
        let content = json!({
            "question": "O {{blank}} é o maior e o {{blank}} o mais pequeno.",
            "options": [["Júpiter", "Saturno"], ["Mercúrio", "Júpiter"]],
            "solution": [{"answer": "Júpiter"}, {"answer": "Mercúrio"}],
        });
        let question = normalize_question("f", QuestionType::FillBlank, &content);
        match question.key {
            AnswerKey::FillBlank { options, blanks } => {
                let texts: Vec<_> = options.iter().map(|o| o.text.as_str()).collect();
                assert_eq!(texts, vec!["Júpiter", "Mercúrio", "Saturno"]);
                assert_eq!(options[0].id, "f__fopt_Júpiter");
                assert_eq!(blanks[0].id, "f__blank_0");
                assert_eq!(blanks[0].correct_answer, "f__fopt_Júpiter");
                assert_eq!(blanks[1].correct_answer, "f__fopt_Mercúrio");
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_true_false_solution_values() {
        for (solution, expected) in [
            (json!(true), Some(true)),
            (json!("V"), Some(true)),
            (json!("true"), Some(true)),
            (json!("F"), Some(false)),
            (json!(false), Some(false)),
        ] {
            let question =
                normalize_question("t", QuestionType::TrueFalse, &json!({ "solution": solution }));
            assert_eq!(
                question.key,
                AnswerKey::TrueFalse {
                    correct_answer: expected
                }
            );
        }
        let unset = normalize_question("t", QuestionType::TrueFalse, &json!({}));
        assert_eq!(unset.key, AnswerKey::TrueFalse { correct_answer: None });
    }

    #[test]
    fn test_short_answer_solution_forms() {
        let single = normalize_question("s", QuestionType::ShortAnswer, &json!({"solution": "Lisboa"}));
        assert_eq!(
            single.key,
            AnswerKey::ShortAnswer {
                correct_answers: vec!["Lisboa".into()],
                case_sensitive: false
            }
        );
        let many = normalize_question(
            "s",
            QuestionType::ShortAnswer,
            &json!({"solution": ["H2O", " "], "case_sensitive": true}),
        );
        assert_eq!(
            many.key,
            AnswerKey::ShortAnswer {
                correct_answers: vec!["H2O".into()],
                case_sensitive: true
            }
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let samples = vec![
            (QuestionType::MultipleChoice, json!({"options": [{"label": "A", "text": "a"}, {"text": "b"}], "solution": "A"})),
            (QuestionType::MultipleResponse, json!({"options": [{"label": "A", "text": "a"}, {"label": "B", "text": "b"}], "solution": ["A", "B"]})),
            (QuestionType::Ordering, json!({"options": [{"label": "A", "text": "a"}, {"label": "B", "text": "b"}], "solution": ["B", "A"]})),
            (QuestionType::Matching, json!({"options": [{"label": "A", "text": "a"}, {"label": "1", "text": "one"}], "solution": [{"left": "A", "right": "1"}]})),
            (QuestionType::FillBlank, json!({"options": [["x", "y"]], "solution": [{"answer": "y"}]})),
            (QuestionType::FillBlank, json!({"blanks": [{"correct_answer": ""}]})),
            (QuestionType::TrueFalse, json!({"solution": "V"})),
            (QuestionType::ShortAnswer, json!({"solution": "resposta"})),
            (QuestionType::OpenExtended, json!({"question": "Explica."})),
        ];
        for (kind, content) in samples {
            let once = normalize_question("q", kind, &content);
            assert_eq!(renormalize(&once), once, "{} not idempotent", kind);
        }
    }

    #[test]
    fn test_denormalize_round_trip_keeps_ids() {
        let samples = vec![
            (QuestionType::MultipleChoice, json!({"options": [{"label": "A", "text": "a"}, {"label": "B", "text": "b"}], "solution": "B"})),
            (QuestionType::MultipleResponse, json!({"options": [{"label": "A", "text": "a"}, {"label": "B", "text": "b"}], "solution": ["B"]})),
            (QuestionType::Ordering, json!({"options": [{"label": "A", "text": "a"}, {"label": "B", "text": "b"}], "solution": ["B", "A"]})),
            (QuestionType::Matching, json!({"options": [{"label": "A", "text": "a"}, {"label": "1", "text": "one"}, {"label": "2", "text": "two"}], "solution": [{"left": "A", "right": "2"}]})),
            (QuestionType::FillBlank, json!({"options": [["x", "y"], ["z"]], "solution": [{"answer": "y"}, {"answer": "z"}]})),
            (QuestionType::TrueFalse, json!({"solution": false})),
            (QuestionType::ShortAnswer, json!({"solution": ["a", "b"], "case_sensitive": true})),
        ];
        for (kind, content) in samples {
            let editor = normalize_question("q", kind, &content);
            assert_eq!(round_trip_labels(&editor), editor, "{} lost data", kind);
        }
    }

    #[test]
    fn test_denormalize_assigns_missing_labels() {
        let editor = EditorQuestion {
            id: "q".into(),
            stem: QuestionStem::default(),
            key: AnswerKey::MultipleChoice {
                options: vec![
                    Choice::new("x1", None, "first"),
                    Choice::new("x2", None, "second"),
                ],
                correct_answer: Some("x2".into()),
            },
        };
        let (_, content) = denormalize_question(&editor);
        assert_eq!(content["options"][0]["label"], "A");
        assert_eq!(content["options"][1]["label"], "B");
        assert_eq!(content["solution"], "B");
        assert!(content["options"][0].get("id").is_none());
    }

    #[test]
    fn test_parse_pairs_shapes() {
        let expected = vec![("l1".to_string(), "r1".to_string())];
        assert_eq!(parse_pairs(&json!([["l1", "r1"]])), expected);
        assert_eq!(parse_pairs(&json!({"l1": "r1"})), expected);
        assert_eq!(parse_pairs(&json!({"pairs": [{"left_id": "l1", "right": "r1"}]})), expected);
        assert_eq!(parse_pairs(&json!([["l1", "r1"], ["l1", "r1"], ["", "r2"]])), expected);
        assert!(parse_pairs(&json!("nope")).is_empty());
    }

    #[test]
    fn test_without_answer_key() {
        let stored = json!({
            "question": "Capital?",
            "options": [{"label": "A", "text": "Porto"}, {"label": "B", "text": "Lisboa"}],
            "solution": "B"
        });
        let hidden = without_answer_key(&stored);
        assert_eq!(hidden["options"], stored["options"]);
        assert!(hidden.get("solution").is_none());

        let question = normalize_question(
            "q1",
            QuestionType::FillBlank,
            &json!({
                "question": "O {{blank}} é azul",
                "options": [["céu", "mar"]],
                "solution": [{"answer": "céu"}]
            }),
        );
        let hidden = without_answer_key(&to_editor_content(&question));
        let blanks = hidden["blanks"].as_array().unwrap();
        assert_eq!(blanks.len(), 1);
        assert!(blanks[0].get("id").is_some());
        assert!(blanks[0].get("correct_answer").is_none());

        let ordering = json!({"items": [], "correct_order": ["a"], "correct_pairs": [], "correct_answers": ["x"]});
        assert_eq!(without_answer_key(&ordering), json!({"items": []}));
    }
}
