//! Question type conversion for the editor.
//!
//! A source key is read as a list of choices, the indexes of the correct
//! choices and, for ordering-like sources, the correct sequence. The target
//! key is then rebuilt from that reading with ids derived the same way
//! [`crate::normalizer::normalize_question`] derives them, so a converted
//! question survives a store-and-reload unchanged.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::question::{
    assign_missing_labels, deterministic_id, letter_label, number_label, AnswerKey, Blank,
    Choice, EditorQuestion, QuestionStem, QuestionType,
};

static BLANK_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*blank\s*\}\}").expect("blank marker pattern"));

const TRUE_WORDS: [&str; 3] = ["v", "verdadeiro", "true"];
const FALSE_WORDS: [&str; 3] = ["f", "falso", "false"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub question: EditorQuestion,
    /// Whether the converted question can still be auto-graded exactly when
    /// the source could.
    pub answer_key_preserved: bool,
}

struct SourceReading {
    kind: QuestionType,
    choices: Vec<Choice>,
    selected: Vec<usize>,
    sequence: Option<Vec<usize>>,
}

fn index_of(choices: &[Choice], id: &str) -> Option<usize> {
    choices.iter().position(|choice| choice.id == id)
}

fn indexes_of<'a>(choices: &[Choice], ids: impl IntoIterator<Item = &'a String>) -> Vec<usize> {
    let mut indexes = Vec::new();
    for index in ids.into_iter().filter_map(|id| index_of(choices, id)) {
        if !indexes.contains(&index) {
            indexes.push(index);
        }
    }
    indexes
}

/// Left items ordered by their paired position when every right item is
/// labelled with a number and the numbers form a permutation of `1..=n`.
fn matching_sequence(
    left_items: &[Choice],
    right_items: &[Choice],
    correct_pairs: &[(String, String)],
) -> Option<Vec<usize>> {
    if left_items.is_empty() || correct_pairs.len() != left_items.len() {
        return None;
    }
    let mut positioned: Vec<(usize, usize)> = Vec::new();
    for (left, right) in correct_pairs {
        let left = index_of(left_items, left)?;
        let right = right_items.iter().find(|item| &item.id == right)?;
        let position: usize = right.label.as_deref()?.trim().parse().ok()?;
        positioned.push((position, left));
    }
    positioned.sort();
    let is_permutation = positioned
        .iter()
        .enumerate()
        .all(|(offset, (position, _))| *position == offset + 1);
    let mut lefts: Vec<usize> = positioned.iter().map(|(_, left)| *left).collect();
    lefts.sort_unstable();
    lefts.dedup();
    if !is_permutation || lefts.len() != left_items.len() {
        return None;
    }
    Some(positioned.into_iter().map(|(_, left)| left).collect())
}

fn read_source(key: &AnswerKey) -> SourceReading {
    let kind = key.question_type();
    let (choices, selected, sequence) = match key {
        AnswerKey::MultipleChoice {
            options,
            correct_answer,
        } => {
            let selected = correct_answer
                .as_deref()
                .and_then(|id| index_of(options, id))
                .into_iter()
                .collect();
            (options.clone(), selected, None)
        }
        AnswerKey::MultipleResponse {
            options,
            correct_answers,
        } => (options.clone(), indexes_of(options, correct_answers), None),
        AnswerKey::Ordering {
            items,
            correct_order,
        } => {
            let sequence = indexes_of(items, correct_order);
            (items.clone(), sequence.clone(), Some(sequence))
        }
        AnswerKey::Matching {
            left_items,
            right_items,
            correct_pairs,
        } => (
            left_items.clone(),
            Vec::new(),
            matching_sequence(left_items, right_items, correct_pairs),
        ),
        AnswerKey::FillBlank { options, blanks } => (
            options.clone(),
            indexes_of(options, blanks.iter().map(|blank| &blank.correct_answer)),
            None,
        ),
        AnswerKey::TrueFalse { correct_answer } => {
            let choices = vec![
                Choice::new("V", Some("V".to_string()), "Verdadeiro"),
                Choice::new("F", Some("F".to_string()), "Falso"),
            ];
            let selected = match correct_answer {
                Some(true) => vec![0],
                Some(false) => vec![1],
                None => Vec::new(),
            };
            (choices, selected, None)
        }
        AnswerKey::ShortAnswer {
            correct_answers, ..
        } => {
            let choices: Vec<Choice> = correct_answers
                .iter()
                .filter(|answer| !answer.trim().is_empty())
                .enumerate()
                .map(|(index, answer)| Choice::new(index.to_string(), None, answer.clone()))
                .collect();
            let selected = (0..choices.len()).collect();
            (choices, selected, None)
        }
        AnswerKey::OpenExtended {} | AnswerKey::ContextGroup {} => (Vec::new(), Vec::new(), None),
    };
    SourceReading {
        kind,
        choices,
        selected,
        sequence,
    }
}

/// Choices with unique non-empty labels and ids derived from those labels.
fn relabel(choices: &[Choice], question_id: &str, namespace: &str, make_label: fn(usize) -> String) -> Vec<Choice> {
    let mut seen: Vec<String> = Vec::new();
    let mut prepared: Vec<Choice> = choices
        .iter()
        .map(|choice| {
            let label = choice
                .label
                .clone()
                .filter(|label| !label.is_empty() && !seen.contains(label));
            if let Some(label) = &label {
                seen.push(label.clone());
            }
            Choice {
                id: String::new(),
                label,
                text: choice.text.clone(),
                image_url: choice.image_url.clone().filter(|url| !url.is_empty()),
            }
        })
        .collect();
    assign_missing_labels(&mut prepared, make_label);
    for choice in prepared.iter_mut() {
        let label = choice.label.clone().unwrap_or_default();
        choice.id = deterministic_id(question_id, namespace, label);
    }
    prepared
}

fn boolean_of(choice: &Choice) -> Option<bool> {
    let candidates = [choice.label.as_deref().unwrap_or(""), choice.text.as_str()];
    candidates.iter().find_map(|candidate| {
        let word = candidate.trim().to_lowercase();
        if TRUE_WORDS.contains(&word.as_str()) {
            Some(true)
        } else if FALSE_WORDS.contains(&word.as_str()) {
            Some(false)
        } else {
            None
        }
    })
}

fn choice_text(choice: &Choice) -> String {
    if choice.text.trim().is_empty() {
        choice.label.clone().unwrap_or_default()
    } else {
        choice.text.clone()
    }
}

fn short_answers(source: &SourceReading, original: &AnswerKey) -> Vec<String> {
    if let AnswerKey::FillBlank { options, blanks } = original {
        if blanks.len() > 1 {
            let joined = blanks
                .iter()
                .filter_map(|blank| options.iter().find(|option| option.id == blank.correct_answer))
                .map(|option| option.text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            return if joined.is_empty() { Vec::new() } else { vec![joined] };
        }
    }
    let mut answers: Vec<String> = Vec::new();
    for index in &source.selected {
        let text = choice_text(&source.choices[*index]);
        if !text.trim().is_empty() && !answers.contains(&text) {
            answers.push(text);
        }
    }
    answers
}

fn fill_blank_key(question_id: &str, source: &SourceReading) -> (AnswerKey, usize) {
    let correct: Vec<usize> = if source.kind == QuestionType::ShortAnswer {
        source.selected.iter().take(1).copied().collect()
    } else {
        source.selected.clone()
    };

    let mut texts: Vec<String> = Vec::new();
    let mut push_text = |text: String| {
        if !text.is_empty() && !texts.contains(&text) {
            texts.push(text);
        }
    };
    for index in &correct {
        push_text(choice_text(&source.choices[*index]));
    }
    for choice in &source.choices {
        push_text(choice_text(choice));
    }

    let options: Vec<Choice> = texts
        .iter()
        .map(|text| Choice::new(deterministic_id(question_id, "fopt", text), None, text.clone()))
        .collect();
    let blanks: Vec<Blank> = correct
        .iter()
        .map(|index| choice_text(&source.choices[*index]))
        .filter(|text| !text.is_empty())
        .enumerate()
        .map(|(position, text)| Blank {
            id: deterministic_id(question_id, "blank", position),
            correct_answer: deterministic_id(question_id, "fopt", text),
        })
        .collect();
    let blank_count = blanks.len();
    (AnswerKey::FillBlank { options, blanks }, blank_count)
}

fn with_blank_markers(stem: &QuestionStem, blank_count: usize) -> QuestionStem {
    let present = BLANK_MARKER.find_iter(&stem.question).count();
    let mut stem = stem.clone();
    for _ in present..blank_count {
        if !stem.question.is_empty() && !stem.question.ends_with(' ') {
            stem.question.push(' ');
        }
        stem.question.push_str("{{blank}}");
    }
    stem
}

/// Convert `question` to `target`, carrying over as much of the answer key as
/// the target type can express.
pub fn convert_question_type(question: &EditorQuestion, target: QuestionType) -> ConversionReport {
    if question.question_type() == target {
        return ConversionReport {
            question: EditorQuestion {
                stem: question.stem.cleaned(),
                ..question.clone()
            },
            answer_key_preserved: true,
        };
    }

    let qid = question.id.as_str();
    let source = read_source(&question.key);
    let mut stem = question.stem.cleaned();

    let key = match target {
        QuestionType::MultipleChoice => {
            let options = relabel(&source.choices, qid, "opt", letter_label);
            let correct_answer = source.selected.first().map(|index| options[*index].id.clone());
            AnswerKey::MultipleChoice {
                options,
                correct_answer,
            }
        }
        QuestionType::MultipleResponse => {
            let options = relabel(&source.choices, qid, "opt", letter_label);
            let correct_answers = options
                .iter()
                .enumerate()
                .filter(|(index, _)| source.selected.contains(index))
                .map(|(_, option)| option.id.clone())
                .collect();
            AnswerKey::MultipleResponse {
                options,
                correct_answers,
            }
        }
        QuestionType::TrueFalse => AnswerKey::TrueFalse {
            correct_answer: source
                .selected
                .first()
                .and_then(|index| boolean_of(&source.choices[*index])),
        },
        QuestionType::ShortAnswer => AnswerKey::ShortAnswer {
            correct_answers: short_answers(&source, &question.key),
            case_sensitive: false,
        },
        QuestionType::Ordering => {
            let items = relabel(&source.choices, qid, "item", letter_label);
            let correct_order = match &source.sequence {
                Some(sequence) => sequence.iter().map(|index| items[*index].id.clone()).collect(),
                None => items.iter().map(|item| item.id.clone()).collect(),
            };
            AnswerKey::Ordering {
                items,
                correct_order,
            }
        }
        QuestionType::Matching => {
            let left_items = relabel(&source.choices, qid, "left", letter_label);
            match (&source.kind, &source.sequence) {
                (QuestionType::Ordering, Some(sequence)) if !sequence.is_empty() => {
                    let right_items: Vec<Choice> = (0..sequence.len())
                        .map(|position| {
                            let label = number_label(position);
                            Choice::new(deterministic_id(qid, "right", &label), Some(label.clone()), label)
                        })
                        .collect();
                    let correct_pairs = sequence
                        .iter()
                        .zip(&right_items)
                        .map(|(index, right)| (left_items[*index].id.clone(), right.id.clone()))
                        .collect();
                    AnswerKey::Matching {
                        left_items,
                        right_items,
                        correct_pairs,
                    }
                }
                _ => AnswerKey::Matching {
                    left_items,
                    right_items: Vec::new(),
                    correct_pairs: Vec::new(),
                },
            }
        }
        QuestionType::FillBlank => {
            let (key, blank_count) = fill_blank_key(qid, &source);
            stem = with_blank_markers(&stem, blank_count);
            key
        }
        QuestionType::OpenExtended => AnswerKey::OpenExtended {},
        QuestionType::ContextGroup => AnswerKey::ContextGroup {},
    };

    let answer_key_preserved = question.key.is_gradable() == key.is_gradable();
    debug!(
        question_id = %question.id,
        from = %question.question_type(),
        to = %target,
        answer_key_preserved,
        "Converted question type"
    );

    ConversionReport {
        question: EditorQuestion {
            id: question.id.clone(),
            stem,
            key,
        },
        answer_key_preserved,
    }
}
