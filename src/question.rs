use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Question kinds accepted by the question bank.
///
/// The first seven are auto-gradable. `OpenExtended` and `ContextGroup` are
/// stored and edited but never graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    FillBlank,
    Matching,
    ShortAnswer,
    MultipleResponse,
    Ordering,
    OpenExtended,
    ContextGroup,
}

impl QuestionType {
    pub const ALL: [QuestionType; 9] = [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::FillBlank,
        QuestionType::Matching,
        QuestionType::ShortAnswer,
        QuestionType::MultipleResponse,
        QuestionType::Ordering,
        QuestionType::OpenExtended,
        QuestionType::ContextGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillBlank => "fill_blank",
            QuestionType::Matching => "matching",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::MultipleResponse => "multiple_response",
            QuestionType::Ordering => "ordering",
            QuestionType::OpenExtended => "open_extended",
            QuestionType::ContextGroup => "context_group",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown question type '{0}'")]
pub struct UnknownQuestionType(pub String);

impl FromStr for QuestionType {
    type Err = UnknownQuestionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| UnknownQuestionType(s.to_string()))
    }
}

/// An option, ordering item, matching item or fill-blank option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label,
            text: text.into(),
            image_url: None,
        }
    }
}

/// A fill-blank slot. `correct_answer` is an option id, empty when unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blank {
    pub id: String,
    #[serde(default)]
    pub correct_answer: String,
}

/// Content shared by every question type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStem {
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_grade: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_generated_fields: Vec<String>,
}

impl QuestionStem {
    /// The stem with empty optional strings dropped, the form
    /// `normalize_question` reads back from stored content.
    pub fn cleaned(&self) -> QuestionStem {
        let keep = |field: &Option<String>| field.clone().filter(|value| !value.is_empty());
        QuestionStem {
            question: self.question.clone(),
            image_url: keep(&self.image_url),
            criteria: keep(&self.criteria),
            original_grade: keep(&self.original_grade),
            ai_generated_fields: self
                .ai_generated_fields
                .iter()
                .filter(|field| !field.is_empty())
                .cloned()
                .collect(),
        }
    }
}

/// Type-specific answer key in the id-based editor schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerKey {
    MultipleChoice {
        options: Vec<Choice>,
        #[serde(default)]
        correct_answer: Option<String>,
    },
    MultipleResponse {
        options: Vec<Choice>,
        #[serde(default)]
        correct_answers: Vec<String>,
    },
    TrueFalse {
        #[serde(default)]
        correct_answer: Option<bool>,
    },
    FillBlank {
        options: Vec<Choice>,
        blanks: Vec<Blank>,
    },
    Matching {
        left_items: Vec<Choice>,
        right_items: Vec<Choice>,
        #[serde(default)]
        correct_pairs: Vec<(String, String)>,
    },
    ShortAnswer {
        #[serde(default)]
        correct_answers: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    Ordering {
        items: Vec<Choice>,
        #[serde(default)]
        correct_order: Vec<String>,
    },
    OpenExtended {},
    ContextGroup {},
}

impl AnswerKey {
    pub fn question_type(&self) -> QuestionType {
        match self {
            AnswerKey::MultipleChoice { .. } => QuestionType::MultipleChoice,
            AnswerKey::MultipleResponse { .. } => QuestionType::MultipleResponse,
            AnswerKey::TrueFalse { .. } => QuestionType::TrueFalse,
            AnswerKey::FillBlank { .. } => QuestionType::FillBlank,
            AnswerKey::Matching { .. } => QuestionType::Matching,
            AnswerKey::ShortAnswer { .. } => QuestionType::ShortAnswer,
            AnswerKey::Ordering { .. } => QuestionType::Ordering,
            AnswerKey::OpenExtended {} => QuestionType::OpenExtended,
            AnswerKey::ContextGroup {} => QuestionType::ContextGroup,
        }
    }

    /// An empty key for `kind`, used when a conversion has nothing to carry.
    pub fn empty(kind: QuestionType) -> Self {
        match kind {
            QuestionType::MultipleChoice => AnswerKey::MultipleChoice {
                options: Vec::new(),
                correct_answer: None,
            },
            QuestionType::MultipleResponse => AnswerKey::MultipleResponse {
                options: Vec::new(),
                correct_answers: Vec::new(),
            },
            QuestionType::TrueFalse => AnswerKey::TrueFalse {
                correct_answer: None,
            },
            QuestionType::FillBlank => AnswerKey::FillBlank {
                options: Vec::new(),
                blanks: Vec::new(),
            },
            QuestionType::Matching => AnswerKey::Matching {
                left_items: Vec::new(),
                right_items: Vec::new(),
                correct_pairs: Vec::new(),
            },
            QuestionType::ShortAnswer => AnswerKey::ShortAnswer {
                correct_answers: Vec::new(),
                case_sensitive: false,
            },
            QuestionType::Ordering => AnswerKey::Ordering {
                items: Vec::new(),
                correct_order: Vec::new(),
            },
            QuestionType::OpenExtended => AnswerKey::OpenExtended {},
            QuestionType::ContextGroup => AnswerKey::ContextGroup {},
        }
    }

    /// Whether the key holds enough information for `grade_question` to
    /// return a verdict.
    pub fn is_gradable(&self) -> bool {
        match self {
            AnswerKey::MultipleChoice { correct_answer, .. } => {
                correct_answer.as_deref().is_some_and(|id| !id.is_empty())
            }
            AnswerKey::MultipleResponse { correct_answers, .. } => {
                correct_answers.iter().any(|id| !id.is_empty())
            }
            AnswerKey::TrueFalse { correct_answer } => correct_answer.is_some(),
            AnswerKey::FillBlank { blanks, .. } => blanks
                .iter()
                .any(|blank| !blank.id.is_empty() && !blank.correct_answer.is_empty()),
            AnswerKey::Matching { correct_pairs, .. } => correct_pairs
                .iter()
                .any(|(left, right)| !left.is_empty() && !right.is_empty()),
            AnswerKey::ShortAnswer {
                correct_answers, ..
            } => !correct_answers.is_empty(),
            AnswerKey::Ordering { correct_order, .. } => {
                correct_order.iter().any(|id| !id.is_empty())
            }
            AnswerKey::OpenExtended {} | AnswerKey::ContextGroup {} => false,
        }
    }
}

/// A question in the id-based editor schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorQuestion {
    pub id: String,
    #[serde(default)]
    pub stem: QuestionStem,
    pub key: AnswerKey,
}

impl EditorQuestion {
    pub fn question_type(&self) -> QuestionType {
        self.key.question_type()
    }
}

/// Stable identifier for a sub-element of a question.
///
/// The same (question, namespace, discriminator) triple always yields the
/// same id, so answers recorded against an id survive re-normalization.
pub fn deterministic_id(question_id: &str, namespace: &str, discriminator: impl fmt::Display) -> String {
    format!("{}__{}_{}", question_id, namespace, discriminator)
}

/// Spreadsheet-style letter label: A..Z, AA, AB, ...
pub fn letter_label(index: usize) -> String {
    let mut n = index + 1;
    let mut label = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

pub fn number_label(index: usize) -> String {
    (index + 1).to_string()
}

/// Labels `choices` that have none, using the first labels from `make_label`
/// not already taken. Existing labels are left untouched.
pub fn assign_missing_labels(choices: &mut [Choice], make_label: fn(usize) -> String) {
    let mut taken: Vec<String> = choices
        .iter()
        .filter_map(|choice| choice.label.clone())
        .filter(|label| !label.is_empty())
        .collect();
    let mut next = 0;
    for choice in choices.iter_mut() {
        if choice.label.as_deref().is_some_and(|label| !label.is_empty()) {
            continue;
        }
        let mut candidate = make_label(next);
        while taken.contains(&candidate) {
            next += 1;
            candidate = make_label(next);
        }
        next += 1;
        taken.push(candidate.clone());
        choice.label = Some(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_type_round_trip_names() {
        for kind in QuestionType::ALL {
            assert_eq!(kind.as_str().parse::<QuestionType>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
        }
        assert!("essay".parse::<QuestionType>().is_err());
    }

    #[test]
    fn test_deterministic_id_format() {
        assert_eq!(deterministic_id("q1", "opt", "A"), "q1__opt_A");
        assert_eq!(deterministic_id("q1", "blank", 0), "q1__blank_0");
    }

    #[test]
    fn test_letter_labels() {
        assert_eq!(letter_label(0), "A");
        assert_eq!(letter_label(25), "Z");
        assert_eq!(letter_label(26), "AA");
        assert_eq!(letter_label(27), "AB");
        assert_eq!(number_label(0), "1");
    }

    #[test]
    fn test_assign_missing_labels_skips_taken() {
        let mut choices = vec![
            Choice::new("a", None, "first"),
            Choice::new("b", Some("A".to_string()), "second"),
            Choice::new("c", None, "third"),
        ];
        assign_missing_labels(&mut choices, letter_label);
        let labels: Vec<_> = choices.iter().map(|c| c.label.clone().unwrap()).collect();
        assert_eq!(labels, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_gradability() {
        assert!(!AnswerKey::empty(QuestionType::MultipleChoice).is_gradable());
        assert!(
            AnswerKey::TrueFalse {
                correct_answer: Some(false)
            }
            .is_gradable()
        );
        assert!(!AnswerKey::OpenExtended {}.is_gradable());
    }

    #[test]
    fn test_editor_question_serializes_type_tag() {
        let question = EditorQuestion {
            id: "q1".to_string(),
            stem: QuestionStem::default(),
            key: AnswerKey::TrueFalse {
                correct_answer: Some(true),
            },
        };
        let json = serde_json::to_value(&question).unwrap();
        assert_eq!(json["key"]["type"], "true_false");
        assert_eq!(json["key"]["correct_answer"], true);

        let back: EditorQuestion = serde_json::from_value(json).unwrap();
        assert_eq!(back, question);
    }
}
