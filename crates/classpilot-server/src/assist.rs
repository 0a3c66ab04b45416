use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classroom description submitted with every generation request.
///
/// Every field is an opaque string that ends up interpolated into prompt
/// text; nothing here is parsed as a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormContext {
    pub grade: String,
    pub topic: String,
    pub country: String,
    pub location: String,
    pub number_of_students: String,
    pub teaching_tenure_years: String,
    pub percentage_of_girls: String,
    pub percentage_of_boys: String,
    pub attendance_percentage: String,
    pub grade_level_competence: String,
    pub classroom_challenges: String,
    #[serde(default)]
    pub lecture_transcript: Option<String>,
}

impl FormContext {
    /// Subject part of the topic, e.g. `Algebra` for `Algebra - Linear Equations`.
    pub fn subject(&self) -> &str {
        match self.topic.split_once(" - ") {
            Some((subject, _)) => subject,
            None => self.topic.as_str(),
        }
    }

    /// Transcript exactly as submitted, `None` when absent or blank.
    pub fn transcript(&self) -> Option<&str> {
        self.lecture_transcript
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// The two documents the assistant knows how to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    LecturePlan,
    Feedback,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::LecturePlan, DocumentKind::Feedback];

    /// Prefix used when minting request identifiers.
    pub const fn id_prefix(self) -> &'static str {
        match self {
            DocumentKind::LecturePlan => "lecture_plan",
            DocumentKind::Feedback => "feedback",
        }
    }

    pub const fn as_str(self) -> &'static str {
        self.id_prefix()
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a status poll as seen by the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPoll {
    NotFound,
    Processing,
    Completed(CompletedJob),
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub kind: DocumentKind,
    pub text: String,
    pub document: Value,
    pub warnings: Vec<Value>,
}

/// Backend the HTTP handlers delegate to.
///
/// `submit` must return without waiting on the completion service; the
/// generation itself runs in the background and is observed through `poll`.
pub trait AssistProvider: Send + Sync + 'static {
    fn submit(&self, kind: DocumentKind, form: FormContext) -> Result<String, AssistError>;
    fn poll(&self, request_id: &str) -> JobPoll;
}

#[derive(Debug, Clone)]
pub struct AssistError {
    pub kind: AssistErrorKind,
    pub message: String,
    pub field: Option<String>,
}

impl AssistError {
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AssistError {
            kind: AssistErrorKind::InvalidParameter,
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AssistError {
            kind: AssistErrorKind::Internal,
            message: message.into(),
            field: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistErrorKind {
    InvalidParameter,
    Internal,
}

impl fmt::Display for AssistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AssistError {}
