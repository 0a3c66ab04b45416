//! Turns free-form completion text into structured documents.
//!
//! Parsing is line oriented and never fails: anything the scanner cannot
//! place is reported as a [`RenderWarning`] instead of aborting the render.

pub mod feedback;
pub mod plan;

use classpilot_server::DocumentKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use feedback::{FeedbackDocument, OverallFeedback, Subsection, parse_feedback};
pub use plan::{LecturePlan, PlanSection, parse_lecture_plan};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWarning {
    MissingHeader {
        header: String,
    },
    DroppedLine {
        line: usize,
        text: String,
        reason: String,
    },
}

impl RenderWarning {
    pub(crate) fn missing(header: &str) -> Self {
        RenderWarning::MissingHeader {
            header: header.to_string(),
        }
    }

    pub(crate) fn dropped(line: usize, text: &str, reason: &str) -> Self {
        debug_assert!(line > 0);
        RenderWarning::DroppedLine {
            line,
            text: text.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedDocument {
    LecturePlan(LecturePlan),
    Feedback(FeedbackDocument),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    pub document: ParsedDocument,
    pub warnings: Vec<RenderWarning>,
}

impl RenderReport {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Document and warnings as JSON values for the status endpoint.
    pub fn into_json_parts(self) -> (Value, Vec<Value>) {
        let document = match &self.document {
            ParsedDocument::LecturePlan(plan) => serde_json::to_value(plan),
            ParsedDocument::Feedback(feedback) => serde_json::to_value(feedback),
        }
        .unwrap_or(Value::Null);
        let warnings = self
            .warnings
            .iter()
            .filter_map(|warning| serde_json::to_value(warning).ok())
            .collect();
        (document, warnings)
    }
}

pub fn parse(kind: DocumentKind, text: &str) -> RenderReport {
    match kind {
        DocumentKind::LecturePlan => {
            let (plan, warnings) = parse_lecture_plan(text);
            RenderReport {
                document: ParsedDocument::LecturePlan(plan),
                warnings,
            }
        }
        DocumentKind::Feedback => {
            let (feedback, warnings) = parse_feedback(text);
            RenderReport {
                document: ParsedDocument::Feedback(feedback),
                warnings,
            }
        }
    }
}
