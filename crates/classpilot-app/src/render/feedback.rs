use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RenderWarning;

pub const OVERALL_HEADER: &str = "Overall Feedback:";

static NUMBERED_SUBSECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+[.)]\s+(?P<title>[^:]+?)\s*(?::\s*(?P<rest>.*))?$")
        .expect("numbered subsection pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverallCategory {
    Strengths,
    Improvements,
    Avoid,
}

impl OverallCategory {
    pub const ALL: [OverallCategory; 3] = [
        OverallCategory::Strengths,
        OverallCategory::Improvements,
        OverallCategory::Avoid,
    ];

    pub const fn header(self) -> &'static str {
        match self {
            OverallCategory::Strengths => "Strengths:",
            OverallCategory::Improvements => "Areas for Improvement:",
            OverallCategory::Avoid => "Avoid/Rethink:",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Planning,
    Environment,
    Instruction,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Planning, Domain::Environment, Domain::Instruction];

    pub const fn header(self) -> &'static str {
        match self {
            Domain::Planning => "DOMAIN 1: PLANNING AND PREPARATION",
            Domain::Environment => "DOMAIN 2: CLASSROOM ENVIRONMENT",
            Domain::Instruction => "DOMAIN 3: INSTRUCTION",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallFeedback {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub avoid: Vec<String>,
}

impl OverallFeedback {
    fn category_mut(&mut self, category: OverallCategory) -> &mut Vec<String> {
        match category {
            OverallCategory::Strengths => &mut self.strengths,
            OverallCategory::Improvements => &mut self.improvements,
            OverallCategory::Avoid => &mut self.avoid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsection {
    pub name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackDocument {
    pub overall: OverallFeedback,
    pub planning: Vec<Subsection>,
    pub environment: Vec<Subsection>,
    pub instruction: Vec<Subsection>,
}

impl FeedbackDocument {
    fn domain_mut(&mut self, domain: Domain) -> &mut Vec<Subsection> {
        match domain {
            Domain::Planning => &mut self.planning,
            Domain::Environment => &mut self.environment,
            Domain::Instruction => &mut self.instruction,
        }
    }

    /// Index of the named subsection, created on first use.
    fn open_subsection(&mut self, domain: Domain, name: &str) -> usize {
        let subsections = self.domain_mut(domain);
        if let Some(index) = subsections.iter().position(|s| s.name == name) {
            return index;
        }
        subsections.push(Subsection {
            name: name.to_string(),
            items: Vec::new(),
        });
        subsections.len() - 1
    }
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Outside,
    Overall(Option<OverallCategory>),
    Domain(Domain, Option<usize>),
}

#[derive(Debug, Default)]
struct HeadersSeen {
    overall: bool,
    categories: [bool; 3],
    domains: [bool; 3],
}

pub fn parse_feedback(text: &str) -> (FeedbackDocument, Vec<RenderWarning>) {
    let mut doc = FeedbackDocument::default();
    let mut warnings = Vec::new();
    let mut seen = HeadersSeen::default();
    let mut cursor = Cursor::Outside;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;

        if line.contains(OVERALL_HEADER) {
            seen.overall = true;
            cursor = Cursor::Overall(None);
            if header_tail(line, OVERALL_HEADER).is_some() {
                warnings.push(RenderWarning::dropped(line_no, line, "text after header"));
            }
            continue;
        }
        if let Some(slot) = Domain::ALL.iter().position(|d| line.contains(d.header())) {
            let domain = Domain::ALL[slot];
            seen.domains[slot] = true;
            cursor = Cursor::Domain(domain, None);
            if header_tail(line, domain.header()).is_some() {
                warnings.push(RenderWarning::dropped(line_no, line, "text after header"));
            }
            continue;
        }

        match cursor {
            Cursor::Overall(category) => {
                if let Some(slot) = OverallCategory::ALL
                    .iter()
                    .position(|c| line.contains(c.header()))
                {
                    let category = OverallCategory::ALL[slot];
                    seen.categories[slot] = true;
                    cursor = Cursor::Overall(Some(category));
                    if let Some(tail) = header_tail(line, category.header()) {
                        let item = bullet_content(tail).unwrap_or(tail);
                        doc.overall.category_mut(category).push(item.to_string());
                    }
                    continue;
                }
                match (bullet_content(line), category) {
                    (Some(item), Some(category)) => {
                        doc.overall.category_mut(category).push(item.to_string());
                    }
                    (Some(_), None) => {
                        warnings.push(RenderWarning::dropped(line_no, line, "bullet outside category"));
                    }
                    (None, _) => {
                        warnings.push(RenderWarning::dropped(line_no, line, "not a bullet"));
                    }
                }
            }
            Cursor::Domain(domain, subsection) => {
                if let Some(item) = bullet_content(line) {
                    match subsection {
                        Some(slot) => doc.domain_mut(domain)[slot].items.push(item.to_string()),
                        None => warnings.push(RenderWarning::dropped(
                            line_no,
                            line,
                            "bullet outside subsection",
                        )),
                    }
                    continue;
                }
                if let Some((name, rest)) = subsection_header(line) {
                    let slot = doc.open_subsection(domain, name);
                    if let Some(rest) = rest {
                        doc.domain_mut(domain)[slot].items.push(rest.to_string());
                    }
                    cursor = Cursor::Domain(domain, Some(slot));
                    continue;
                }
                warnings.push(RenderWarning::dropped(line_no, line, "not a bullet"));
            }
            Cursor::Outside => {
                warnings.push(RenderWarning::dropped(line_no, line, "before first section"));
            }
        }
    }

    if !seen.overall {
        warnings.push(RenderWarning::missing(OVERALL_HEADER));
    }
    for (category, seen) in OverallCategory::ALL.iter().zip(seen.categories) {
        if !seen {
            warnings.push(RenderWarning::missing(category.header()));
        }
    }
    for (domain, seen) in Domain::ALL.iter().zip(seen.domains) {
        if !seen {
            warnings.push(RenderWarning::missing(domain.header()));
        }
    }

    (doc, warnings)
}

/// Text following `header` on the same line, ignoring markup-only leftovers
/// such as the closing `**` of a bold header.
fn header_tail<'a>(line: &'a str, header: &str) -> Option<&'a str> {
    let (_, tail) = line.split_once(header)?;
    let tail = tail.trim();
    tail.chars().any(char::is_alphanumeric).then_some(tail)
}

fn bullet_content(line: &str) -> Option<&str> {
    line.strip_prefix('-').map(str::trim)
}

/// `Name:` or `N. Title[: text]` inside a domain.
fn subsection_header(line: &str) -> Option<(&str, Option<&str>)> {
    if let Some(caps) = NUMBERED_SUBSECTION.captures(line) {
        let title = caps.name("title")?.as_str().trim();
        let rest = caps
            .name("rest")
            .map(|m| m.as_str().trim())
            .filter(|rest| !rest.is_empty());
        return Some((title, rest));
    }
    line.strip_suffix(':')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| (name, None))
}
