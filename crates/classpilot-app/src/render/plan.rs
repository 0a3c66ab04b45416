use serde::{Deserialize, Serialize};

use super::RenderWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanSection {
    Overview,
    LearningObjectives,
    Materials,
    Timeline,
    Assessment,
}

impl PlanSection {
    pub const ALL: [PlanSection; 5] = [
        PlanSection::Overview,
        PlanSection::LearningObjectives,
        PlanSection::Materials,
        PlanSection::Timeline,
        PlanSection::Assessment,
    ];

    pub const fn title(self) -> &'static str {
        match self {
            PlanSection::Overview => "Overview",
            PlanSection::LearningObjectives => "Learning Objectives",
            PlanSection::Materials => "Materials",
            PlanSection::Timeline => "Timeline",
            PlanSection::Assessment => "Assessment",
        }
    }

    /// Literal header line opening the section.
    pub const fn header(self) -> &'static str {
        match self {
            PlanSection::Overview => "Overview:",
            PlanSection::LearningObjectives => "Learning Objectives:",
            PlanSection::Materials => "Materials:",
            PlanSection::Timeline => "Timeline:",
            PlanSection::Assessment => "Assessment:",
        }
    }

    pub(crate) const fn guidance(self) -> &'static str {
        match self {
            PlanSection::Overview => "a short summary of the lesson and its subtopics",
            PlanSection::LearningObjectives => "what students should be able to do afterwards",
            PlanSection::Materials => "resources, visual aids and handouts needed",
            PlanSection::Timeline => "each activity with its duration in minutes",
            PlanSection::Assessment => "how understanding is checked during and after the lesson",
        }
    }

    fn opened_by(line: &str) -> Option<(PlanSection, &str)> {
        PlanSection::ALL.into_iter().find_map(|section| {
            line.strip_prefix(section.header())
                .map(|rest| (section, rest.trim()))
        })
    }
}

/// Lecture plan keyed by the fixed section vocabulary, serialized in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturePlan {
    #[serde(rename = "Overview")]
    pub overview: Vec<String>,
    #[serde(rename = "Learning Objectives")]
    pub learning_objectives: Vec<String>,
    #[serde(rename = "Materials")]
    pub materials: Vec<String>,
    #[serde(rename = "Timeline")]
    pub timeline: Vec<String>,
    #[serde(rename = "Assessment")]
    pub assessment: Vec<String>,
}

impl LecturePlan {
    pub fn section(&self, section: PlanSection) -> &[String] {
        match section {
            PlanSection::Overview => &self.overview,
            PlanSection::LearningObjectives => &self.learning_objectives,
            PlanSection::Materials => &self.materials,
            PlanSection::Timeline => &self.timeline,
            PlanSection::Assessment => &self.assessment,
        }
    }

    fn section_mut(&mut self, section: PlanSection) -> &mut Vec<String> {
        match section {
            PlanSection::Overview => &mut self.overview,
            PlanSection::LearningObjectives => &mut self.learning_objectives,
            PlanSection::Materials => &mut self.materials,
            PlanSection::Timeline => &mut self.timeline,
            PlanSection::Assessment => &mut self.assessment,
        }
    }

    pub fn is_empty(&self) -> bool {
        PlanSection::ALL
            .iter()
            .all(|section| self.section(*section).is_empty())
    }
}

pub fn parse_lecture_plan(text: &str) -> (LecturePlan, Vec<RenderWarning>) {
    let mut plan = LecturePlan::default();
    let mut warnings = Vec::new();
    let mut seen = [false; PlanSection::ALL.len()];
    let mut current: Option<PlanSection> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((section, rest)) = PlanSection::opened_by(line) {
            current = Some(section);
            if let Some(slot) = PlanSection::ALL.iter().position(|s| *s == section) {
                seen[slot] = true;
            }
            if !rest.is_empty() {
                plan.section_mut(section).push(strip_bullet(rest).to_string());
            }
            continue;
        }

        match current {
            Some(section) => plan.section_mut(section).push(strip_bullet(line).to_string()),
            None => warnings.push(RenderWarning::dropped(index + 1, line, "before first section")),
        }
    }

    for (section, seen) in PlanSection::ALL.iter().zip(seen) {
        if !seen {
            warnings.push(RenderWarning::missing(section.header()));
        }
    }

    (plan, warnings)
}

fn strip_bullet(line: &str) -> &str {
    line.strip_prefix("- ").unwrap_or(line)
}
