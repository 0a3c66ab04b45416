//! Prompt construction for both document kinds.
//!
//! The output templates embedded in the prompts are assembled from the same
//! header constants the renderer matches on, so a change to a section name
//! shows up on both sides at once.

use std::fmt::Write as _;

use classpilot_server::{DocumentKind, FormContext};
use thiserror::Error;

use crate::render::feedback::{Domain, OVERALL_HEADER, OverallCategory};
use crate::render::plan::PlanSection;

/// System role sent alongside every prompt.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant.";

pub const TRANSCRIPT_FIELD: &str = "lecture_transcript";

/// Feedback points requested per domain, `{subject}` and `{grade}` filled in later.
const PLANNING_POINTS: [(&str, &str); 5] = [
    (
        "Lecture Sequence",
        "How well does the lecture sequence build understanding of {subject} concepts?",
    ),
    (
        "Mixed Ability Levels",
        "Are the examples and explanations appropriate for the mixed ability levels in {grade} grade?",
    ),
    (
        "Key Concepts",
        "How effectively are key {subject} concepts introduced and connected?",
    ),
    (
        "Misconceptions",
        "What specific misconceptions might {grade} grade students have about {subject}?",
    ),
    (
        "Lesson Structure",
        "How could the lesson be better structured for different learning levels in {grade} grade?",
    ),
];

const ENVIRONMENT_POINTS: [(&str, &str); 5] = [
    (
        "Student Engagement",
        "How can the lecture be made more engaging for {grade} grade students with varying abilities?",
    ),
    (
        "Attention Maintenance",
        "What specific strategies could be used to maintain student attention during {subject} concepts?",
    ),
    (
        "Content Relevance",
        "How can the {subject} content be made more relevant to {grade} grade students' lives?",
    ),
    (
        "Interactive Learning",
        "What specific activities could be added to make the {subject} learning more interactive?",
    ),
    (
        "Learning Styles",
        "How can the lecture better accommodate different learning styles for {grade} grade students?",
    ),
];

const INSTRUCTION_POINTS: [(&str, &str); 5] = [
    (
        "Problem-Solving Steps",
        "How effectively are the steps for {subject} concepts explained?",
    ),
    (
        "Visual Aids",
        "What specific visual aids or examples could enhance understanding of {subject}?",
    ),
    (
        "Concept Explanation",
        "How could the explanation of key {subject} concepts be improved?",
    ),
    (
        "Practice Opportunities",
        "What specific practice opportunities could be added for {grade} grade level?",
    ),
    (
        "Differentiated Instruction",
        "How could the lecture better address the needs of students at different grade levels?",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Lecture transcript is required")]
    MissingField { field: &'static str },
}

impl PromptError {
    pub fn field(&self) -> &'static str {
        match self {
            PromptError::MissingField { field } => field,
        }
    }
}

pub fn build_prompt(kind: DocumentKind, form: &FormContext) -> Result<String, PromptError> {
    match kind {
        DocumentKind::LecturePlan => Ok(build_lecture_plan_prompt(form)),
        DocumentKind::Feedback => build_feedback_prompt(form),
    }
}

pub fn build_lecture_plan_prompt(form: &FormContext) -> String {
    let mut prompt = String::with_capacity(2048);

    let _ = writeln!(
        prompt,
        "Create a detailed lecture plan for teaching {} to grade {} students in {}.",
        form.topic, form.grade, form.country
    );
    prompt.push_str("Consider the following context:\n");
    let _ = writeln!(prompt, "- Class size: {} students", form.number_of_students);
    let _ = writeln!(
        prompt,
        "- Girls / boys: {} / {}",
        form.percentage_of_girls, form.percentage_of_boys
    );
    let _ = writeln!(
        prompt,
        "- Expected attendance: {}",
        form.attendance_percentage
    );
    let _ = writeln!(
        prompt,
        "- Grade level competence: {}",
        form.grade_level_competence
    );
    let _ = writeln!(
        prompt,
        "- Teacher experience with this grade: {}",
        form.teaching_tenure_years
    );
    let _ = writeln!(prompt, "- Location: {}", form.location);
    let _ = writeln!(
        prompt,
        "- Classroom challenges: {}",
        form.classroom_challenges
    );
    prompt.push('\n');

    prompt.push_str(
        "Cover 4-6 key subtopics of the topic with time allocations in minutes, \
         engagement activities, real-world examples, checks for understanding and \
         differentiation for struggling and advanced students.\n\n",
    );

    prompt.push_str(
        "Answer using exactly the section headers below, each on its own line, \
         and write every point as a bullet starting with \"- \":\n\n",
    );
    for section in PlanSection::ALL {
        let _ = writeln!(prompt, "{}", section.header());
        let _ = writeln!(prompt, "- {}", section.guidance());
    }
    prompt.push('\n');

    let _ = writeln!(
        prompt,
        "Consider the cultural context of {} and the specific challenges mentioned.",
        form.location
    );

    debug_assert!(PlanSection::ALL.iter().all(|s| prompt.contains(s.header())));
    prompt
}

pub fn build_feedback_prompt(form: &FormContext) -> Result<String, PromptError> {
    let transcript = form.transcript().ok_or(PromptError::MissingField {
        field: TRANSCRIPT_FIELD,
    })?;
    let subject = form.subject();
    let grade = form.grade.as_str();

    let mut prompt = String::with_capacity(4096 + transcript.len());

    let _ = writeln!(
        prompt,
        "We are teaching grade {} the topic {} in {}.",
        form.grade, form.topic, form.country
    );
    let _ = writeln!(
        prompt,
        "My class is based out of {}. There are {} students in my class, {} of girls and {} of boys.",
        form.location,
        form.number_of_students,
        form.percentage_of_girls,
        form.percentage_of_boys
    );
    let _ = writeln!(
        prompt,
        "The attendance is expected to be {}, and the grade level competence of my students is {}.",
        form.attendance_percentage, form.grade_level_competence
    );
    let _ = writeln!(
        prompt,
        "I have been teaching this grade for {}. The challenges I face are usually {}.",
        form.teaching_tenure_years, form.classroom_challenges
    );
    prompt.push('\n');

    prompt.push_str(
        "Below is the transcript of my recent lecture. Please provide specific, actionable \
         feedback based on the actual content of this lecture. For each point, give a specific \
         observation from the lecture, a concrete suggestion for improvement and an example of \
         how to implement it.\n\n",
    );
    prompt.push_str("LECTURE TRANSCRIPT:\n");
    prompt.push_str(transcript);
    prompt.push_str("\n\n");

    let _ = writeln!(
        prompt,
        "Answer using exactly the headers below, specifically tailored for teaching {subject} at the {grade} grade level. \
         Write every point as a bullet starting with \"- \".\n"
    );

    prompt.push_str(OVERALL_HEADER);
    prompt.push('\n');
    for category in OverallCategory::ALL {
        let _ = writeln!(prompt, "{}", category.header());
        prompt.push_str("- ...\n");
    }
    prompt.push('\n');

    for domain in Domain::ALL {
        let _ = writeln!(prompt, "{}", domain.header());
        for (index, (title, question)) in domain_points(domain).iter().enumerate() {
            let question = question.replace("{subject}", subject).replace("{grade}", grade);
            let _ = writeln!(prompt, "{}. {title}:", index + 1);
            let _ = writeln!(prompt, "- {question}");
        }
        prompt.push('\n');
    }

    let _ = writeln!(
        prompt,
        "Provide concrete suggestions that can be implemented immediately in the classroom. \
         Consider the cultural context of {} and the specific challenges mentioned: {}.",
        form.location, form.classroom_challenges
    );

    Ok(prompt)
}

fn domain_points(domain: Domain) -> &'static [(&'static str, &'static str); 5] {
    match domain {
        Domain::Planning => &PLANNING_POINTS,
        Domain::Environment => &ENVIRONMENT_POINTS,
        Domain::Instruction => &INSTRUCTION_POINTS,
    }
}
