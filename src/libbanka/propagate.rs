use crate::libbanka::index::{ExamScope, SourceEntry, SourceIndex};
use crate::libbanka::model::{Exam, Question};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeSet;

const EXCERPT_CHARS: usize = 100;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Fill gaps only, never overwrite.
    Propagate,
    /// Fill gaps and overwrite images that differ from the source.
    Canonicalize,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    MainImageAdded { image: String },
    MainImageReplaced { from: String, to: String },
    OptionImageAdded { key: String, image: String },
    OptionImageReplaced { key: String, from: String, to: String },
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct PropagationSummary {
    pub total_questions_updated: usize,
    pub main_images_added: usize,
    pub main_images_replaced: usize,
    pub option_images_added: usize,
    pub option_images_replaced: usize,
    pub exams_affected: BTreeSet<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdate {
    pub exam_id: String,
    pub question_id: i64,
    pub question_text: String,
    pub source_exam_id: String,
    pub changes: Vec<Change>,
}

/// Running counters for one propagation or canonicalization pass.
#[derive(Serialize, Debug, Default, Clone)]
pub struct PropagationStats {
    pub summary: PropagationSummary,
    pub details: Vec<QuestionUpdate>,
}

impl PropagationStats {
    fn record(&mut self, exam_id: &str, question: &Question, entry: &SourceEntry, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        let summary = &mut self.summary;
        for change in &changes {
            match change {
                Change::MainImageAdded { .. } => summary.main_images_added += 1,
                Change::MainImageReplaced { .. } => summary.main_images_replaced += 1,
                Change::OptionImageAdded { .. } => summary.option_images_added += 1,
                Change::OptionImageReplaced { .. } => summary.option_images_replaced += 1,
            }
        }
        summary.total_questions_updated += 1;
        summary.exams_affected.insert(exam_id.to_string());
        self.details.push(QuestionUpdate {
            exam_id: exam_id.to_string(),
            question_id: question.id,
            question_text: excerpt(question.text(), EXCERPT_CHARS),
            source_exam_id: entry.exam_id.clone(),
            changes,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.summary.total_questions_updated == 0
    }
}

pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

/// Applies one index entry to one question and reports what changed.
pub fn apply_entry(question: &mut Question, entry: &SourceEntry, mode: Mode) -> Vec<Change> {
    let mut changes = Vec::new();

    if let Some(source) = entry.main_image.as_deref() {
        match question.main_image().map(str::to_string) {
            None => {
                question.set_main_image(source);
                changes.push(Change::MainImageAdded {
                    image: source.to_string(),
                });
            }
            Some(current) if mode == Mode::Canonicalize && current != source => {
                question.set_main_image(source);
                changes.push(Change::MainImageReplaced {
                    from: current,
                    to: source.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    let Some(options) = question.options.as_mut() else {
        return changes;
    };
    for (key, source) in &entry.option_images {
        // keys the target does not have are left alone
        let Some(option) = options.get_mut(key) else {
            continue;
        };
        match option.image().map(str::to_string) {
            None => {
                option.set_image(source);
                changes.push(Change::OptionImageAdded {
                    key: key.clone(),
                    image: source.clone(),
                });
            }
            Some(current) if mode == Mode::Canonicalize && current != *source => {
                option.set_image(source);
                changes.push(Change::OptionImageReplaced {
                    key: key.clone(),
                    from: current,
                    to: source.clone(),
                });
            }
            Some(_) => {}
        }
    }
    changes
}

/// Walks every target question, looks its text up in `index` and applies the entry.
pub fn run(
    exams: &mut [Exam],
    index: &SourceIndex,
    targets: &ExamScope,
    mode: Mode,
    stats: &mut PropagationStats,
) {
    for exam in exams.iter_mut().filter(|exam| targets.contains(&exam.exam_id)) {
        let before = stats.summary.total_questions_updated;
        for question in exam.questions.iter_mut() {
            let Some(entry) = index.lookup(question.text()) else {
                continue;
            };
            let changes = apply_entry(question, entry, mode);
            if !changes.is_empty() {
                debug!(
                    "[{:?}] {}#{}: {} change(s) from {}",
                    mode,
                    exam.exam_id,
                    question.id,
                    changes.len(),
                    entry.exam_id
                );
            }
            stats.record(&exam.exam_id, question, entry, changes);
        }
        let updated = stats.summary.total_questions_updated - before;
        if updated > 0 {
            info!("[{:?}] {} updated ({} questions)", mode, exam.exam_id, updated);
        }
    }
}

pub fn propagate(exams: &mut [Exam], index: &SourceIndex, targets: &ExamScope) -> PropagationStats {
    let mut stats = PropagationStats::default();
    run(exams, index, targets, Mode::Propagate, &mut stats);
    stats
}

pub fn canonicalize(exams: &mut [Exam], index: &SourceIndex, targets: &ExamScope) -> PropagationStats {
    let mut stats = PropagationStats::default();
    run(exams, index, targets, Mode::Canonicalize, &mut stats);
    stats
}
