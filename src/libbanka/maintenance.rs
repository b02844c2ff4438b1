use crate::libbanka::model::{Exam, Question};
use log::{info, warn};

pub const PLACEHOLDER_EXPLANATION: &str = "Açıklama henüz eklenmedi.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(usize),
    NotFound,
}

pub fn remove_exam(exams: &mut Vec<Exam>, exam_id: &str) -> RemoveOutcome {
    let before = exams.len();
    exams.retain(|exam| exam.exam_id != exam_id);
    match before - exams.len() {
        0 => {
            warn!("[Bank] Exam '{}' not found", exam_id);
            RemoveOutcome::NotFound
        }
        removed => {
            info!("[Bank] Removed exam '{}' ({} record(s))", exam_id, removed);
            RemoveOutcome::Removed(removed)
        }
    }
}

/// Gives every question with a missing or `null` explanation the placeholder text.
pub fn backfill_explanations(exams: &mut [Exam], placeholder: &str) -> usize {
    let mut fixed = 0;
    for question in exams.iter_mut().flat_map(|exam| exam.questions.iter_mut()) {
        if question.explanation().is_none() {
            question.explanation = Some(Some(placeholder.to_string()));
            fixed += 1;
        }
    }
    fixed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Replaced(usize),
}

/// Wraps imported questions in a new exam and appends it, dropping any exam with the same ID first.
pub fn merge_imported(
    exams: &mut Vec<Exam>,
    exam_id: &str,
    exam_name: &str,
    questions: Vec<Question>,
) -> MergeOutcome {
    let before = exams.len();
    exams.retain(|exam| exam.exam_id != exam_id);
    let replaced = before - exams.len();
    if replaced > 0 {
        warn!("[Bank] Exam '{}' already exists. Replacing it.", exam_id);
    }
    info!(
        "[Bank] Adding exam '{}' with {} questions",
        exam_name,
        questions.len()
    );
    exams.push(Exam::new(exam_id, exam_name, questions));
    match replaced {
        0 => MergeOutcome::Added,
        n => MergeOutcome::Replaced(n),
    }
}
