use crate::libbanka::index::{ExamScope, SourceEntry, SourceIndex};
use crate::libbanka::model::{Exam, Question};
use crate::libbanka::normalize::lowercase_tr;
use crate::Error;
use indexmap::IndexMap;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

const CSV_TEXT_CHARS: usize = 200;
const MISSING_SAMPLE: usize = 10;

/// Phrases that mean the question refers to a picture.
const VISUAL_CUES: [&str; 12] = [
    "şekil",
    "şekle göre",
    "şekildeki",
    "resim",
    "görsel",
    "levha",
    "işaret",
    "gösterge",
    "ikaz ışığı",
    "yatay işaretleme",
    "taşıt yolu üzerine çizilen",
    "dönel kavşak",
];

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NeedsMainImage,
    HasSameMainImage,
    HasDifferentMainImage,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NeedsMainImage => "needs_main_image",
            Status::HasSameMainImage => "has_same_main_image",
            Status::HasDifferentMainImage => "has_different_main_image",
        }
    }
}

/// Where a repeated question stands against its source. A target with no image
/// only "needs" one when the source actually has a main image to give, and a
/// source without a main image never conflicts with the target's.
pub fn classify(question: &Question, entry: &SourceEntry) -> Status {
    match (question.main_image(), entry.main_image.as_deref()) {
        (None, Some(_)) => Status::NeedsMainImage,
        (_, None) => Status::HasSameMainImage,
        (current, source) if current == source => Status::HasSameMainImage,
        _ => Status::HasDifferentMainImage,
    }
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct Counters {
    pub total_questions: usize,
    pub repeated_questions: usize,
    pub can_add_main_images: usize,
    pub already_has_main_images: usize,
    pub conflicting_main_images: usize,
    pub option_images_candidates: usize,
}

impl Counters {
    fn count(&mut self, status: Status, option_candidates: usize) {
        self.repeated_questions += 1;
        match status {
            Status::NeedsMainImage => self.can_add_main_images += 1,
            Status::HasSameMainImage => self.already_has_main_images += 1,
            Status::HasDifferentMainImage => self.conflicting_main_images += 1,
        }
        self.option_images_candidates += option_candidates;
    }

    fn absorb(&mut self, other: &Counters) {
        self.total_questions += other.total_questions;
        self.repeated_questions += other.repeated_questions;
        self.can_add_main_images += other.can_add_main_images;
        self.already_has_main_images += other.already_has_main_images;
        self.conflicting_main_images += other.conflicting_main_images;
        self.option_images_candidates += other.option_images_candidates;
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    pub question_id: i64,
    pub question_text: String,
    pub status: Status,
    pub current_image: Option<String>,
    pub recommended_image: Option<String>,
    pub option_images: IndexMap<String, String>,
    pub source_exam_id: String,
}

#[derive(Serialize, Debug, Default, Clone)]
pub struct ExamBlock {
    #[serde(flatten)]
    pub counters: Counters,
    pub details: Vec<Detail>,
}

#[derive(Serialize, Debug, Default, Clone)]
pub struct Summary {
    pub total_target_exams: usize,
    pub source_questions: usize,
    #[serde(flatten)]
    pub counters: Counters,
}

#[derive(Serialize, Debug, Default, Clone)]
pub struct AnalysisReport {
    pub summary: Summary,
    pub exams: IndexMap<String, ExamBlock>,
}

/// Dry run of propagation: classifies every repeated target question, mutates nothing.
pub fn analyze(exams: &[Exam], index: &SourceIndex, targets: &ExamScope) -> AnalysisReport {
    let mut report = AnalysisReport::default();
    report.summary.source_questions = index.len();

    for exam in exams.iter().filter(|exam| targets.contains(&exam.exam_id)) {
        let mut block = ExamBlock::default();
        for question in &exam.questions {
            block.counters.total_questions += 1;
            let Some(entry) = index.lookup(question.text()) else {
                continue;
            };
            let status = classify(question, entry);
            block.counters.count(status, entry.option_images.len());
            block.details.push(Detail {
                question_id: question.id,
                question_text: question.text().to_string(),
                status,
                current_image: question.main_image().map(str::to_string),
                recommended_image: entry.main_image.clone(),
                option_images: entry.option_images.clone(),
                source_exam_id: entry.exam_id.clone(),
            });
        }
        report.summary.counters.absorb(&block.counters);
        report.summary.total_target_exams += 1;
        // a repeated exam ID merges into the first block
        match report.exams.get_mut(&exam.exam_id) {
            Some(existing) => {
                existing.counters.absorb(&block.counters);
                existing.details.extend(block.details);
            }
            None => {
                report.exams.insert(exam.exam_id.clone(), block);
            }
        }
    }
    info!(
        "[Analyze] {} target exams, {} repeated questions, {} can take a main image",
        report.summary.total_target_exams,
        report.summary.counters.repeated_questions,
        report.summary.counters.can_add_main_images
    );
    report
}

impl AnalysisReport {
    /// Rows worth acting on: repeated questions that still lack a main image.
    pub fn actionable(&self) -> impl Iterator<Item = (&str, &Detail)> {
        self.exams.iter().flat_map(|(exam_id, block)| {
            block
                .details
                .iter()
                .filter(|detail| detail.status == Status::NeedsMainImage)
                .map(move |detail| (exam_id.as_str(), detail))
        })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<usize, Error> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "examId",
            "questionId",
            "status",
            "currentImage",
            "recommendedImage",
            "questionText",
        ])?;
        let mut rows = 0;
        for (exam_id, detail) in self.actionable() {
            let text: String = detail
                .question_text
                .replace('\n', " ")
                .chars()
                .take(CSV_TEXT_CHARS)
                .collect();
            let question_id = detail.question_id.to_string();
            csv.write_record([
                exam_id,
                question_id.as_str(),
                detail.status.as_str(),
                detail.current_image.as_deref().unwrap_or_default(),
                detail.recommended_image.as_deref().unwrap_or_default(),
                text.as_str(),
            ])?;
            rows += 1;
        }
        csv.flush()?;
        Ok(rows)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissingQuestion {
    pub exam_id: String,
    pub question_id: i64,
    pub question_text: String,
    pub category: Option<String>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct MissingVisuals {
    pub total_still_missing: usize,
    pub by_exam: BTreeMap<String, usize>,
    pub sample_missing: Vec<MissingQuestion>,
}

pub fn needs_visual(question: &Question) -> bool {
    let text = lowercase_tr(question.text());
    VISUAL_CUES.iter().any(|cue| text.contains(cue))
}

/// Questions that talk about a picture but still have no main image.
pub fn missing_visuals(exams: &[Exam], scope: &ExamScope) -> MissingVisuals {
    let mut missing = MissingVisuals::default();
    for exam in exams.iter().filter(|exam| scope.contains(&exam.exam_id)) {
        for question in &exam.questions {
            if question.main_image().is_some() || !needs_visual(question) {
                continue;
            }
            missing.total_still_missing += 1;
            *missing.by_exam.entry(exam.exam_id.clone()).or_default() += 1;
            if missing.sample_missing.len() < MISSING_SAMPLE {
                missing.sample_missing.push(MissingQuestion {
                    exam_id: exam.exam_id.clone(),
                    question_id: question.id,
                    question_text: question.text().to_string(),
                    category: question.category().map(str::to_string),
                });
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libbanka::model::fixtures::exam;
    use serde_json::json;

    fn bank() -> Vec<Exam> {
        vec![
            exam(
                "src",
                json!([
                    { "id": 1, "questionText": "Şekildeki levha neyi bildirir?", "imageUrl": "levha.png",
                      "options": { "A": { "text": "a", "imageUrl": "opt_a.png" } } },
                    { "id": 2, "questionText": "Gösterge ışığı yanarsa?", "imageUrl": "gosterge.png" },
                    { "id": 3, "questionText": "Hangi dönüş?", "imageUrl": "donus.png" }
                ]),
            ),
            exam(
                "tgt",
                json!([
                    { "id": 10, "questionText": "Şekildeki levha\nneyi bildirir", "imageUrl": null },
                    { "id": 11, "questionText": "Gösterge ışığı yanarsa?", "imageUrl": "gosterge.png" },
                    { "id": 12, "questionText": "Hangi dönüş?", "imageUrl": "baska.png" },
                    { "id": 13, "questionText": "Yeni soru" }
                ]),
            ),
        ]
    }

    #[test]
    fn classifies_each_repeated_question_once() {
        let exams = bank();
        let index = SourceIndex::builder()
            .sources(ExamScope::only(["src"]))
            .build(&exams);
        let report = analyze(&exams, &index, &ExamScope::only(["tgt"]));

        let block = &report.exams["tgt"];
        let statuses: Vec<Status> = block.details.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                Status::NeedsMainImage,
                Status::HasSameMainImage,
                Status::HasDifferentMainImage
            ]
        );
        assert_eq!(block.counters.total_questions, 4);
        assert_eq!(block.counters.repeated_questions, 3);
        assert_eq!(report.summary.counters.option_images_candidates, 1);
        assert_eq!(report.summary.total_target_exams, 1);
        assert_eq!(report.summary.source_questions, 3);
        // nothing was written back
        assert_eq!(exams[1].questions[0].main_image(), None);
    }

    #[test]
    fn option_only_source_does_not_ask_for_a_main_image() {
        let exams = vec![
            exam(
                "src",
                json!([{ "id": 1, "questionText": "Soru", "options": { "A": { "text": "a", "imageUrl": "a.png" } } }]),
            ),
            exam("tgt", json!([{ "id": 1, "questionText": "Soru" }])),
        ];
        let index = SourceIndex::builder()
            .sources(ExamScope::only(["src"]))
            .build(&exams);
        let report = analyze(&exams, &index, &ExamScope::only(["tgt"]));
        assert_eq!(report.exams["tgt"].details[0].status, Status::HasSameMainImage);
    }

    #[test]
    fn option_only_source_leaves_own_main_image_alone() {
        let mut exams = vec![
            exam(
                "src",
                json!([{ "id": 1, "questionText": "Soru", "options": { "A": { "text": "a", "imageUrl": "a.png" } } }]),
            ),
            exam(
                "tgt",
                json!([{ "id": 1, "questionText": "Soru", "imageUrl": "kendi.png",
                         "options": { "A": "a" } }]),
            ),
        ];
        let index = SourceIndex::builder()
            .sources(ExamScope::only(["src"]))
            .build(&exams);
        let targets = ExamScope::only(["tgt"]);
        let report = analyze(&exams, &index, &targets);
        assert_eq!(report.exams["tgt"].details[0].status, Status::HasSameMainImage);
        assert_eq!(report.summary.counters.conflicting_main_images, 0);

        let stats = crate::libbanka::propagate::canonicalize(&mut exams, &index, &targets);
        assert_eq!(stats.summary.main_images_replaced, 0);
        assert_eq!(exams[1].questions[0].main_image(), Some("kendi.png"));
    }

    #[test]
    fn csv_lists_only_actionable_rows() {
        let exams = bank();
        let index = SourceIndex::builder()
            .sources(ExamScope::only(["src"]))
            .build(&exams);
        let report = analyze(&exams, &index, &ExamScope::only(["tgt"]));

        let mut out = Vec::new();
        let rows = report.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(rows, 1);
        assert_eq!(
            lines[0],
            "examId,questionId,status,currentImage,recommendedImage,questionText"
        );
        assert_eq!(
            lines[1],
            "tgt,10,needs_main_image,,levha.png,Şekildeki levha neyi bildirir"
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn report_serializes_status_names() {
        let exams = bank();
        let index = SourceIndex::builder()
            .sources(ExamScope::only(["src"]))
            .build(&exams);
        let report = serde_json::to_value(analyze(&exams, &index, &ExamScope::only(["tgt"]))).unwrap();
        assert_eq!(report["summary"]["can_add_main_images"], json!(1));
        assert_eq!(
            report["exams"]["tgt"]["details"][2]["status"],
            json!("has_different_main_image")
        );
    }

    #[test]
    fn finds_visual_questions_without_images() {
        let exams = bank();
        let missing = missing_visuals(&exams, &ExamScope::only(["tgt"]));
        assert_eq!(missing.total_still_missing, 1);
        assert_eq!(missing.by_exam["tgt"], 1);
        assert_eq!(missing.sample_missing[0].question_id, 10);
    }
}
