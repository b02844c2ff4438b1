use crate::libbanka::analyze::{analyze as analyze_targets, missing_visuals, MissingVisuals};
use crate::libbanka::assets::{Downloader, HttpFetcher};
use crate::libbanka::category::categorize as categorize_questions;
use crate::libbanka::index::{ExamScope, SourceIndex};
use crate::libbanka::maintenance::{
    backfill_explanations, merge_imported, remove_exam as remove, MergeOutcome, RemoveOutcome,
};
use crate::libbanka::model::{Exam, Question};
use crate::libbanka::propagate::{self, Mode, PropagationStats};
use crate::libbanka::store;
use crate::{Error, Selection};
use colored::Colorize;
use log::{info, warn};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Serialize)]
struct PropagationReport<'a> {
    mode: Mode,
    source_questions: usize,
    index_collisions: usize,
    sources: &'a ExamScope,
    targets: &'a ExamScope,
    #[serde(flatten)]
    stats: &'a PropagationStats,
    remaining_missing: MissingVisuals,
}

fn build_index(exams: &[Exam], selection: &Selection) -> SourceIndex {
    SourceIndex::builder()
        .sources(selection.sources())
        .exclude(&selection.exclude)
        .verify_root(selection.verify_root.clone())
        .build(exams)
}

fn or_none(ids: &std::collections::BTreeSet<String>) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

pub(crate) fn propagate(
    bank: &Path,
    selection: &Selection,
    report: &Path,
    mode: Mode,
) -> Result<(), Error> {
    let mut exams = store::load_bank(bank)?;
    let index = build_index(&exams, selection);
    if index.is_empty() {
        warn!("[{:?}] No illustrated questions in the source exams", mode);
        println!("{}", "No source images found, nothing to do.".yellow());
        return Ok(());
    }

    let targets = selection.targets();
    let stats = match mode {
        Mode::Propagate => propagate::propagate(&mut exams, &index, &targets),
        Mode::Canonicalize => propagate::canonicalize(&mut exams, &index, &targets),
    };

    if stats.is_empty() {
        println!("{}", "No update needed.".yellow());
    } else {
        store::save_bank(bank, &exams)?;
        println!("{}", format!("{:?} updated!", bank).green());
    }

    let body = PropagationReport {
        mode,
        source_questions: index.len(),
        index_collisions: index.collisions(),
        sources: index.scope(),
        targets: &targets,
        stats: &stats,
        remaining_missing: missing_visuals(&exams, &targets),
    };
    store::save_json(report, &body)?;

    let summary = &stats.summary;
    println!("{}", "Summary:".cyan());
    println!("  - Questions updated: {}", summary.total_questions_updated);
    println!("  - Main images added: {}", summary.main_images_added);
    if mode == Mode::Canonicalize {
        println!("  - Main images replaced: {}", summary.main_images_replaced);
    }
    println!("  - Option images added: {}", summary.option_images_added);
    if mode == Mode::Canonicalize {
        println!("  - Option images replaced: {}", summary.option_images_replaced);
    }
    println!("  - Exams affected: {}", or_none(&summary.exams_affected));
    println!("  - Source questions: {}", index.len());
    println!(
        "  - Still missing a visual: {}",
        body.remaining_missing.total_still_missing
    );
    println!("{}", format!("Report saved to {:?}", report).cyan());
    Ok(())
}

pub(crate) fn analyze(
    bank: &Path,
    selection: &Selection,
    report: &Path,
    csv: &Path,
) -> Result<(), Error> {
    let exams = store::load_bank(bank)?;
    let index = build_index(&exams, selection);
    let analysis = analyze_targets(&exams, &index, &selection.targets());

    store::save_json(report, &analysis)?;
    let mut rows = 0;
    store::write_atomic(csv, |writer| {
        rows = analysis.write_csv(writer)?;
        Ok(())
    })?;
    info!("[Analyze] {} actionable rows written to {:?}", rows, csv);

    let summary = &analysis.summary;
    println!("{}", "Summary:".cyan());
    println!("  - Target exams: {}", summary.total_target_exams);
    println!("  - Questions: {}", summary.counters.total_questions);
    println!("  - Repeated questions: {}", summary.counters.repeated_questions);
    println!(
        "  - Can take a main image: {}",
        summary.counters.can_add_main_images
    );
    println!(
        "  - Already has the same main image: {}",
        summary.counters.already_has_main_images
    );
    println!(
        "  - Has a different main image: {}",
        summary.counters.conflicting_main_images
    );
    println!(
        "  - Option image candidates: {}",
        summary.counters.option_images_candidates
    );
    println!("{}", format!("JSON: {:?}", report).cyan());
    println!("{}", format!("CSV : {:?}", csv).cyan());
    Ok(())
}

pub(crate) fn categorize(path: &Path) -> Result<(), Error> {
    let mut questions: Vec<Question> = store::load_json(path)?;
    let counts = categorize_questions(&mut questions);
    store::save_json(path, &questions)?;

    println!("{}", "Categorization done!".green());
    println!("{}", "Distribution:".cyan());
    for (category, count) in &counts {
        println!("  - {}: {} questions", category, count);
    }
    println!("Total: {} questions updated.", questions.len());
    Ok(())
}

pub(crate) fn remove_exam(bank: &Path, exam_id: &str) -> Result<(), Error> {
    let mut exams = store::load_bank(bank)?;
    match remove(&mut exams, exam_id) {
        RemoveOutcome::Removed(_) => {
            store::save_bank(bank, &exams)?;
            println!("{}", format!("Removed exam '{}'.", exam_id).green());
        }
        RemoveOutcome::NotFound => {
            println!("{}", format!("Exam '{}' not found.", exam_id).yellow());
        }
    }
    Ok(())
}

pub(crate) fn fix_explanations(bank: &Path, placeholder: &str) -> Result<(), Error> {
    let mut exams = store::load_bank(bank)?;
    let fixed = backfill_explanations(&mut exams, placeholder);
    if fixed > 0 {
        store::save_bank(bank, &exams)?;
        println!(
            "{}",
            format!("Fixed {} questions by adding the default explanation.", fixed).green()
        );
    } else {
        println!("{}", "No questions found missing explanations.".yellow());
    }
    Ok(())
}

pub(crate) fn merge(bank: &Path, from: &Path, exam_id: &str, exam_name: &str) -> Result<(), Error> {
    let questions: Vec<Question> = store::load_json(from)?;
    let mut exams = store::load_bank(bank)?;
    let count = questions.len();
    let outcome = merge_imported(&mut exams, exam_id, exam_name, questions);
    store::save_bank(bank, &exams)?;

    if let MergeOutcome::Replaced(_) = outcome {
        println!("{}", format!("Exam {} already existed and was replaced.", exam_id).yellow());
    }
    println!(
        "{}",
        format!("Added exam '{}' with {} questions.", exam_name, count).green()
    );
    Ok(())
}

pub(crate) fn download(bank: &Path, dir: &Path, timeout_secs: u64) -> Result<(), Error> {
    let mut exams = store::load_bank(bank)?;
    let fetcher = HttpFetcher::new(Duration::from_secs(timeout_secs))?;
    let mut downloader = Downloader::new(&fetcher, dir);
    downloader.run(&mut exams)?;

    let stats = &downloader.stats;
    if stats.rewritten > 0 {
        store::save_bank(bank, &exams)?;
    }
    println!(
        "{}",
        format!("Migration complete. Downloaded/Updated: {}", stats.rewritten).green()
    );
    if stats.failed > 0 {
        println!(
            "{}",
            format!("{} images could not be fetched and keep their URL.", stats.failed).yellow()
        );
    }
    Ok(())
}

fn image_label(image: Option<&str>) -> colored::ColoredString {
    match image {
        Some(image) => image.green(),
        None => "-".red(),
    }
}

pub(crate) fn inspect(bank: &Path, exam_id: &str, question_id: Option<i64>) -> Result<(), Error> {
    let exams = store::load_bank(bank)?;
    let Some(exam) = exams.iter().find(|exam| exam.exam_id == exam_id) else {
        println!("{}", format!("Exam '{}' not found.", exam_id).yellow());
        return Ok(());
    };

    println!(
        "{}",
        format!(
            "==========> {} ({} questions) <==========",
            exam.name().unwrap_or(&exam.exam_id),
            exam.questions.len()
        )
        .cyan()
    );
    for question in exam
        .questions
        .iter()
        .filter(|question| question_id.is_none_or(|id| question.id == id))
    {
        let excerpt: String = question.text().chars().take(50).collect();
        println!("{} {}", format!("{}.", question.id).bold(), excerpt);
        println!("   Main image: {}", image_label(question.main_image()));
        for (key, option) in question.options.iter().flatten() {
            println!("     {}: {}", key, image_label(option.image()));
        }
    }
    Ok(())
}
