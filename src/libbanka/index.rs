use crate::libbanka::model::{is_remote_url, Exam, Question};
use crate::libbanka::normalize::normalize;
use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

const EXTENSION_ORDER: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "svg"];

/// A set of exams picked by ID. `include: None` means every exam not excluded.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ExamScope {
    pub include: Option<BTreeSet<String>>,
    pub exclude: BTreeSet<String>,
}

impl ExamScope {
    pub fn only<I, S>(ids: I) -> ExamScope
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExamScope {
            include: Some(ids.into_iter().map(Into::into).collect()),
            exclude: BTreeSet::new(),
        }
    }

    pub fn all_except<I, S>(ids: I) -> ExamScope
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExamScope {
            include: None,
            exclude: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn excluding<I, S>(mut self, ids: I) -> ExamScope
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, exam_id: &str) -> bool {
        !self.exclude.contains(exam_id)
            && self
                .include
                .as_ref()
                .is_none_or(|include| include.contains(exam_id))
    }
}

/// Images known for one question text, and where they were found.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub main_image: Option<String>,
    pub option_images: IndexMap<String, String>,
    pub exam_id: String,
    pub question_id: i64,
}

impl SourceEntry {
    pub fn image_count(&self) -> usize {
        usize::from(self.main_image.is_some()) + self.option_images.len()
    }

    fn extension_rank(&self) -> usize {
        self.main_image
            .as_deref()
            .map(extension_rank)
            .unwrap_or(EXTENSION_ORDER.len() + 1)
    }

    /// Richer entries win; on equal image count the better-ranked extension wins.
    /// A full tie keeps the entry already in the index.
    fn beats(&self, other: &SourceEntry) -> bool {
        match self.image_count().cmp(&other.image_count()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.extension_rank() < other.extension_rank(),
        }
    }
}

fn extension_rank(image: &str) -> usize {
    let path = image.split(['?', '#']).next().unwrap_or(image);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            EXTENSION_ORDER
                .iter()
                .position(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(EXTENSION_ORDER.len())
}

#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    pub sources: ExamScope,
    pub verify_root: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct SourceIndexBuilder {
    config: IndexConfig,
}

impl SourceIndexBuilder {
    pub fn sources(mut self, scope: ExamScope) -> Self {
        self.config.sources = scope;
        self
    }

    pub fn exclude<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.sources = self.config.sources.excluding(ids);
        self
    }

    /// Local image paths are only trusted when they exist under `root`.
    pub fn verify_root(mut self, root: Option<PathBuf>) -> Self {
        self.config.verify_root = root;
        self
    }

    pub fn build(self, exams: &[Exam]) -> SourceIndex {
        SourceIndex::build(self.config, exams)
    }
}

/// Normalized question text -> best known images for it.
#[derive(Debug, Default)]
pub struct SourceIndex {
    config: IndexConfig,
    entries: HashMap<String, SourceEntry>,
    collisions: usize,
}

impl SourceIndex {
    pub fn builder() -> SourceIndexBuilder {
        SourceIndexBuilder::default()
    }

    fn build(config: IndexConfig, exams: &[Exam]) -> SourceIndex {
        let now = Instant::now();
        let scope = config.sources.clone();
        let mut index = SourceIndex {
            config,
            ..Default::default()
        };
        let mut scanned = 0;
        for exam in exams.iter().filter(|exam| scope.contains(&exam.exam_id)) {
            scanned += 1;
            for question in &exam.questions {
                index.insert(&exam.exam_id, question);
            }
        }
        info!(
            "[Index] {} question texts with images from {} source exams ({} collisions)",
            index.entries.len(),
            scanned,
            index.collisions
        );
        debug!("[Index] Building took {} ms.", now.elapsed().as_millis());
        index
    }

    fn trusted(&self, image: &str) -> bool {
        match &self.config.verify_root {
            Some(root) if !is_remote_url(image) => root.join(image).exists(),
            _ => true,
        }
    }

    fn insert(&mut self, exam_id: &str, question: &Question) {
        let key = normalize(question.text());
        if key.is_empty() {
            return;
        }
        let mut option_images = question.option_images();
        option_images.retain(|_, image| self.trusted(image));
        let candidate = SourceEntry {
            main_image: question
                .main_image()
                .filter(|image| self.trusted(image))
                .map(str::to_string),
            option_images,
            exam_id: exam_id.to_string(),
            question_id: question.id,
        };
        if candidate.image_count() == 0 {
            return;
        }

        match self.entries.get(&key) {
            None => {
                self.entries.insert(key, candidate);
            }
            Some(existing) => {
                self.collisions += 1;
                if candidate.beats(existing) {
                    debug!(
                        "[Index] {}#{} replaces {}#{} for {:?}",
                        candidate.exam_id,
                        candidate.question_id,
                        existing.exam_id,
                        existing.question_id,
                        key
                    );
                    self.entries.insert(key, candidate);
                }
            }
        }
    }

    /// Looks up raw question text. Text that normalizes to nothing never matches.
    pub fn lookup(&self, text: &str) -> Option<&SourceEntry> {
        let key = normalize(text);
        if key.is_empty() {
            return None;
        }
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn scope(&self) -> &ExamScope {
        &self.config.sources
    }
}
