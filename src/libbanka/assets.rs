use crate::libbanka::model::{is_remote_url, AnswerOption, Exam};
use crate::libbanka::store::write_atomic;
use crate::Error;
use log::{debug, error, info, warn};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_EXTENSION: &str = "jpg";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Error>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<HttpFetcher, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// `sha256(url).ext`, keeping the extension of the URL path when it has one.
pub fn local_file_name(url: &str) -> String {
    let extension = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            Path::new(parsed.path())
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let hash = Sha256::digest(url.as_bytes());
    format!("{:x}.{}", hash, extension)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadStats {
    pub fetched: usize,
    pub cached: usize,
    pub failed: usize,
    pub rewritten: usize,
}

/// Exam IDs name the per-exam directory, so they must be one plain path component.
fn is_safe_dir_name(exam_id: &str) -> bool {
    let mut components = Path::new(exam_id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

pub struct Downloader<'a, F: Fetch> {
    fetcher: &'a F,
    dir: PathBuf,
    failed_urls: HashSet<String>,
    pub stats: DownloadStats,
}

impl<'a, F: Fetch> Downloader<'a, F> {
    pub fn new(fetcher: &'a F, dir: &Path) -> Self {
        Downloader {
            fetcher,
            dir: dir.to_path_buf(),
            failed_urls: HashSet::new(),
            stats: DownloadStats::default(),
        }
    }

    /// Local path for `url`, fetching it first unless already on disk.
    /// `Ok(None)` means the fetch failed and the URL should stay as it is.
    fn localize(&mut self, url: &str, exam_id: &str) -> Result<Option<String>, Error> {
        let path = self.dir.join(exam_id).join(local_file_name(url));
        let reference = path.to_string_lossy().into_owned();
        if path.exists() {
            debug!("[Assets] Cached {} -> {}", url, reference);
            self.stats.cached += 1;
            return Ok(Some(reference));
        }

        if self.failed_urls.contains(url) {
            debug!("[Assets] Already failed this run, skipping {}", url);
            self.stats.failed += 1;
            return Ok(None);
        }

        info!("[Assets] Downloading {}...", url);
        let bytes = match self.fetcher.fetch(url) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("[Assets] Error downloading {}: {}", url, err);
                self.failed_urls.insert(url.to_string());
                self.stats.failed += 1;
                return Ok(None);
            }
        };
        write_atomic(&path, |writer| {
            writer.write_all(&bytes)?;
            Ok(())
        })?;
        self.stats.fetched += 1;
        Ok(Some(reference))
    }

    fn rewrite(&mut self, slot: &mut String, exam_id: &str) -> Result<(), Error> {
        if !is_remote_url(slot) {
            return Ok(());
        }
        if let Some(local) = self.localize(slot, exam_id)? {
            *slot = local;
            self.stats.rewritten += 1;
        }
        Ok(())
    }

    /// Replaces every remote main and option image with a local copy.
    pub fn run(&mut self, exams: &mut [Exam]) -> Result<(), Error> {
        for exam in exams.iter_mut() {
            if !is_safe_dir_name(&exam.exam_id) {
                warn!(
                    "[Assets] Skipping exam {:?}: its ID is not a usable directory name",
                    exam.exam_id
                );
                continue;
            }
            let exam_id = exam.exam_id.clone();
            for question in exam.questions.iter_mut() {
                if let Some(Some(image)) = question.image_url.as_mut() {
                    self.rewrite(image, &exam_id)?;
                }
                for option in question.options.iter_mut().flat_map(|options| options.values_mut()) {
                    if let AnswerOption::Illustrated(option) = option {
                        if let Some(Some(image)) = option.image_url.as_mut() {
                            self.rewrite(image, &exam_id)?;
                        }
                    }
                }
            }
        }
        info!(
            "[Assets] {} fetched, {} cached, {} failed",
            self.stats.fetched, self.stats.cached, self.stats.failed
        );
        Ok(())
    }
}
