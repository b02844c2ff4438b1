use crate::libbanka::model::Exam;
use crate::Error;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let now = Instant::now();
    let json = fs::read_to_string(path)?;
    let value = serde_json::from_str(&json).map_err(|source| Error::MalformedJson {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("[Store] Reading {:?} took {} ms.", path, now.elapsed().as_millis());
    Ok(value)
}

pub(crate) fn load_bank(path: &Path) -> Result<Vec<Exam>, Error> {
    let exams: Vec<Exam> = load_json(path)?;
    info!("[Store] Loaded {} exams from {:?}", exams.len(), path);
    Ok(exams)
}

/// Mode given to files that did not exist before the write.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

/// Permissions the replaced file should end up with: the target's own, or the
/// default for new files.
fn target_permissions(path: &Path) -> Result<Option<fs::Permissions>, Error> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.permissions())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(new_file_permissions()),
        Err(err) => Err(err.into()),
    }
}

/// Writes through a temporary file in the target's directory and renames it over
/// the target, so an interrupted run leaves the old file intact.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut dyn Write) -> Result<(), Error>,
{
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    if let Some(permissions) = target_permissions(path)? {
        file.as_file().set_permissions(permissions)?;
    }
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}

pub(crate) fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    let now = Instant::now();
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(writer, value)?;
        Ok(())
    })?;
    debug!("[Store] Writing {:?} took {} ms.", path, now.elapsed().as_millis());
    Ok(())
}

pub(crate) fn save_bank(path: &Path, exams: &[Exam]) -> Result<(), Error> {
    save_json(path, exams)?;
    info!("[Store] Saved {} exams to {:?}", exams.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BANK: &str = r#"[
  {
    "examId": "deneme_sinavi_1",
    "examName": "Ehliyet Deneme Sınavı - 1",
    "questions": [
      {
        "id": 1,
        "questionText": "Şekildeki levha neyi bildirir?",
        "imageUrl": null,
        "options": {
          "A": "Dur",
          "B": {
            "text": "Yol ver",
            "imageUrl": "assets/images/b.png"
          }
        },
        "correctAnswer": "A"
      }
    ],
    "difficulty": "kolay"
  }
]"#;

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = load_bank(&dir.path().join("exams.json")).unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn malformed_json_is_reported_and_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exams.json");
        fs::write(&path, "[{ \"examId\": ").unwrap();
        let err = load_bank(&path).unwrap_err();
        assert!(matches!(err, Error::MalformedJson { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{ \"examId\": ");
    }

    #[test]
    fn unmodified_bank_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("exams.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, BANK).unwrap();

        let exams = load_bank(&path).unwrap();
        save_bank(&path, &exams).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), BANK);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn failed_write_keeps_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exams.json");
        fs::write(&path, "[]").unwrap();

        let result = write_atomic(&path, |writer| {
            writer.write_all(b"[{")?;
            Err(Error::MissingInput(path.clone()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[cfg(unix)]
    #[test]
    fn saving_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exams.json");
        fs::write(&path, BANK).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o664)).unwrap();

        let exams = load_bank(&path).unwrap();
        save_bank(&path, &exams).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o664);

        let report = dir.path().join("analysis").join("report.json");
        save_json(&report, &exams).unwrap();
        let mode = fs::metadata(&report).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
