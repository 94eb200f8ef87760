//! Output target reservation.
//!
//! Writers call [`reserve_output`] before producing any bytes. It either
//! returns a stem whose targets are all free, or fails without touching the
//! destination.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DestinationOptions;
use crate::error::{ConversionError, Result};
use crate::naming;
use crate::sample_data::SampleData;

/// True if `path` is a file, or a directory with entries.
fn is_occupied(path: &Path) -> bool {
    if path.is_dir() {
        fs::read_dir(path).map(|mut d| d.next().is_some()).unwrap_or(true)
    } else {
        path.exists()
    }
}

/// Reserve the output names for one multi-sample.
///
/// `targets` maps a candidate stem to the paths (relative to `folder`) that
/// the writer will create, e.g. `Piano.sfz` and the sample folder `Piano`.
/// The destination folder is created if needed. If one of the targets is
/// occupied this fails with [`ConversionError::DestinationExists`], unless
/// `add_new_files` is set, in which case a numeric suffix is appended to the
/// stem until all targets are free.
pub fn reserve_output(
    folder: &Path,
    stem: &str,
    targets: impl Fn(&str) -> Vec<PathBuf>,
    options: &DestinationOptions,
) -> Result<String> {
    fs::create_dir_all(folder)?;
    let stem = naming::safe_file_name(stem);
    let taken = |candidate: &str| targets(candidate).iter().any(|t| is_occupied(&folder.join(t)));

    if !taken(&stem) {
        return Ok(stem);
    }
    if !options.add_new_files {
        let first = targets(&stem)
            .into_iter()
            .map(|t| folder.join(t))
            .find(|p| is_occupied(p))
            .unwrap_or_else(|| folder.join(&stem));
        return Err(ConversionError::DestinationExists(first));
    }
    let unique = naming::unique_name(&stem, taken);
    log::info!("Output {} exists, writing {} instead", stem, unique);
    Ok(unique)
}

/// Targets of a writer that creates `<stem>.<extension>` and a `<stem>` sample folder.
pub fn file_and_folder(extension: &str) -> impl Fn(&str) -> Vec<PathBuf> + '_ {
    move |stem: &str| vec![PathBuf::from(format!("{}.{}", stem, extension)), PathBuf::from(stem)]
}

/// Targets of a writer that creates the single file `<stem>.<extension>`.
pub fn single_file(extension: &str) -> impl Fn(&str) -> Vec<PathBuf> + '_ {
    move |stem: &str| vec![PathBuf::from(format!("{}.{}", stem, extension))]
}

/// Write `sample` as WAV file to `path`. A partial file is removed on failure.
pub fn write_sample_file(sample: &dyn SampleData, path: &Path) -> Result<()> {
    let result = File::create(path).map_err(ConversionError::from).and_then(|file| {
        let mut out = BufWriter::new(file);
        sample.write_sample(&mut out)?;
        out.flush()?;
        Ok(())
    });
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

/// One file name per distinct sample, in order of first use.
///
/// Zones that share a sample share its file. Names are made unique
/// case-insensitively.
#[derive(Debug, Default)]
pub struct SampleFileNames {
    assigned: Vec<(usize, String)>,
}

impl SampleFileNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// The file name for `sample` and whether it was newly assigned.
    pub fn name_for(&mut self, sample: &Arc<dyn SampleData>, wanted: &str) -> (String, bool) {
        let key = Arc::as_ptr(sample) as *const () as usize;
        if let Some((_, name)) = self.assigned.iter().find(|(k, _)| *k == key) {
            return (name.clone(), false);
        }
        let name = naming::unique_name(wanted, |candidate| {
            self.assigned.iter().any(|(_, n)| n.eq_ignore_ascii_case(candidate))
        });
        self.assigned.push((key, name.clone()));
        (name, true)
    }

    /// Release the name of `sample` after its file could not be written.
    pub fn forget(&mut self, sample: &Arc<dyn SampleData>) {
        let key = Arc::as_ptr(sample) as *const () as usize;
        self.assigned.retain(|(k, _)| *k != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_data::PcmSampleData;

    #[test]
    fn test_free_target() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let stem = reserve_output(&out, "Piano", file_and_folder("sfz"), &DestinationOptions::default()).unwrap();
        assert_eq!(stem, "Piano");
        assert!(out.is_dir());
    }

    #[test]
    fn test_existing_target_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Piano.sfz"), "x").unwrap();
        let err = reserve_output(dir.path(), "Piano", file_and_folder("sfz"), &DestinationOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConversionError::DestinationExists(p) if p.ends_with("Piano.sfz")));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_empty_folder_is_not_occupied() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Piano")).unwrap();
        let stem = reserve_output(dir.path(), "Piano", file_and_folder("sfz"), &DestinationOptions::default()).unwrap();
        assert_eq!(stem, "Piano");
    }

    #[test]
    fn test_add_new_files_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Piano.sf2"), "x").unwrap();
        fs::write(dir.path().join("Piano-1.sf2"), "x").unwrap();
        let options = DestinationOptions {
            add_new_files: true,
            ..Default::default()
        };
        let stem = reserve_output(dir.path(), "Piano", single_file("sf2"), &options).unwrap();
        assert_eq!(stem, "Piano-2");
    }

    #[test]
    fn test_shared_samples_share_a_file_name() {
        let a: Arc<dyn SampleData> = Arc::new(PcmSampleData::new("a", 1, 44100, 16, vec![0; 4]));
        let b: Arc<dyn SampleData> = Arc::new(PcmSampleData::new("b", 1, 44100, 16, vec![0; 4]));
        let mut names = SampleFileNames::new();
        assert_eq!(names.name_for(&a, "Piano"), ("Piano".to_string(), true));
        assert_eq!(names.name_for(&b, "piano"), ("piano-1".to_string(), true));
        assert_eq!(names.name_for(&a, "Other"), ("Piano".to_string(), false));

        names.forget(&a);
        assert_eq!(names.name_for(&a, "Other"), ("Other".to_string(), true));
    }

    #[test]
    fn test_write_sample_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let pcm = PcmSampleData::new("a", 1, 44100, 16, vec![1, 2, 3]);
        write_sample_file(&pcm, &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 44);
        assert!(write_sample_file(&pcm, &dir.path().join("missing").join("a.wav")).is_err());
    }
}
