//! Reader and writer capabilities and the folder scan.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::config::DestinationOptions;
use crate::error::{ConversionError, Result};
use crate::metadata::MetadataConfig;
use crate::notifier::{keys, Notifier};
use crate::sample_data::{FileSampleData, SampleData};
use crate::source::{MultisampleSource, PerformanceSource};

/// What a reader needs from its caller.
#[derive(Clone, Copy)]
pub struct DetectContext<'a> {
    pub notifier: &'a dyn Notifier,
    pub metadata: &'a dyn MetadataConfig,
}

impl<'a> DetectContext<'a> {
    pub fn new(notifier: &'a dyn Notifier, metadata: &'a dyn MetadataConfig) -> Self {
        Self { notifier, metadata }
    }

    /// Reference a sample file, or report it missing.
    ///
    /// The file is not opened here; its content is read when needed.
    pub fn open_sample(&self, path: &Path) -> Option<Arc<dyn SampleData>> {
        if path.is_file() {
            Some(Arc::new(FileSampleData::new(path)))
        } else {
            self.notifier.log_error(keys::SAMPLE_MISSING, &[&path.display()]);
            None
        }
    }
}

/// What a writer needs from its caller.
#[derive(Clone, Copy)]
pub struct CreateContext<'a> {
    pub notifier: &'a dyn Notifier,
    pub options: &'a DestinationOptions,
}

impl<'a> CreateContext<'a> {
    pub fn new(notifier: &'a dyn Notifier, options: &'a DestinationOptions) -> Self {
        Self { notifier, options }
    }
}

/// Reads one source format.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower-case file extensions without dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Read all multi-samples of one file.
    fn read_file(&self, path: &Path, ctx: &DetectContext) -> Result<Vec<MultisampleSource>>;

    /// Read a file holding several instruments played together.
    fn read_performance(&self, _path: &Path, _ctx: &DetectContext) -> Result<Option<PerformanceSource>> {
        Ok(None)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions().iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Writes one destination format.
pub trait Creator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write `source` into `folder`, returning the main file written.
    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf>;

    fn supports_performance(&self) -> bool {
        false
    }

    fn create_performance(
        &self,
        _folder: &Path,
        performance: &PerformanceSource,
        _ctx: &CreateContext,
    ) -> Result<PathBuf> {
        Err(ConversionError::Unsupported(format!(
            "{} cannot write performance {}",
            self.name(),
            performance.name
        )))
    }
}

fn matching_files(folder: &Path, detector: &dyn Detector) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && detector.accepts(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Folder names between `root` and the folder containing `file`.
pub fn folder_parts(root: &Path, file: &Path) -> Vec<String> {
    let parent = file.parent().unwrap_or(root);
    let relative = parent.strip_prefix(root).unwrap_or(parent);
    let mut parts: Vec<String> = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .into_iter()
        .collect();
    parts.extend(relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()));
    parts
}

fn is_cancelled(cancel: Option<&AtomicBool>, notifier: &dyn Notifier) -> bool {
    let cancelled = cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false);
    if cancelled {
        notifier.log(keys::CANCELLED, &[]);
    }
    cancelled
}

fn report_failure(path: &Path, error: &ConversionError, notifier: &dyn Notifier) {
    match error {
        ConversionError::Encrypted(what) => notifier.log(keys::ENCRYPTED, &[&path.display(), what]),
        ConversionError::Unsupported(what) => notifier.log(keys::UNSUPPORTED_VERSION, &[&path.display(), what]),
        other => notifier.log_error(keys::FILE_FAILED, &[&path.display(), other]),
    }
}

/// Read every matching file below `folder`.
///
/// Files are visited in name order. A file that fails is reported and
/// skipped; sources without any zone are dropped. Cancellation is checked
/// between files.
pub fn detect(
    folder: &Path,
    detector: &dyn Detector,
    ctx: &DetectContext,
    cancel: Option<&AtomicBool>,
) -> Vec<MultisampleSource> {
    let mut result = Vec::new();
    for path in matching_files(folder, detector) {
        if is_cancelled(cancel, ctx.notifier) {
            break;
        }
        ctx.notifier.log(keys::ANALYZING, &[&path.display()]);
        match detector.read_file(&path, ctx) {
            Ok(sources) => {
                for mut source in sources {
                    source.remove_empty_groups();
                    if source.zone_count() == 0 {
                        ctx.notifier.log_error(keys::SOURCE_SKIPPED_NO_ZONES, &[&source.name]);
                        continue;
                    }
                    if source.folder_parts.is_empty() {
                        source.folder_parts = folder_parts(folder, &path);
                    }
                    source.guess_metadata(ctx.metadata);
                    ctx.notifier.log(keys::DETECTED, &[&source.name, &source.zone_count()]);
                    result.push(source);
                }
            }
            Err(e) => report_failure(&path, &e, ctx.notifier),
        }
    }
    result
}

/// Read every matching file below `folder` as a performance.
pub fn detect_performances(
    folder: &Path,
    detector: &dyn Detector,
    ctx: &DetectContext,
    cancel: Option<&AtomicBool>,
) -> Vec<PerformanceSource> {
    let mut result = Vec::new();
    for path in matching_files(folder, detector) {
        if is_cancelled(cancel, ctx.notifier) {
            break;
        }
        ctx.notifier.log(keys::ANALYZING, &[&path.display()]);
        match detector.read_performance(&path, ctx) {
            Ok(Some(mut performance)) => {
                let parts = folder_parts(folder, &path);
                performance.instruments.retain(|i| i.source.zone_count() > 0);
                for instrument in &mut performance.instruments {
                    if instrument.source.folder_parts.is_empty() {
                        instrument.source.folder_parts = parts.clone();
                    }
                    instrument.source.guess_metadata(ctx.metadata);
                }
                ctx.notifier.log(keys::DETECTED, &[&performance.name, &performance.instruments.len()]);
                result.push(performance);
            }
            Ok(None) => {}
            Err(e) => report_failure(&path, &e, ctx.notifier),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataSettings;
    use crate::notifier::CollectingNotifier;
    use crate::source::Group;
    use crate::zone::SampleZone;
    use std::fs;

    struct TextDetector;

    impl Detector for TextDetector {
        fn name(&self) -> &'static str {
            "Text"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["txt"]
        }

        fn read_file(&self, path: &Path, _ctx: &DetectContext) -> Result<Vec<MultisampleSource>> {
            let content = fs::read_to_string(path)?;
            match content.trim() {
                "bad" => Err(ConversionError::structural(path.display().to_string(), "bad content")),
                "locked" => Err(ConversionError::Encrypted("program".to_string())),
                "empty" => Ok(vec![MultisampleSource::new("empty", path)]),
                name => {
                    let mut source = MultisampleSource::new(name, path);
                    let mut group = Group::new("g");
                    group.zones.push(SampleZone::default());
                    source.groups.push(group);
                    Ok(vec![source])
                }
            }
        }
    }

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pads")).unwrap();
        fs::write(dir.path().join("a.txt"), "Piano").unwrap();
        fs::write(dir.path().join("b.TXT"), "bad").unwrap();
        fs::write(dir.path().join("c.txt"), "empty").unwrap();
        fs::write(dir.path().join("d.txt"), "locked").unwrap();
        fs::write(dir.path().join("e.wav"), "Ignored").unwrap();
        fs::write(dir.path().join("pads").join("f.txt"), "Warm").unwrap();
        dir
    }

    #[test]
    fn test_detect_skips_failures() {
        let dir = setup();
        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);

        let sources = detect(dir.path(), &TextDetector, &ctx, None);
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Piano", "Warm"]);
        assert_eq!(sources[1].folder_parts.last().map(String::as_str), Some("pads"));
        assert_eq!(sources[1].metadata.category.as_deref(), Some("Pad"));

        assert!(notifier.contains(keys::FILE_FAILED));
        assert!(notifier.contains(keys::SOURCE_SKIPPED_NO_ZONES));
        assert!(notifier.contains(keys::ENCRYPTED));
        assert_eq!(notifier.errors().len(), 2);
    }

    #[test]
    fn test_cancel_between_files() {
        let dir = setup();
        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let cancel = AtomicBool::new(true);
        assert!(detect(dir.path(), &TextDetector, &ctx, Some(&cancel)).is_empty());
        assert!(notifier.contains(keys::CANCELLED));
    }

    #[test]
    fn test_open_sample_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        assert!(ctx.open_sample(&dir.path().join("gone.wav")).is_none());
        assert!(notifier.contains(keys::SAMPLE_MISSING));
    }

    #[test]
    fn test_folder_parts() {
        let parts = folder_parts(Path::new("/lib/Root"), Path::new("/lib/Root/A/B/x.sfz"));
        assert_eq!(parts, vec!["Root", "A", "B"]);
    }

    #[test]
    fn test_default_performance_support() {
        struct Nothing;
        impl Creator for Nothing {
            fn name(&self) -> &'static str {
                "Nothing"
            }
            fn create(&self, folder: &Path, _source: &MultisampleSource, _ctx: &CreateContext) -> Result<PathBuf> {
                Ok(folder.to_path_buf())
            }
        }
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        assert!(!Nothing.supports_performance());
        let err = Nothing
            .create_performance(Path::new("/tmp"), &PerformanceSource::default(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ConversionError::Unsupported(_)));
    }
}
