//! Detection and conversion runs driven from the command line.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use multiconv_formats::{DestinationFormat, SourceFormat};
use multiconv_model::{
    detect, detect_performances, ConverterConfig, CreateContext, Creator, DetectContext, MultisampleSource, Notifier,
    PerformanceSource,
};

/// Outcome of one conversion run.
#[derive(Debug, Default)]
pub struct Summary {
    pub written: Vec<PathBuf>,
    pub failed: usize,
    pub cancelled: bool,
}

/// Everything a run needs besides the folders.
pub struct Session<'a> {
    pub config: &'a ConverterConfig,
    pub notifier: &'a dyn Notifier,
    pub cancel: &'a AtomicBool,
}

impl Session<'_> {
    fn detect_context(&self) -> DetectContext<'_> {
        DetectContext::new(self.notifier, &self.config.metadata)
    }

    /// Read all sources of `format` below `folder`.
    pub fn detect(&self, folder: &Path, format: SourceFormat) -> Vec<MultisampleSource> {
        let detector = format.detector();
        detect(folder, detector.as_ref(), &self.detect_context(), Some(self.cancel))
    }

    pub fn detect_performances(&self, folder: &Path, format: SourceFormat) -> Vec<PerformanceSource> {
        let detector = format.detector();
        detect_performances(folder, detector.as_ref(), &self.detect_context(), Some(self.cancel))
    }

    /// Convert every source below `source_folder` into `destination_folder`.
    ///
    /// Sources keep the sub-folder they were found in below `source_folder`.
    /// With `performances` each instrument of a performance is written into a
    /// folder named after the performance.
    pub fn convert(
        &self,
        source_folder: &Path,
        destination_folder: &Path,
        from: SourceFormat,
        to: DestinationFormat,
        performances: bool,
    ) -> Result<Summary> {
        if !source_folder.is_dir() {
            anyhow::bail!("Source folder not found: {}", source_folder.display());
        }
        std::fs::create_dir_all(destination_folder)
            .with_context(|| format!("Failed to create {}", destination_folder.display()))?;

        let creator = to.creator();
        let detector = from.detector();
        let ctx = self.detect_context();
        let mut summary = Summary::default();

        if performances {
            for performance in detect_performances(source_folder, detector.as_ref(), &ctx, Some(self.cancel)) {
                let folder = destination_folder.join(&performance.name);
                for instrument in &performance.instruments {
                    if self.write(creator.as_ref(), &folder, &instrument.source, &mut summary) {
                        break;
                    }
                }
            }
        } else {
            for source in detect(source_folder, detector.as_ref(), &ctx, Some(self.cancel)) {
                let folder = output_folder(source_folder, destination_folder, &source.source_path);
                if self.write(creator.as_ref(), &folder, &source, &mut summary) {
                    break;
                }
            }
        }
        summary.cancelled = self.cancel.load(Ordering::Relaxed);
        Ok(summary)
    }

    /// Write one source, returning true when the run was cancelled.
    fn write(&self, creator: &dyn Creator, folder: &Path, source: &MultisampleSource, summary: &mut Summary) -> bool {
        if self.cancel.load(Ordering::Relaxed) {
            return true;
        }
        let ctx = CreateContext::new(self.notifier, &self.config.destination);
        match creator.create(folder, source, &ctx) {
            Ok(path) => {
                log::info!("Wrote {}", path.display());
                summary.written.push(path);
            }
            Err(e) => {
                log::error!("Failed to write {}: {}", source.name, e);
                summary.failed += 1;
            }
        }
        false
    }
}

/// The folder below `destination` matching the folder of `source_path` below `root`.
fn output_folder(root: &Path, destination: &Path, source_path: &Path) -> PathBuf {
    source_path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map_or_else(|| destination.to_path_buf(), |relative| destination.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiconv_model::destination::write_sample_file;
    use multiconv_model::{CollectingNotifier, PcmSampleData};
    use std::fs;

    #[test]
    fn test_output_folder() {
        let root = Path::new("/in");
        let out = Path::new("/out");
        assert_eq!(output_folder(root, out, Path::new("/in/a/b/x.sfz")), PathBuf::from("/out/a/b"));
        assert_eq!(output_folder(root, out, Path::new("/in/x.sfz")), PathBuf::from("/out"));
        assert_eq!(output_folder(root, out, Path::new("/elsewhere/x.sfz")), PathBuf::from("/out"));
    }

    fn write_sfz(folder: &Path) {
        let samples = folder.join("Pads").join("samples");
        fs::create_dir_all(&samples).unwrap();
        let tone = PcmSampleData::new("tone", 1, 44100, 16, (0..256).map(|i| (i % 32) * 512 - 8192).collect());
        write_sample_file(&tone, &samples.join("tone.wav")).unwrap();
        fs::write(
            folder.join("Pads").join("Warm Pad.sfz"),
            "<group>\n<region> sample=samples/tone.wav lokey=48 hikey=72 pitch_keycenter=60\n",
        )
        .unwrap();
    }

    #[test]
    fn test_convert_keeps_sub_folders() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        write_sfz(source.path());

        let config = ConverterConfig::default();
        let notifier = CollectingNotifier::new();
        let cancel = AtomicBool::new(false);
        let session = Session {
            config: &config,
            notifier: &notifier,
            cancel: &cancel,
        };
        let summary = session
            .convert(source.path(), destination.path(), SourceFormat::Sfz, DestinationFormat::Bitwig, false)
            .unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.written, vec![destination.path().join("Pads").join("Warm Pad.multisample")]);
        assert!(summary.written[0].is_file());
    }

    #[test]
    fn test_cancelled_run_writes_nothing() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        write_sfz(source.path());

        let config = ConverterConfig::default();
        let notifier = CollectingNotifier::new();
        let cancel = AtomicBool::new(true);
        let session = Session {
            config: &config,
            notifier: &notifier,
            cancel: &cancel,
        };
        let summary = session
            .convert(source.path(), destination.path(), SourceFormat::Sfz, DestinationFormat::Sfz, false)
            .unwrap();
        assert!(summary.cancelled);
        assert!(summary.written.is_empty());
    }

    #[test]
    fn test_missing_source_folder() {
        let destination = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default();
        let notifier = CollectingNotifier::new();
        let cancel = AtomicBool::new(false);
        let session = Session {
            config: &config,
            notifier: &notifier,
            cancel: &cancel,
        };
        let missing = destination.path().join("nothing here");
        assert!(session
            .convert(&missing, destination.path(), SourceFormat::Sfz, DestinationFormat::Sfz, false)
            .is_err());
    }
}
