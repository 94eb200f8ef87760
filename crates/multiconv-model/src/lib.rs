//! The canonical multi-sample model.
//!
//! Every format reader produces [`MultisampleSource`]s and every writer consumes
//! them. The crate also holds the pieces shared by all codecs:
//!
//! - [`SampleData`]: a shared reference to audio that lives in a file, an archive
//!   or memory, opened lazily
//! - [`Notifier`]: message-key based progress and error reporting
//! - [`MetadataConfig`] and the tag heuristics used when a format carries no metadata
//! - unit conversions, crossfade limiting, stereo combination and output naming
//! - the [`Detector`] and [`Creator`] capability traits

pub mod config;
pub mod crossfade;
pub mod destination;
pub mod detector;
pub mod envelope;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod notifier;
pub mod sample_data;
pub mod source;
pub mod stereo;
pub mod tags;
pub mod units;
pub mod zone;

pub use config::{ConverterConfig, DestinationOptions};
pub use crossfade::{limit_crossfades, Crossfades};
pub use detector::{detect, detect_performances, CreateContext, Creator, DetectContext, Detector};
pub use envelope::{Envelope, EnvelopeModulation, Filter, FilterType};
pub use error::{ConversionError, Result};
pub use metadata::{Metadata, MetadataConfig, MetadataSettings};
pub use notifier::{CollectingNotifier, LogNotifier, Notifier};
pub use sample_data::{
    AudioMetadata, CombinedStereoSampleData, FileSampleData, PcmSampleData, SampleData, WavBytesSampleData,
};
pub use source::{Group, MultisampleSource, PerformanceInstrument, PerformanceSource, TriggerType};
pub use zone::{LoopType, PlayLogic, SampleLoop, SampleZone};
