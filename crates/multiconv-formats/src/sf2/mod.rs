//! SoundFont 2 (`.sf2`).
//!
//! [`file`] holds the RIFF structure with its fixed-size hydra records,
//! [`reader`] maps presets to multi-samples and [`writer`] creates a single
//! preset SoundFont from a multi-sample.

pub mod file;
pub mod generators;
pub mod reader;
pub mod writer;

pub use file::SoundFont;
pub use reader::Sf2Detector;
pub use writer::Sf2Creator;
