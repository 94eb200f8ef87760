//! SFZ support for multiconv.
//!
//! - [`parser`]: the SFZ text grammar (headers, opcodes, comments, `#define`)
//! - [`scope`]: opcode inheritance region -> group -> master -> global
//! - [`SfzDetector`]: maps SFZ files to multi-samples
//! - [`SfzCreator`]: writes multi-samples as SFZ plus WAV files
//!
//! # Example
//!
//! ```ignore
//! use multiconv_model::{detect, DetectContext, LogNotifier, MetadataSettings};
//! use multiconv_sfz::SfzDetector;
//!
//! let settings = MetadataSettings::default();
//! let ctx = DetectContext::new(&LogNotifier, &settings);
//! let sources = detect(Path::new("library"), &SfzDetector, &ctx, None);
//! ```

pub mod creator;
pub mod detector;
pub mod parser;
pub mod scope;

pub use creator::SfzCreator;
pub use detector::{read_sfz, SfzDetector};
