//! Readers and writers for the sampler formats beyond SFZ.
//!
//! - [`sf2`]: SoundFont 2 files, read and written
//! - [`kontakt`]: Kontakt 1 and NI-Container instruments and multis, read only
//! - [`korg`]: Korg KMP multisamples with their KSF samples
//! - [`bitwig`]: Bitwig Studio `.multisample` archives
//! - [`mpc`] and [`tal`]: writers for Akai MPC keygroups and TAL Sampler
//!
//! [`registry`] ties them together with the SFZ codec.

pub mod bitwig;
pub mod kontakt;
pub mod korg;
pub mod mpc;
pub mod registry;
pub mod sf2;
pub mod tal;
pub mod xml;

pub use bitwig::{BitwigCreator, BitwigDetector};
pub use kontakt::KontaktDetector;
pub use korg::{KorgCreator, KorgDetector};
pub use mpc::MpcCreator;
pub use registry::{DestinationFormat, SourceFormat};
pub use sf2::{Sf2Creator, Sf2Detector};
pub use tal::TalCreator;
