//! Multi-samples, groups and performances.

use std::path::PathBuf;

use crate::metadata::{self, Metadata, MetadataConfig};
use crate::zone::SampleZone;

/// When the zones of a group are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerType {
    #[default]
    Attack,
    Release,
    First,
    Legato,
}

/// A named collection of zones sharing a trigger.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub trigger: TriggerType,
    pub zones: Vec<SampleZone>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One playable instrument.
#[derive(Debug, Clone, Default)]
pub struct MultisampleSource {
    pub name: String,
    /// The file the instrument was read from.
    pub source_path: PathBuf,
    /// Folder names between the scanned root and the source file.
    pub folder_parts: Vec<String>,
    pub metadata: Metadata,
    pub groups: Vec<Group>,
}

impl MultisampleSource {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            ..Default::default()
        }
    }

    pub fn zones(&self) -> impl Iterator<Item = &SampleZone> {
        self.groups.iter().flat_map(|g| g.zones.iter())
    }

    pub fn zones_mut(&mut self) -> impl Iterator<Item = &mut SampleZone> {
        self.groups.iter_mut().flat_map(|g| g.zones.iter_mut())
    }

    pub fn zone_count(&self) -> usize {
        self.groups.iter().map(|g| g.zones.len()).sum()
    }

    /// Drop groups without zones.
    pub fn remove_empty_groups(&mut self) {
        self.groups.retain(|g| !g.zones.is_empty());
    }

    /// Fill missing metadata from the first sample's BEXT chunk and the names
    /// of the folders and the instrument.
    pub fn guess_metadata(&mut self, config: &dyn MetadataConfig) {
        let broadcast = self
            .zones()
            .find_map(|z| z.sample.as_ref())
            .and_then(|s| s.wave_file().ok())
            .and_then(|w| w.broadcast);
        let mut parts = self.folder_parts.clone();
        parts.push(self.name.clone());
        metadata::fill_metadata(&mut self.metadata, broadcast.as_ref(), &parts, config);
    }
}

/// One instrument of a performance.
#[derive(Debug, Clone)]
pub struct PerformanceInstrument {
    pub source: MultisampleSource,
    /// 0-15, `None` for omni.
    pub midi_channel: Option<u8>,
    pub clip_key_low: u8,
    pub clip_key_high: u8,
    /// Slot of the instrument in its container, if the format has slots.
    pub slot: Option<usize>,
}

impl PerformanceInstrument {
    pub fn new(source: MultisampleSource) -> Self {
        Self {
            source,
            midi_channel: None,
            clip_key_low: 0,
            clip_key_high: 127,
            slot: None,
        }
    }
}

/// Several instruments played at the same time.
#[derive(Debug, Clone, Default)]
pub struct PerformanceSource {
    pub name: String,
    pub instruments: Vec<PerformanceInstrument>,
}
