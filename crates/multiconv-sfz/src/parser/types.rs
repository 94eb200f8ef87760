use std::collections::HashMap;
use std::path::PathBuf;

/// Represents a complete SFZ file with all sections and regions
///
/// In the SFZ format, a file is organized into a hierarchy of sections, each
/// containing opcodes that define how samples should be played:
///
/// - `<control>`: settings for the whole file, like `default_path`
/// - `<global>`: opcodes that apply to all regions
/// - `<master>`: opcodes that apply to the following groups
/// - `<group>`: opcodes that apply to the following regions
/// - `<region>`: the basic playable unit, defining a single sample
/// - `<curve>` and `<effect>`: response curves and effect settings
///
/// # Inheritance
///
/// Opcodes are not copied between sections. Every master, group and region
/// remembers the indices of the sections that enclosed it, and lookups walk
/// region -> group -> master -> global (see [`crate::scope::Scope`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfzFile {
    /// The `<global>` section. Several `<global>` headers are merged.
    pub global: Option<SfzSection>,

    /// The `<control>` section. Several `<control>` headers are merged.
    pub control: Option<SfzSection>,

    /// `<master>` sections in file order
    pub masters: Vec<SfzSection>,

    /// `<group>` sections in file order
    pub groups: Vec<SfzSection>,

    /// `<region>` sections in file order
    pub regions: Vec<SfzSection>,

    /// `<curve>` sections, kept but not interpreted
    pub curves: Vec<SfzSection>,

    /// `<effect>` sections, kept but not interpreted
    pub effects: Vec<SfzSection>,

    /// Source file path if loaded from disk
    ///
    /// This is used to resolve relative paths to samples.
    pub source_file: Option<PathBuf>,
}

impl SfzFile {
    /// Creates a new empty SFZ file structure
    pub fn new() -> Self {
        Self::default()
    }

    /// The `default_path` of the control section, if any.
    pub fn default_path(&self) -> Option<&str> {
        self.control
            .as_ref()
            .and_then(|c| c.opcodes.get("default_path"))
            .map(String::as_str)
    }

    /// The group that encloses `section`.
    pub fn group_of(&self, section: &SfzSection) -> Option<&SfzSection> {
        section.group.and_then(|i| self.groups.get(i))
    }

    /// The master that encloses `section`.
    pub fn master_of(&self, section: &SfzSection) -> Option<&SfzSection> {
        section.master.and_then(|i| self.masters.get(i))
    }

    /// All sections that take part in opcode lookups.
    pub fn scoped_sections(&self) -> impl Iterator<Item = &SfzSection> {
        self.global
            .iter()
            .chain(self.masters.iter())
            .chain(self.groups.iter())
            .chain(self.regions.iter())
    }
}

/// Types of sections in an SFZ file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SfzSectionType {
    Control,
    Global,
    Master,
    Group,
    Region,
    Curve,
    Effect,
}

impl SfzSectionType {
    /// Parse a section name (without angle brackets), case-insensitive.
    pub fn from_header(header: &str) -> Option<Self> {
        match header.to_ascii_lowercase().as_str() {
            "control" => Some(Self::Control),
            "global" => Some(Self::Global),
            "master" => Some(Self::Master),
            "group" => Some(Self::Group),
            "region" => Some(Self::Region),
            "curve" => Some(Self::Curve),
            "effect" => Some(Self::Effect),
            _ => None,
        }
    }

    pub fn header_str(&self) -> &'static str {
        match self {
            Self::Control => "<control>",
            Self::Global => "<global>",
            Self::Master => "<master>",
            Self::Group => "<group>",
            Self::Region => "<region>",
            Self::Curve => "<curve>",
            Self::Effect => "<effect>",
        }
    }
}

/// One section of an SFZ file with its own opcodes
#[derive(Debug, Clone, PartialEq)]
pub struct SfzSection {
    pub section_type: SfzSectionType,

    /// Opcodes defined directly in this section
    pub opcodes: HashMap<String, String>,

    /// Line of the section header (1-based)
    pub line: usize,

    /// Index into [`SfzFile::masters`] of the enclosing master
    pub master: Option<usize>,

    /// Index into [`SfzFile::groups`] of the enclosing group
    pub group: Option<usize>,
}

impl SfzSection {
    pub fn new(section_type: SfzSectionType) -> Self {
        Self {
            section_type,
            opcodes: HashMap::new(),
            line: 0,
            master: None,
            group: None,
        }
    }

    /// Add or replace an opcode.
    pub fn add_opcode(&mut self, name: String, value: String) {
        self.opcodes.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_header_names() {
        assert_eq!(SfzSectionType::from_header("Region"), Some(SfzSectionType::Region));
        assert_eq!(SfzSectionType::from_header("regions"), None);
        assert_eq!(SfzSectionType::Master.header_str(), "<master>");
    }

    #[test]
    fn test_enclosing_sections() {
        let mut sfz = SfzFile::new();
        sfz.masters.push(SfzSection::new(SfzSectionType::Master));
        let mut group = SfzSection::new(SfzSectionType::Group);
        group.master = Some(0);
        sfz.groups.push(group);
        let mut region = SfzSection::new(SfzSectionType::Region);
        region.group = Some(0);
        region.master = Some(0);

        assert!(sfz.group_of(&region).is_some());
        assert!(sfz.master_of(&region).is_some());
        assert_eq!(sfz.scoped_sections().count(), 2);
    }
}
