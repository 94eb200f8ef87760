//! Opcode lookup through the section hierarchy.

use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::parser::{SfzFile, SfzOpcodes, SfzSection};

/// Opcodes that were looked up at least once, successfully.
#[derive(Debug, Default)]
pub struct ProcessedOpcodes {
    names: RefCell<BTreeSet<String>>,
}

impl ProcessedOpcodes {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark(&self, name: &str) {
        let mut names = self.names.borrow_mut();
        if !names.contains(name) {
            names.insert(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.borrow().contains(name)
    }

    /// Opcodes of `sfz` that were never processed, sorted and without duplicates.
    pub fn unused(&self, sfz: &SfzFile) -> Vec<String> {
        let unused: BTreeSet<&String> = sfz
            .scoped_sections()
            .flat_map(|s| s.opcodes.keys())
            .filter(|name| !self.contains(name))
            .collect();
        unused.into_iter().cloned().collect()
    }
}

/// The sections a region inherits from, most specific first.
///
/// A lookup returns the first section that defines the opcode and marks the
/// opcode as processed.
pub struct Scope<'a> {
    sections: Vec<&'a SfzSection>,
    processed: &'a ProcessedOpcodes,
}

impl<'a> Scope<'a> {
    /// Scope of a region: region, group, master, global.
    pub fn region(sfz: &'a SfzFile, region: &'a SfzSection, processed: &'a ProcessedOpcodes) -> Self {
        let sections = std::iter::once(region)
            .chain(sfz.group_of(region))
            .chain(sfz.master_of(region))
            .chain(sfz.global.as_ref())
            .collect();
        Self { sections, processed }
    }

    /// Scope of a group: group, master, global.
    pub fn group(sfz: &'a SfzFile, group: &'a SfzSection, processed: &'a ProcessedOpcodes) -> Self {
        let sections = std::iter::once(group)
            .chain(sfz.master_of(group))
            .chain(sfz.global.as_ref())
            .collect();
        Self { sections, processed }
    }

    /// Scope of regions outside any group: master, global.
    pub fn outer(sfz: &'a SfzFile, master: Option<usize>, processed: &'a ProcessedOpcodes) -> Self {
        let sections = master
            .and_then(|i| sfz.masters.get(i))
            .into_iter()
            .chain(sfz.global.as_ref())
            .collect();
        Self { sections, processed }
    }

    /// True if any opcode starting with `prefix` is defined in the scope.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.sections
            .iter()
            .any(|s| s.opcodes.keys().any(|k| k.starts_with(prefix)))
    }
}

impl SfzOpcodes for Scope<'_> {
    fn get_opcode_str(&self, name: &str) -> Option<&str> {
        let value = self.sections.iter().find_map(|s| s.opcodes.get(name))?;
        self.processed.mark(name);
        Some(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sfz_str;

    const CONTENT: &str = "<global> volume=-6 tune=5 <master> volume=-3 <group> lovel=64 \
                           <region> sample=a.wav key=60 amp_velcurve_1=0.1";

    #[test]
    fn test_most_specific_section_wins() {
        let sfz = parse_sfz_str(CONTENT).unwrap();
        let processed = ProcessedOpcodes::new();
        let scope = Scope::region(&sfz, &sfz.regions[0], &processed);
        assert_eq!(scope.get_opcode_str("volume"), Some("-3"));
        assert_eq!(scope.get_opcode_str("tune"), Some("5"));
        assert_eq!(scope.get_opcode::<i32>("lovel").unwrap(), 64);
        assert_eq!(scope.get_opcode_str("hivel"), None);
        assert!(scope.has_prefix("amp_velcurve_"));
    }

    #[test]
    fn test_unused_opcodes_are_reported_once() {
        let sfz = parse_sfz_str(CONTENT).unwrap();
        let processed = ProcessedOpcodes::new();
        let scope = Scope::region(&sfz, &sfz.regions[0], &processed);
        for name in ["sample", "key", "volume", "lovel"] {
            scope.get_opcode_str(name);
        }
        assert_eq!(processed.unused(&sfz), vec!["amp_velcurve_1", "tune"]);
    }

    #[test]
    fn test_group_and_outer_scopes() {
        let sfz = parse_sfz_str(CONTENT).unwrap();
        let processed = ProcessedOpcodes::new();
        let group = Scope::group(&sfz, &sfz.groups[0], &processed);
        assert_eq!(group.get_opcode_str("volume"), Some("-3"));
        let outer = Scope::outer(&sfz, None, &processed);
        assert_eq!(outer.get_opcode_str("volume"), Some("-6"));
        assert_eq!(outer.get_opcode_str("lovel"), None);
    }
}
