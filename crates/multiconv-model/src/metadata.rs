//! Instrument metadata and the fallback chain used to fill it.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use multiconv_binary::wav::BroadcastChunk;
use serde::{Deserialize, Serialize};

use crate::tags;

/// Descriptive metadata of a multi-sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub creator: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub creation_time: Option<NaiveDateTime>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.creator.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.keywords.is_empty()
            && self.creation_time.is_none()
    }
}

/// Caller supplied settings for metadata guessing.
pub trait MetadataConfig: Send + Sync {
    /// Name a multi-sample after its folder instead of its file.
    fn prefer_folder_name(&self) -> bool;

    /// Creator names to look for in folder and file names.
    fn creator_tags(&self) -> Vec<String>;

    /// Creator used when nothing else could be found.
    fn default_creator_name(&self) -> String;
}

/// Serializable [`MetadataConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub prefer_folder_name: bool,
    pub creator_tags: Vec<String>,
    pub default_creator_name: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            prefer_folder_name: false,
            creator_tags: Vec::new(),
            default_creator_name: "Unknown".to_string(),
        }
    }
}

impl MetadataConfig for MetadataSettings {
    fn prefer_folder_name(&self) -> bool {
        self.prefer_folder_name
    }

    fn creator_tags(&self) -> Vec<String> {
        self.creator_tags.clone()
    }

    fn default_creator_name(&self) -> String {
        self.default_creator_name.clone()
    }
}

/// Pick the multi-sample name from the file stem or its folder.
pub fn source_name(file_stem: &str, folder_name: Option<&str>, config: &dyn MetadataConfig) -> String {
    match folder_name {
        Some(folder) if config.prefer_folder_name() && !folder.trim().is_empty() => folder.to_string(),
        _ => file_stem.to_string(),
    }
}

/// Fill the unset fields of `metadata`.
///
/// The order is: values already present, then the Broadcast Audio Extension of
/// a referenced sample, then heuristics on `name_parts` (folder and file names,
/// most specific last), then the configured default creator.
pub fn fill_metadata(
    metadata: &mut Metadata,
    broadcast: Option<&BroadcastChunk>,
    name_parts: &[String],
    config: &dyn MetadataConfig,
) {
    if let Some(bext) = broadcast {
        if metadata.description.is_none() && !bext.description.is_empty() {
            metadata.description = Some(bext.description.clone());
        }
        if metadata.creator.is_none() && !bext.originator.is_empty() {
            metadata.creator = Some(bext.originator.clone());
        }
        if metadata.creation_time.is_none() {
            metadata.creation_time = parse_bext_date(&bext.origination_date, &bext.origination_time);
        }
    }

    if metadata.category.is_none() {
        metadata.category = tags::detect_category(name_parts);
    }
    if metadata.creator.is_none() {
        metadata.creator = tags::detect_creator(name_parts, &config.creator_tags());
    }
    for keyword in tags::detect_keywords(name_parts) {
        if !metadata.keywords.contains(&keyword) {
            metadata.keywords.push(keyword);
        }
    }

    if metadata.creator.is_none() {
        let default = config.default_creator_name();
        if !default.trim().is_empty() {
            metadata.creator = Some(default);
        }
    }
}

fn parse_bext_date(date: &str, time: &str) -> Option<NaiveDateTime> {
    // Some writers use other separators than '-'
    let normalized: String = date.chars().map(|c| if c.is_ascii_digit() { c } else { '-' }).collect();
    let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
    let normalized_time: String = time.chars().map(|c| if c.is_ascii_digit() { c } else { ':' }).collect();
    let time = NaiveTime::parse_from_str(&normalized_time, "%H:%M:%S").unwrap_or(NaiveTime::MIN);
    Some(NaiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bext_wins_over_heuristics() {
        let bext = BroadcastChunk {
            description: "Felt piano".to_string(),
            originator: "Studio A".to_string(),
            origination_date: "2023:11:05".to_string(),
            origination_time: "08-15-00".to_string(),
            ..Default::default()
        };
        let mut metadata = Metadata::default();
        let config = MetadataSettings {
            creator_tags: vec!["Vendor".to_string()],
            ..Default::default()
        };
        fill_metadata(&mut metadata, Some(&bext), &parts(&["Vendor", "Piano Soft"]), &config);

        assert_eq!(metadata.creator.as_deref(), Some("Studio A"));
        assert_eq!(metadata.description.as_deref(), Some("Felt piano"));
        assert_eq!(metadata.category.as_deref(), Some("Piano"));
        assert!(metadata.keywords.contains(&"soft".to_string()));
        let created = metadata.creation_time.unwrap();
        assert_eq!(created.to_string(), "2023-11-05 08:15:00");
    }

    #[test]
    fn test_creator_tag_then_default() {
        let config = MetadataSettings {
            creator_tags: vec!["Vendor".to_string()],
            default_creator_name: "Me".to_string(),
            ..Default::default()
        };
        let mut tagged = Metadata::default();
        fill_metadata(&mut tagged, None, &parts(&["vendor-libs", "Bass"]), &config);
        assert_eq!(tagged.creator.as_deref(), Some("Vendor"));

        let mut untagged = Metadata::default();
        fill_metadata(&mut untagged, None, &parts(&["misc", "Thing"]), &config);
        assert_eq!(untagged.creator.as_deref(), Some("Me"));
        assert_eq!(untagged.category, None);
    }

    #[test]
    fn test_source_name_prefers_folder() {
        let mut config = MetadataSettings::default();
        assert_eq!(source_name("file", Some("Folder"), &config), "file");
        config.prefer_folder_name = true;
        assert_eq!(source_name("file", Some("Folder"), &config), "Folder");
        assert_eq!(source_name("file", None, &config), "file");
    }
}
