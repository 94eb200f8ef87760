//! Deterministic output names.
//!
//! All names are pure functions of their inputs so that converting the same
//! source twice produces identical file names.

use crate::stereo::Channel;

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace characters that are not allowed in file names on common systems.
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_control() || FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.').trim();
    if trimmed.is_empty() {
        "Unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Like [`safe_file_name`] but restricted to ASCII and limited in length,
/// for devices with 8.3-like file systems.
pub fn ascii_file_name(name: &str, max_len: usize) -> String {
    let ascii: String = safe_file_name(name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(max_len)
        .collect();
    if ascii.is_empty() {
        "_".to_string()
    } else {
        ascii
    }
}

/// File name of a zone's sample inside a destination folder, without extension.
///
/// Uses the zone name when present, else `<multisample>_<group>_<zone>` with
/// 1-based indices, and appends `-L`/`-R` for split channels.
pub fn sample_file_name(
    multisample: &str,
    zone_name: &str,
    group_index: usize,
    zone_index: usize,
    channel: Option<Channel>,
) -> String {
    let base = if zone_name.trim().is_empty() {
        format!("{}_{}_{}", multisample, group_index + 1, zone_index + 1)
    } else {
        zone_name.to_string()
    };
    let mut name = safe_file_name(&base);
    if let Some(channel) = channel {
        name.push_str(channel.suffix());
    }
    name
}

/// Name of a layer or group file, e.g. `Piano_layer2`.
pub fn layer_file_name(multisample: &str, label: &str, index: usize) -> String {
    safe_file_name(&format!("{}_{}{}", multisample, label, index + 1))
}

/// The first of `base`, `base-1`, `base-2`, ... for which `is_taken` is false.
pub fn unique_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    let mut counter = 1usize;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Make every name in `names` unique, in order, by appending numeric suffixes
/// to later duplicates (case-insensitive).
pub fn deduplicate(names: &[String]) -> Vec<String> {
    let mut used: Vec<String> = Vec::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        let unique = unique_name(name, |candidate| {
            used.iter().any(|u| u.eq_ignore_ascii_case(candidate))
        });
        used.push(unique.clone());
        result.push(unique);
    }
    result
}
