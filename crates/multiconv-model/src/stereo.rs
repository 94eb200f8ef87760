//! Combination of split left/right mono samples into stereo zones.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::sample_data::CombinedStereoSampleData;
use crate::zone::SampleZone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Left => "-L",
            Self::Right => "-R",
        }
    }
}

fn channel_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(.*?)[-_ ]([LR])$").ok()).as_ref()
}

/// Split a name like `Piano-L` into its stem and channel.
pub fn split_channel_name(name: &str) -> Option<(String, Channel)> {
    let captures = channel_pattern()?.captures(name)?;
    let stem = captures.get(1)?.as_str();
    if stem.is_empty() {
        return None;
    }
    let channel = match captures.get(2)?.as_str() {
        "L" | "l" => Channel::Left,
        _ => Channel::Right,
    };
    Some((stem.to_string(), channel))
}

fn same_mapping(a: &SampleZone, b: &SampleZone) -> bool {
    a.key_low == b.key_low
        && a.key_high == b.key_high
        && a.velocity_low == b.velocity_low
        && a.velocity_high == b.velocity_high
}

/// Merge pairs of `-L`/`-R` zones into single stereo zones.
///
/// A pair is merged when both names share the same stem and both zones cover
/// the same key and velocity range. The combined zone keeps the parameters and
/// loops of the left zone and is named after the stem. Unpaired zones are
/// returned unchanged, in their original order.
pub fn combine_split_stereo(zones: Vec<SampleZone>) -> Vec<SampleZone> {
    let channels: Vec<Option<(String, Channel)>> = zones.iter().map(|z| split_channel_name(&z.name)).collect();
    let mut partner: Vec<Option<usize>> = vec![None; zones.len()];
    let mut consumed = vec![false; zones.len()];

    for (i, left) in channels.iter().enumerate() {
        let Some((stem, Channel::Left)) = left else {
            continue;
        };
        let found = channels.iter().enumerate().position(|(j, right)| {
            !consumed[j]
                && matches!(right, Some((s, Channel::Right)) if s == stem)
                && same_mapping(&zones[i], &zones[j])
        });
        if let Some(j) = found {
            partner[i] = Some(j);
            consumed[j] = true;
        }
    }

    let mut slots: Vec<Option<SampleZone>> = zones.into_iter().map(Some).collect();
    let mut result = Vec::with_capacity(slots.len());
    for i in 0..slots.len() {
        if consumed[i] {
            continue;
        }
        let Some(mut zone) = slots[i].take() else {
            continue;
        };
        if let Some(j) = partner[i] {
            if let (Some(right), Some((stem, _))) = (slots[j].take(), &channels[i]) {
                if let (Some(l), Some(r)) = (zone.sample.clone(), right.sample) {
                    zone.sample = Some(Arc::new(CombinedStereoSampleData::new(stem.clone(), l, r)));
                }
                log::debug!("Combined {} and {} into {}", zone.name, right.name, stem);
                zone.name = stem.clone();
            }
        }
        result.push(zone);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_data::PcmSampleData;
    use crate::zone::{LoopType, SampleLoop};

    fn mono(name: &str, loop_start: u32) -> SampleZone {
        let pcm = PcmSampleData::new(name, 1, 44100, 16, vec![0; 100]);
        let mut zone = SampleZone::new(name, Arc::new(pcm));
        zone.key_low = 40;
        zone.key_high = 50;
        zone.loops.push(SampleLoop::new(LoopType::Forward, loop_start, 90));
        zone
    }

    #[test]
    fn test_split_channel_name() {
        assert_eq!(split_channel_name("Piano-L"), Some(("Piano".to_string(), Channel::Left)));
        assert_eq!(split_channel_name("Grand Piano_r"), Some(("Grand Piano".to_string(), Channel::Right)));
        assert_eq!(split_channel_name("Piano L"), Some(("Piano".to_string(), Channel::Left)));
        assert_eq!(split_channel_name("PianoL"), None);
        assert_eq!(split_channel_name("-L"), None);
    }

    #[test]
    fn test_pair_is_combined_with_left_loop() {
        let zones = vec![mono("Piano-R", 30), mono("Piano-L", 10)];
        let combined = combine_split_stereo(zones);
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].name, "Piano");
        assert_eq!(combined[0].loops[0].start, 10);
        let meta = combined[0].sample.as_ref().unwrap().audio_metadata().unwrap();
        assert_eq!(meta.channels, 2);
    }

    #[test]
    fn test_different_ranges_stay_separate() {
        let mut right = mono("Piano-R", 10);
        right.key_high = 60;
        let combined = combine_split_stereo(vec![mono("Piano-L", 10), right, mono("Other", 0)]);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[2].name, "Other");
    }
}
