//! Limiting crossfade widths to what the zone layout allows.
//!
//! Crossfades are stored as requested by the source format and limited only
//! when a writer maps them. A width is measured inward from the zone edge and
//! may not exceed the span of the zone itself, nor the distance to the
//! neighbouring zone's boundary on the same side.

use crate::zone::SampleZone;

/// Effective crossfade widths of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Crossfades {
    pub note_low: u8,
    pub note_high: u8,
    pub velocity_low: u8,
    pub velocity_high: u8,
}

#[derive(Clone, Copy)]
struct Range {
    low: u8,
    high: u8,
}

fn key_range(zone: &SampleZone) -> Range {
    Range {
        low: zone.key_low,
        high: zone.key_high,
    }
}

fn velocity_range(zone: &SampleZone) -> Range {
    Range {
        low: zone.velocity_low,
        high: zone.velocity_high,
    }
}

fn intersects(a: Range, b: Range) -> bool {
    a.low <= b.high && b.low <= a.high
}

/// Limit one side pair of a zone along one axis.
///
/// `axis` selects the dimension being limited, `other` the one that decides
/// whether two zones are neighbours at all.
fn limit_axis(
    zones: &[SampleZone],
    index: usize,
    requested: (u8, u8),
    axis: fn(&SampleZone) -> Range,
    other: fn(&SampleZone) -> Range,
) -> (u8, u8) {
    let zone = axis(&zones[index]);
    let cross = other(&zones[index]);
    let span = zone.high.saturating_sub(zone.low);

    let mut low = requested.0.min(span);
    let mut high = requested.1.min(span);

    let neighbours = zones
        .iter()
        .enumerate()
        .filter(|(i, z)| *i != index && intersects(other(z), cross))
        .map(|(_, z)| axis(z));

    let mut lower_neighbour: Option<u8> = None;
    let mut upper_neighbour: Option<u8> = None;
    for n in neighbours {
        if n.low < zone.low {
            lower_neighbour = Some(lower_neighbour.map_or(n.low, |l| l.max(n.low)));
        }
        if n.high > zone.high {
            upper_neighbour = Some(upper_neighbour.map_or(n.high, |h| h.min(n.high)));
        }
    }

    if let Some(n) = lower_neighbour {
        low = low.min(zone.low - n);
    }
    if let Some(n) = upper_neighbour {
        high = high.min(n - zone.high);
    }
    (low, high)
}

/// The effective crossfades of all `zones`, in order.
pub fn limit_crossfades(zones: &[SampleZone]) -> Vec<Crossfades> {
    (0..zones.len())
        .map(|i| {
            let zone = &zones[i];
            let (note_low, note_high) = limit_axis(
                zones,
                i,
                (zone.note_crossfade_low, zone.note_crossfade_high),
                key_range,
                velocity_range,
            );
            let (velocity_low, velocity_high) = limit_axis(
                zones,
                i,
                (zone.velocity_crossfade_low, zone.velocity_crossfade_high),
                velocity_range,
                key_range,
            );
            Crossfades {
                note_low,
                note_high,
                velocity_low,
                velocity_high,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(key_low: u8, key_high: u8, xf_low: u8, xf_high: u8) -> SampleZone {
        SampleZone {
            key_low,
            key_high,
            note_crossfade_low: xf_low,
            note_crossfade_high: xf_high,
            ..Default::default()
        }
    }

    #[test]
    fn test_isolated_zone_keeps_request() {
        let result = limit_crossfades(&[zone(36, 48, 6, 4)]);
        assert_eq!(result[0].note_low, 6);
        assert_eq!(result[0].note_high, 4);
    }

    #[test]
    fn test_limited_by_span() {
        let result = limit_crossfades(&[zone(60, 62, 10, 10)]);
        assert_eq!(result[0], Crossfades { note_low: 2, note_high: 2, ..Default::default() });
    }

    #[test]
    fn test_limited_by_neighbour() {
        let zones = [zone(30, 40, 0, 20), zone(36, 48, 10, 0)];
        let result = limit_crossfades(&zones);
        assert_eq!(result[0].note_high, 8);
        assert_eq!(result[1].note_low, 6);
    }

    #[test]
    fn test_neighbour_on_other_velocity_layer_ignored() {
        let mut upper = zone(30, 40, 0, 0);
        upper.velocity_low = 100;
        let mut lower = zone(36, 48, 10, 0);
        lower.velocity_high = 99;
        let result = limit_crossfades(&[upper, lower]);
        assert_eq!(result[1].note_low, 10);
    }

    #[test]
    fn test_velocity_axis() {
        let mut soft = SampleZone {
            velocity_low: 1,
            velocity_high: 70,
            velocity_crossfade_high: 30,
            ..Default::default()
        };
        soft.key_high = 60;
        let loud = SampleZone {
            velocity_low: 60,
            velocity_high: 127,
            velocity_crossfade_low: 30,
            key_high: 60,
            ..Default::default()
        };
        let result = limit_crossfades(&[soft, loud]);
        assert_eq!(result[0].velocity_high, 30);
        assert_eq!(result[1].velocity_low, 30);
    }

    /// Pseudo random layouts: the effective width never exceeds the gap to
    /// any overlapping neighbour's same-side boundary.
    #[test]
    fn test_never_exceeds_gap() {
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = |max: u64| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) % max) as u8
        };

        for _ in 0..200 {
            let count = 2 + next(6) as usize;
            let zones: Vec<SampleZone> = (0..count)
                .map(|_| {
                    let low = next(120);
                    let high = low + next(8);
                    let mut z = zone(low, high, next(24), next(24));
                    z.velocity_low = 1 + next(60);
                    z.velocity_high = z.velocity_low + next(66);
                    z
                })
                .collect();
            let result = limit_crossfades(&zones);
            for (i, a) in zones.iter().enumerate() {
                assert!(result[i].note_low <= a.key_high - a.key_low);
                for (j, b) in zones.iter().enumerate() {
                    if i == j || !(a.velocity_low <= b.velocity_high && b.velocity_low <= a.velocity_high) {
                        continue;
                    }
                    if b.key_low < a.key_low {
                        assert!(result[i].note_low <= a.key_low - b.key_low);
                    }
                    if b.key_high > a.key_high {
                        assert!(result[i].note_high <= b.key_high - a.key_high);
                    }
                }
            }
        }
    }
}
