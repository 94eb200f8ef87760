//! Generator operators and zone generator sets.

use std::collections::BTreeMap;

use super::file::GeneratorRecord;

pub const START_ADDRS_OFFSET: u16 = 0;
pub const END_ADDRS_OFFSET: u16 = 1;
pub const START_LOOP_ADDRS_OFFSET: u16 = 2;
pub const END_LOOP_ADDRS_OFFSET: u16 = 3;
pub const START_ADDRS_COARSE_OFFSET: u16 = 4;
pub const MOD_ENV_TO_PITCH: u16 = 7;
pub const INITIAL_FILTER_FC: u16 = 8;
pub const INITIAL_FILTER_Q: u16 = 9;
pub const MOD_ENV_TO_FILTER_FC: u16 = 11;
pub const END_ADDRS_COARSE_OFFSET: u16 = 12;
pub const PAN: u16 = 17;
pub const DELAY_MOD_ENV: u16 = 25;
pub const ATTACK_MOD_ENV: u16 = 26;
pub const HOLD_MOD_ENV: u16 = 27;
pub const DECAY_MOD_ENV: u16 = 28;
pub const SUSTAIN_MOD_ENV: u16 = 29;
pub const RELEASE_MOD_ENV: u16 = 30;
pub const DELAY_VOL_ENV: u16 = 33;
pub const ATTACK_VOL_ENV: u16 = 34;
pub const HOLD_VOL_ENV: u16 = 35;
pub const DECAY_VOL_ENV: u16 = 36;
pub const SUSTAIN_VOL_ENV: u16 = 37;
pub const RELEASE_VOL_ENV: u16 = 38;
pub const INSTRUMENT: u16 = 41;
pub const KEY_RANGE: u16 = 43;
pub const VEL_RANGE: u16 = 44;
pub const START_LOOP_ADDRS_COARSE_OFFSET: u16 = 45;
pub const INITIAL_ATTENUATION: u16 = 48;
pub const END_LOOP_ADDRS_COARSE_OFFSET: u16 = 50;
pub const COARSE_TUNE: u16 = 51;
pub const FINE_TUNE: u16 = 52;
pub const SAMPLE_ID: u16 = 53;
pub const SAMPLE_MODES: u16 = 54;
pub const SCALE_TUNING: u16 = 56;
pub const OVERRIDING_ROOT_KEY: u16 = 58;

/// Timecent value of "no time", used as default of all envelope stages.
pub const INSTANT: i16 = -12000;

/// Filter cutoff default: fully open.
pub const FILTER_OPEN: i16 = 13500;

/// Value of an operator that is not set in any zone.
pub fn default_value(operator: u16) -> i16 {
    match operator {
        INITIAL_FILTER_FC => FILTER_OPEN,
        DELAY_MOD_ENV | ATTACK_MOD_ENV | HOLD_MOD_ENV | DECAY_MOD_ENV | RELEASE_MOD_ENV => INSTANT,
        DELAY_VOL_ENV | ATTACK_VOL_ENV | HOLD_VOL_ENV | DECAY_VOL_ENV | RELEASE_VOL_ENV => INSTANT,
        SCALE_TUNING => 100,
        OVERRIDING_ROOT_KEY => -1,
        _ => 0,
    }
}

/// Operators that are only valid at instrument level and never summed.
fn is_instrument_only(operator: u16) -> bool {
    matches!(
        operator,
        START_ADDRS_OFFSET
            | END_ADDRS_OFFSET
            | START_LOOP_ADDRS_OFFSET
            | END_LOOP_ADDRS_OFFSET
            | START_ADDRS_COARSE_OFFSET
            | END_ADDRS_COARSE_OFFSET
            | START_LOOP_ADDRS_COARSE_OFFSET
            | END_LOOP_ADDRS_COARSE_OFFSET
            | SAMPLE_ID
            | SAMPLE_MODES
            | OVERRIDING_ROOT_KEY
    )
}

fn is_range(operator: u16) -> bool {
    operator == KEY_RANGE || operator == VEL_RANGE
}

/// The generators of one zone by operator. Later duplicates win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generators {
    values: BTreeMap<u16, u16>,
}

impl Generators {
    pub fn from_records(records: &[GeneratorRecord]) -> Self {
        let mut generators = Self::default();
        for record in records {
            generators.values.insert(record.operator, record.amount);
        }
        generators
    }

    pub fn contains(&self, operator: u16) -> bool {
        self.values.contains_key(&operator)
    }

    pub fn set(&mut self, operator: u16, amount: u16) {
        self.values.insert(operator, amount);
    }

    pub fn raw(&self, operator: u16) -> Option<u16> {
        self.values.get(&operator).copied()
    }

    pub fn signed(&self, operator: u16) -> Option<i16> {
        self.raw(operator).map(|v| v as i16)
    }

    /// Signed value or the operator's default.
    pub fn value(&self, operator: u16) -> i16 {
        self.signed(operator).unwrap_or_else(|| default_value(operator))
    }

    pub fn range(&self, operator: u16) -> Option<(u8, u8)> {
        self.raw(operator).map(|v| GeneratorRecord::unsigned(operator, v).as_range())
    }

    /// Local values override the ones of the global zone.
    pub fn with_defaults(&self, global: &Generators) -> Generators {
        let mut merged = global.clone();
        merged.values.extend(self.values.iter().map(|(k, v)| (*k, *v)));
        merged
    }

    /// Apply preset level generators to instrument level values.
    ///
    /// Ranges are intersected, values are added to the instrument value (or
    /// its default). Operators that are only valid in instruments are ignored.
    pub fn apply_preset(&self, preset: &Generators) -> Generators {
        let mut result = self.clone();
        for (&operator, &amount) in &preset.values {
            if is_range(operator) {
                let (low, high) = GeneratorRecord::unsigned(operator, amount).as_range();
                let (own_low, own_high) = self.range(operator).unwrap_or((0, 127));
                let combined = GeneratorRecord::range(operator, own_low.max(low), own_high.min(high));
                result.values.insert(operator, combined.amount);
            } else if operator != INSTRUMENT && !is_instrument_only(operator) {
                let sum = self.value(operator) as i32 + amount as i16 as i32;
                let clamped = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                result.values.insert(operator, clamped as u16);
            }
        }
        result
    }

    /// Combined fine and coarse (32768 frames) address offset.
    pub fn address_offset(&self, fine: u16, coarse: u16) -> i64 {
        self.signed(fine).unwrap_or(0) as i64 + self.signed(coarse).unwrap_or(0) as i64 * 32768
    }

    pub fn to_records(&self) -> Vec<GeneratorRecord> {
        self.values
            .iter()
            .map(|(&operator, &amount)| GeneratorRecord::unsigned(operator, amount))
            .collect()
    }
}

/// Push an address offset as fine and, if needed, coarse generator.
pub fn push_offset(records: &mut Vec<GeneratorRecord>, fine: u16, coarse: u16, offset: i64) {
    if offset == 0 {
        return;
    }
    let coarse_value = offset / 32768;
    let fine_value = offset % 32768;
    if fine_value != 0 {
        records.push(GeneratorRecord::signed(fine, fine_value as i16));
    }
    if coarse_value != 0 {
        records.push(GeneratorRecord::signed(coarse, coarse_value.clamp(i16::MIN as i64, i16::MAX as i64) as i16));
    }
}
