//! Unit conversions between the canonical model and format-native values.
//!
//! Each pair of functions is an exact inverse on its valid domain so that
//! converting back and forth is stable within floating point tolerance.

/// Reference frequency of absolute cent 0 (MIDI note 0).
pub const ABSOLUTE_CENT_BASE_HZ: f64 = 8.175_798_915_643_707;

/// MPC volume at the lower end of the linear segment (-12 dB).
pub const MPC_LOW_VALUE: f64 = 0.123_838;
pub const MPC_LOW_DB: f64 = -12.0;
pub const MPC_HIGH_DB: f64 = 6.0;

/// Shortest envelope time a SoundFont can express.
pub const SF2_MIN_TIMECENTS: i32 = -12000;

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

pub fn linear_to_db(value: f64) -> f64 {
    if value <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * value.log10()
    }
}

/// Convert a gain in dB into the MPC volume range `[0, 1]`.
///
/// The curve is linear between -12 dB and +6 dB and logarithmic below,
/// reaching 0 at minus infinity. Values above +6 dB are clamped.
pub fn db_to_mpc_volume(db: f64) -> f64 {
    if db == f64::NEG_INFINITY {
        return 0.0;
    }
    let db = db.min(MPC_HIGH_DB);
    if db >= MPC_LOW_DB {
        MPC_LOW_VALUE + (db - MPC_LOW_DB) / (MPC_HIGH_DB - MPC_LOW_DB) * (1.0 - MPC_LOW_VALUE)
    } else {
        MPC_LOW_VALUE * db_to_linear(db - MPC_LOW_DB)
    }
}

/// Inverse of [`db_to_mpc_volume`].
pub fn mpc_volume_to_db(volume: f64) -> f64 {
    if volume <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let volume = volume.min(1.0);
    if volume >= MPC_LOW_VALUE {
        MPC_LOW_DB + (volume - MPC_LOW_VALUE) / (1.0 - MPC_LOW_VALUE) * (MPC_HIGH_DB - MPC_LOW_DB)
    } else {
        MPC_LOW_DB + linear_to_db(volume / MPC_LOW_VALUE)
    }
}

/// SoundFont timecents to seconds.
pub fn timecents_to_seconds(timecents: i32) -> f64 {
    2f64.powf(timecents as f64 / 1200.0)
}

pub fn seconds_to_timecents(seconds: f64) -> i32 {
    if seconds <= 0.0 {
        return SF2_MIN_TIMECENTS;
    }
    ((1200.0 * seconds.log2()).round() as i32).clamp(SF2_MIN_TIMECENTS, 8000)
}

pub fn absolute_cents_to_hz(cents: f64) -> f64 {
    ABSOLUTE_CENT_BASE_HZ * 2f64.powf(cents / 1200.0)
}

pub fn hz_to_absolute_cents(hz: f64) -> f64 {
    if hz <= 0.0 {
        0.0
    } else {
        1200.0 * (hz / ABSOLUTE_CENT_BASE_HZ).log2()
    }
}

/// Attenuation in centibels to a gain in dB.
pub fn centibels_to_db(centibels: f64) -> f64 {
    -centibels / 10.0
}

pub fn db_to_centibels(db: f64) -> f64 {
    -db * 10.0
}

/// Map a pan value of `-range..range` to `-1..1`.
pub fn normalize_pan(value: f64, range: f64) -> f64 {
    if range <= 0.0 {
        0.0
    } else {
        (value / range).clamp(-1.0, 1.0)
    }
}

/// Map `-1..1` to `-range..range`.
pub fn denormalize_pan(pan: f64, range: f64) -> f64 {
    pan.clamp(-1.0, 1.0) * range
}

/// Frequency of a MIDI note in equal temperament.
pub fn note_to_hz(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}
