//! Envelopes and filters.

/// A DAHDSR envelope. Times are in seconds, levels in the range 0..1.
///
/// A stage that the source format did not specify stays `None`; it is not the
/// same as a stage of zero length.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Envelope {
    pub delay: Option<f64>,
    pub start: Option<f64>,
    pub attack: Option<f64>,
    pub hold: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
}

impl Envelope {
    /// True if no stage is set.
    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    /// Fill the unset stages from `other`.
    pub fn merge_missing(&mut self, other: &Envelope) {
        fn fill(target: &mut Option<f64>, value: Option<f64>) {
            if target.is_none() {
                *target = value;
            }
        }
        fill(&mut self.delay, other.delay);
        fill(&mut self.start, other.start);
        fill(&mut self.attack, other.attack);
        fill(&mut self.hold, other.hold);
        fill(&mut self.decay, other.decay);
        fill(&mut self.sustain, other.sustain);
        fill(&mut self.release, other.release);
    }
}

/// An envelope applied to some parameter with a modulation depth.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopeModulation {
    /// Depth in cents for pitch, normalised -1..1 otherwise.
    pub depth: f64,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
    BandRejection,
}

impl FilterType {
    pub fn name(self) -> &'static str {
        match self {
            Self::LowPass => "lowpass",
            Self::HighPass => "highpass",
            Self::BandPass => "bandpass",
            Self::BandRejection => "bandreject",
        }
    }
}

/// A resonant filter with optional envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    pub filter_type: FilterType,
    /// 1 to 4 poles (6 dB per pole).
    pub poles: u8,
    /// Cutoff frequency in Hz.
    pub cutoff: f64,
    /// Resonance 0..1.
    pub resonance: f64,
    /// Envelope depth in cents.
    pub envelope_depth: f64,
    pub envelope: Envelope,
}

impl Filter {
    pub fn new(filter_type: FilterType, poles: u8, cutoff: f64, resonance: f64) -> Self {
        Self {
            filter_type,
            poles: poles.clamp(1, 4),
            cutoff,
            resonance: resonance.clamp(0.0, 1.0),
            envelope_depth: 0.0,
            envelope: Envelope::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_not_zero() {
        let mut env = Envelope::default();
        assert!(env.is_unset());
        env.attack = Some(0.0);
        assert!(!env.is_unset());
    }

    #[test]
    fn test_merge_missing_keeps_own_values() {
        let mut env = Envelope {
            attack: Some(0.1),
            ..Default::default()
        };
        env.merge_missing(&Envelope {
            attack: Some(0.5),
            release: Some(1.0),
            ..Default::default()
        });
        assert_eq!(env.attack, Some(0.1));
        assert_eq!(env.release, Some(1.0));
    }

    #[test]
    fn test_filter_clamps() {
        let filter = Filter::new(FilterType::LowPass, 9, 1000.0, 2.0);
        assert_eq!(filter.poles, 4);
        assert_eq!(filter.resonance, 1.0);
    }
}
