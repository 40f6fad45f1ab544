//! Conversions between the legacy control scale and the device scale.
//!
//! The legacy API drives strength on a 0-200 scale where 0 means off; the
//! unit wants 1-276 plus a separate enable flag. Legacy waveform frames
//! (four frequency codes, four intensity percentages per 100 ms) become
//! custom-mode (frequency, pulse width) pairs.

use crate::protocol::{Preset, STRENGTH_MAX};

/// Ceiling of the legacy strength scale.
pub const LEGACY_MAX: u16 = 200;

/// One 100 ms legacy waveform frame: four frequency codes (opaque, nominally
/// 10-240) and four intensity percentages (0-100).
pub type PulseOp = ([u8; 4], [u8; 4]);

/// How the custom-mode frequency is derived from a legacy pulse frame.
///
/// The legacy frequency codes are not hertz, so averaging them is of
/// doubtful physical meaning; driving at a fixed 100 Hz and letting the
/// intensity envelope shape the sensation works noticeably better on real
/// hardware. The averaging variant is kept for callers that want it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FreqPolicy {
    #[default]
    Fixed100,
    AverageClamped,
}

/// Map a legacy strength onto the device's (enabled, strength) pair.
///
/// Zero turns the channel off; the device strength is parked at its
/// minimum so the next enable starts from a known value.
pub fn strength_to_device(legacy: u16) -> (bool, u16) {
    if legacy == 0 {
        return (false, 1);
    }
    let device = (u32::from(legacy) * 275 / 200) as u16 + 1;
    (true, device.min(STRENGTH_MAX))
}

/// Map a device strength back onto the legacy scale.
pub fn strength_to_legacy(device: u16) -> u16 {
    if device <= 1 {
        0
    } else {
        ((u32::from(device) - 1) * 200 / 275) as u16
    }
}

/// Convert one legacy pulse frame into custom-mode parameters.
pub fn pulse_to_wave(policy: FreqPolicy, pulse: &PulseOp) -> (u8, u8) {
    let (freqs, intensities) = pulse;
    let pulse_width = (intensities.iter().map(|i| u16::from(*i)).sum::<u16>() / 4) as u8;
    let frequency = match policy {
        FreqPolicy::Fixed100 => 100,
        FreqPolicy::AverageClamped => {
            let avg = freqs.iter().map(|f| u16::from(*f)).sum::<u16>() / 4;
            avg.clamp(1, 100) as u8
        }
    };
    (frequency, pulse_width)
}

/// Map a legacy preset catalog index (0-15) onto a device program.
/// Out-of-range indices fall back to program 1.
pub fn preset_from_index(index: u8) -> Preset {
    if index < 16 {
        Preset::from_code(index + 1).unwrap_or(Preset::P1)
    } else {
        Preset::P1
    }
}

#[cfg(test)]
mod test {
    use quickcheck_macros::quickcheck;

    use super::*;

    #[test]
    fn zero_disables() {
        assert_eq!(strength_to_device(0), (false, 1));
        assert_eq!(strength_to_legacy(1), 0);
        assert_eq!(strength_to_legacy(0), 0);
    }

    #[test]
    fn known_points() {
        assert_eq!(strength_to_device(100), (true, 138));
        assert_eq!(strength_to_legacy(138), 99);
        assert_eq!(strength_to_device(50), (true, 69));
        assert_eq!(strength_to_legacy(69), 49);
        assert_eq!(strength_to_device(200), (true, 276));
        assert_eq!(strength_to_legacy(276), 200);
    }

    #[quickcheck]
    fn device_strength_stays_in_range(legacy: u16) -> bool {
        let (_, device) = strength_to_device(legacy.min(LEGACY_MAX));
        (1..=STRENGTH_MAX).contains(&device)
    }

    #[quickcheck]
    fn legacy_roundtrip_within_one(legacy: u16) -> bool {
        let legacy = legacy % (LEGACY_MAX + 1);
        let (enabled, device) = strength_to_device(legacy);
        if legacy == 0 {
            !enabled && device == 1
        } else {
            let back = strength_to_legacy(device);
            enabled && back.abs_diff(legacy) <= 1
        }
    }

    #[quickcheck]
    fn device_roundtrip_within_two(device: u16) -> bool {
        let device = device % STRENGTH_MAX + 1;
        if device < 2 {
            return true;
        }
        let (_, back) = strength_to_device(strength_to_legacy(device));
        back.abs_diff(device) <= 2
    }

    #[test]
    fn fixed_frequency_policy() {
        let pulse = ([50, 50, 50, 50], [20, 40, 60, 80]);
        assert_eq!(pulse_to_wave(FreqPolicy::Fixed100, &pulse), (100, 50));
    }

    #[test]
    fn averaging_frequency_policy() {
        let pulse = ([50, 50, 50, 50], [20, 40, 60, 80]);
        assert_eq!(pulse_to_wave(FreqPolicy::AverageClamped, &pulse), (50, 50));
        // codes above the custom-mode range clamp down
        let pulse = ([240, 240, 240, 240], [0, 0, 0, 0]);
        assert_eq!(pulse_to_wave(FreqPolicy::AverageClamped, &pulse), (100, 0));
        // and degenerate zeros clamp up
        let pulse = ([0, 0, 0, 0], [100, 100, 100, 100]);
        assert_eq!(pulse_to_wave(FreqPolicy::AverageClamped, &pulse), (1, 100));
    }

    #[test]
    fn preset_index_mapping() {
        assert_eq!(preset_from_index(0).code(), 0x01);
        assert_eq!(preset_from_index(5).code(), 0x06);
        assert_eq!(preset_from_index(15).code(), 0x10);
        assert_eq!(preset_from_index(16).code(), 0x01);
        assert_eq!(preset_from_index(255).code(), 0x01);
    }
}
