use crate::note::NoteLength;
use crate::voice::Voice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformType {
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32, // seconds
    pub decay: f32,
    pub sustain: f32, // level
    pub release: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub cutoff: f32, // Cutoff frequency in Hz
    pub resonance: f32, // Q factor
    pub filter_type: FilterType,
}

/// Synth settings a backend applies to one voice before playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub waveform: WaveformType,
    pub envelope: Envelope,
    pub filter: Option<FilterParams>,
    /// Lead is the only voice that overlaps its own notes.
    pub polyphonic: bool,
}

impl Patch {
    /// The stock patch for `voice`. The lead draws its oscillator and envelope
    /// at random so every session sounds a little different.
    pub fn for_voice(voice: Voice, rng: &mut fastrand::Rng) -> Self {
        match voice {
            Voice::Lead => {
                let waveforms = [WaveformType::Sawtooth, WaveformType::Square, WaveformType::Triangle];
                Patch {
                    waveform: waveforms[rng.usize(..waveforms.len())],
                    envelope: Envelope {
                        attack: 0.01 + rng.f32() * 0.02,
                        decay: 0.1 + rng.f32() * 0.3,
                        sustain: 0.1 + rng.f32() * 0.2,
                        release: 0.3 + rng.f32() * 0.4,
                    },
                    filter: None,
                    polyphonic: true,
                }
            }
            Voice::Bass => Patch {
                waveform: WaveformType::Sawtooth,
                envelope: Envelope { attack: 0.001, decay: 0.4, sustain: 0.2, release: 0.5 },
                filter: Some(FilterParams { cutoff: 200.0, resonance: 2.0, filter_type: FilterType::LowPass }),
                polyphonic: false,
            },
            Voice::Kick => Patch {
                waveform: WaveformType::Sine,
                envelope: Envelope { attack: 0.001, decay: 0.2, sustain: 0.0, release: 0.1 },
                filter: None,
                polyphonic: false,
            },
            Voice::Distortion => Patch {
                waveform: WaveformType::Sawtooth,
                envelope: Envelope { attack: 0.001, decay: 0.1, sustain: 0.4, release: 0.2 },
                filter: None,
                polyphonic: false,
            },
            Voice::HiHat => Patch {
                waveform: WaveformType::Noise,
                envelope: Envelope { attack: 0.001, decay: 0.1, sustain: 0.0, release: 0.1 },
                filter: None,
                polyphonic: false,
            },
            Voice::Cymbal => Patch {
                waveform: WaveformType::Noise,
                envelope: Envelope { attack: 0.001, decay: 0.2, sustain: 0.0, release: 0.1 },
                filter: None,
                polyphonic: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub decay: f32, // seconds
    pub wet: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayParams {
    pub time: NoteLength,
    pub feedback: f32,
    pub wet: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionParams {
    pub amount: f32,
    pub wet: f32,
}

/// Shared effect units. Lead, kick and distortion voices feed `distortion`,
/// bass feeds `bass_distortion`, and everything ends in reverb then delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectRack {
    pub distortion: DistortionParams,
    pub bass_distortion: DistortionParams,
    pub reverb: ReverbParams,
    pub delay: DelayParams,
}

impl EffectRack {
    pub fn randomized(rng: &mut fastrand::Rng) -> Self {
        let delay_times = [NoteLength::Eighth, NoteLength::Sixteenth, NoteLength::Quarter];
        EffectRack {
            distortion: DistortionParams { amount: 0.95, wet: 0.8 },
            bass_distortion: DistortionParams { amount: 0.98, wet: 0.9 },
            reverb: ReverbParams {
                decay: 2.0 + rng.f32() * 4.0,
                wet: 0.3 + rng.f32() * 0.4,
            },
            delay: DelayParams {
                time: delay_times[rng.usize(..delay_times.len())],
                feedback: 0.3 + rng.f32() * 0.4,
                wet: 0.4,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_patch_stays_in_ranges() {
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..100 {
            let patch = Patch::for_voice(Voice::Lead, &mut rng);
            assert!(patch.polyphonic);
            assert_ne!(patch.waveform, WaveformType::Noise);
            assert!((0.01..=0.03).contains(&patch.envelope.attack));
            assert!((0.3..=0.7).contains(&patch.envelope.release));
        }
    }

    #[test]
    fn percussion_is_noise_without_sustain() {
        let mut rng = fastrand::Rng::with_seed(2);
        for voice in [Voice::HiHat, Voice::Cymbal] {
            let patch = Patch::for_voice(voice, &mut rng);
            assert_eq!(patch.waveform, WaveformType::Noise);
            assert_eq!(patch.envelope.sustain, 0.0);
        }
        let bass = Patch::for_voice(Voice::Bass, &mut rng);
        assert_eq!(bass.filter.map(|f| f.filter_type), Some(FilterType::LowPass));
    }

    #[test]
    fn rack_randomization_ranges() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..100 {
            let rack = EffectRack::randomized(&mut rng);
            assert!((2.0..=6.0).contains(&rack.reverb.decay));
            assert!((0.3..=0.7).contains(&rack.delay.feedback));
            assert_ne!(rack.delay.time, NoteLength::ThirtySecond);
        }
    }
}
