// Song assembly.
//
// A song is five patterns laid over a fixed 192-step timeline:
//
//   [0, 32) intro | [32, 96) main | [96, 128) breakdown | [128, 160) drop | [160, 192) outro
//
// The lead voice reads the active zone's pattern at `step % pattern.len()`,
// so a pattern shorter than its zone loops. The bass, kick, hihat and
// distortion voices run on fixed modulo grids against the song step and do
// not care what the lead is doing. Cymbal hits and distortion wobbles are
// rare random events on any step.

use std::ops::Range;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::bank::ScaleBank;
use crate::note::{Note, NoteLength, PitchClass};
use crate::pattern::{generate_pattern, Pattern};
use crate::scale::{GeneratedScale, ScaleKind};
use crate::store::PatternStore;
use crate::voice::{Command, Param, Voice};

pub const SONG_STEPS: usize = 192;
pub const ZONE_BOUNDARIES: [usize; 6] = [0, 32, 96, 128, 160, 192];

pub const CYMBAL_CHANCE: f32 = 0.05;
pub const WOBBLE_CHANCE: f32 = 0.02;

const BASS_ROOT: Note = Note::new(PitchClass::C, 0);
const BASS_FIFTH: Note = Note::new(PitchClass::G, 0);
const KICK_NOTE: Note = Note::new(PitchClass::C, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Zone {
    Intro,
    Main,
    Breakdown,
    Drop,
    Outro,
}

impl Zone {
    pub const ALL: [Zone; 5] = [Zone::Intro, Zone::Main, Zone::Breakdown, Zone::Drop, Zone::Outro];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn range(self) -> Range<usize> {
        let i = self.index();
        ZONE_BOUNDARIES[i]..ZONE_BOUNDARIES[i + 1]
    }

    /// Length of the pattern generated for this zone.
    pub fn pattern_len(self) -> usize {
        match self {
            Zone::Main => 64,
            _ => 32,
        }
    }

    /// Zone covering `step`, wrapping at the song length.
    pub fn at(step: usize) -> Zone {
        let step = step % SONG_STEPS;
        Zone::ALL
            .into_iter()
            .find(|zone| zone.range().contains(&step))
            .unwrap_or(Zone::Outro)
    }
}

#[derive(Debug, Clone)]
pub struct SongPlan {
    pub bpm: f32,
    pub scale_slot: ScaleKind,
    pub scale: GeneratedScale,
    patterns: [Pattern; 5],
}

impl SongPlan {
    pub fn pattern(&self, zone: Zone) -> &Pattern {
        &self.patterns[zone.index()]
    }

    pub fn patterns(&self) -> &[Pattern; 5] {
        &self.patterns
    }

    /// Appends the commands for song step `step` to `out`. Does not allocate
    /// once `out` has grown to a handful of entries.
    pub fn step(&self, step: usize, time: f64, rng: &mut fastrand::Rng, out: &mut Vec<Command>) {
        let i = step % SONG_STEPS;

        if let Some(lead) = self.pattern(Zone::at(i)).lead_at(i) {
            out.push(Command::trigger(Voice::Lead, Some(lead.note), lead.length, time, lead.velocity));
        }

        if i % 8 == 0 {
            out.push(Command::trigger(Voice::Bass, Some(BASS_ROOT), NoteLength::Eighth, time, 1.0));
        } else if i % 4 == 2 {
            out.push(Command::trigger(Voice::Bass, Some(BASS_FIFTH), NoteLength::Sixteenth, time, 0.8));
        }

        if i % 4 == 0 {
            out.push(Command::trigger(Voice::Kick, Some(KICK_NOTE), NoteLength::Sixteenth, time, 1.0));
        } else if i % 8 == 6 {
            out.push(Command::trigger(Voice::Kick, Some(KICK_NOTE), NoteLength::Sixteenth, time, 0.8));
        }

        if i % 4 == 0 {
            out.push(Command::trigger(Voice::HiHat, None, NoteLength::Sixteenth, time, 0.5));
        } else if i % 2 == 1 {
            out.push(Command::trigger(Voice::HiHat, None, NoteLength::ThirtySecond, time, 0.3));
        }

        if i % 8 == 0 {
            if let Some(note) = self.scale.pick(rng) {
                out.push(Command::trigger(Voice::Distortion, Some(note), NoteLength::Eighth, time, 0.9));
            }
        } else if i % 4 == 2 && rng.bool() {
            if let Some(note) = self.scale.pick(rng) {
                out.push(Command::trigger(Voice::Distortion, Some(note), NoteLength::Sixteenth, time, 0.7));
            }
        }

        if rng.f32() < CYMBAL_CHANCE {
            out.push(Command::trigger(Voice::Cymbal, None, NoteLength::Sixteenth, time, 0.3));
        }

        if rng.f32() < WOBBLE_CHANCE {
            out.push(Command::SetParam { param: Param::Distortion, value: 0.8 + rng.f32() * 0.2 });
            out.push(Command::SetParam { param: Param::BassDistortion, value: 0.9 + rng.f32() * 0.1 });
        }
    }
}

/// Draws a scale slot from `bank`, generates the five zone patterns from it
/// and appends all five to `store` before returning.
///
/// A failed store write is logged and the song is still returned.
pub fn build_song<S: PatternStore>(
    bpm: f32,
    bank: &ScaleBank,
    note_density: f32,
    store: &mut S,
    rng: &mut fastrand::Rng,
) -> SongPlan {
    let (scale_slot, scale) = bank.pick_random(rng);
    let scale = scale.clone();
    if scale.is_empty() {
        warn!(slot = scale_slot.name(), "song scale is empty, lead and distortion voices will rest");
    }

    let patterns = Zone::ALL.map(|zone| generate_pattern(&scale, zone.pattern_len(), note_density, rng));

    for pattern in &patterns {
        if let Err(e) = store.append(pattern.clone()) {
            warn!("pattern not persisted: {}", e);
        }
    }

    info!(bpm, slot = scale_slot.name(), notes = scale.len(), "song built");
    SongPlan { bpm, scale_slot, scale, patterns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::store::{JsonPatternStore, MemoryKv};

    fn song(seed: u64) -> (SongPlan, JsonPatternStore<MemoryKv>) {
        let mut rng = fastrand::Rng::with_seed(seed);
        let cfg = GenerationConfig { num_notes: 4, max_jump: 3, ..GenerationConfig::default() };
        let bank = ScaleBank::generate(&cfg, &mut rng);
        let mut store = JsonPatternStore::open(MemoryKv::new());
        let plan = build_song(140.0, &bank, 0.6, &mut store, &mut rng);
        (plan, store)
    }

    fn triggers(commands: &[Command], voice: Voice) -> Vec<crate::voice::VoiceCommand> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Trigger(t) if t.voice == voice => Some(*t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn zone_boundaries_are_fixed() {
        assert_eq!(Zone::at(0), Zone::Intro);
        assert_eq!(Zone::at(31), Zone::Intro);
        assert_eq!(Zone::at(32), Zone::Main);
        assert_eq!(Zone::at(95), Zone::Main);
        assert_eq!(Zone::at(96), Zone::Breakdown);
        assert_eq!(Zone::at(128), Zone::Drop);
        assert_eq!(Zone::at(160), Zone::Outro);
        assert_eq!(Zone::at(191), Zone::Outro);
        assert_eq!(Zone::at(192), Zone::Intro);
        let total: usize = Zone::ALL.iter().map(|z| z.range().len()).sum();
        assert_eq!(total, SONG_STEPS);
    }

    #[test]
    fn build_persists_five_patterns_of_zone_lengths() {
        let (plan, store) = song(1);
        assert_eq!(store.len(), 5);
        for (zone, stored) in Zone::ALL.iter().zip(store.list()) {
            assert_eq!(plan.pattern(*zone), stored);
            assert_eq!(stored.len(), zone.pattern_len());
            assert_eq!(stored.scale, plan.scale);
        }
    }

    #[test]
    fn each_build_appends_five_more() {
        let mut rng = fastrand::Rng::with_seed(2);
        let bank = ScaleBank::generate(&GenerationConfig::default(), &mut rng);
        let mut store = JsonPatternStore::open(MemoryKv::new());
        for n in 1..=3 {
            build_song(140.0, &bank, 0.6, &mut store, &mut rng);
            assert_eq!(store.len(), 5 * n);
        }
    }

    #[test]
    fn lead_comes_from_the_active_zone() {
        for seed in 0..20 {
            let (plan, _) = song(seed);
            let mut rng = fastrand::Rng::with_seed(seed);
            let mut out = Vec::new();

            plan.step(31, 0.0, &mut rng, &mut out);
            let lead = triggers(&out, Voice::Lead);
            assert_eq!(lead.first().map(|t| t.note), plan.pattern(Zone::Intro).lead_at(31).map(|s| Some(s.note)));

            out.clear();
            plan.step(32, 0.0, &mut rng, &mut out);
            let lead = triggers(&out, Voice::Lead);
            let expected = plan.pattern(Zone::Main).lead_at(32);
            // 32 is a downbeat, so the main pattern always plays it
            assert!(expected.is_some());
            assert_eq!(lead.len(), 1);
            assert_eq!(lead[0].note, expected.map(|s| s.note));
            assert_eq!(lead[0].velocity, expected.map(|s| s.velocity).unwrap_or_default());
        }
    }

    #[test]
    fn short_patterns_loop_inside_longer_zones() {
        let (plan, _) = song(3);
        let main = plan.pattern(Zone::Main);
        let mut rng = fastrand::Rng::with_seed(0);
        let mut out = Vec::new();
        // main spans 32..96 with a 64-step pattern: step 70 reads index 6
        plan.step(70, 0.0, &mut rng, &mut out);
        assert_eq!(
            triggers(&out, Voice::Lead).first().map(|t| t.note),
            main.lead_at(6).map(|s| Some(s.note))
        );
    }

    #[test]
    fn auxiliary_grids() {
        let (plan, _) = song(4);
        let mut rng = fastrand::Rng::with_seed(4);
        let mut out = Vec::new();
        for i in 0..SONG_STEPS {
            out.clear();
            plan.step(i, i as f64 * 0.1, &mut rng, &mut out);

            let bass = triggers(&out, Voice::Bass);
            match (i % 8, i % 4) {
                (0, _) => assert_eq!(bass[0].note, Some(BASS_ROOT)),
                (_, 2) => assert_eq!(bass[0].note, Some(BASS_FIFTH)),
                _ => assert!(bass.is_empty()),
            }

            let kick = triggers(&out, Voice::Kick);
            if i % 4 == 0 {
                assert_eq!(kick[0].velocity, 1.0);
            } else if i % 8 == 6 {
                assert_eq!(kick[0].velocity, 0.8);
            } else {
                assert!(kick.is_empty());
            }

            let hats = triggers(&out, Voice::HiHat);
            match i % 4 {
                0 => assert_eq!(hats[0].duration, NoteLength::Sixteenth),
                2 => assert!(hats.is_empty()),
                _ => assert_eq!(hats[0].duration, NoteLength::ThirtySecond),
            }

            let dist = triggers(&out, Voice::Distortion);
            if i % 8 == 0 {
                assert_eq!(dist.len(), 1);
                assert!(plan.scale.notes.contains(&dist[0].note.unwrap()));
            } else if i % 4 != 2 {
                assert!(dist.is_empty());
            }

            assert!(out.iter().all(|c| match c {
                Command::Trigger(t) => t.time == i as f64 * 0.1,
                Command::SetParam { .. } => true,
            }));
        }
    }

    #[test]
    fn rare_events_happen_at_roughly_their_rates() {
        let (plan, _) = song(5);
        let mut rng = fastrand::Rng::with_seed(5);
        let mut out = Vec::new();
        let n = 40_000;
        let (mut cymbals, mut wobbles) = (0, 0);
        for i in 0..n {
            out.clear();
            plan.step(i, 0.0, &mut rng, &mut out);
            cymbals += triggers(&out, Voice::Cymbal).len();
            wobbles += out.iter().filter(|c| matches!(c, Command::SetParam { param: Param::Distortion, .. })).count();
        }
        let cymbal_rate = cymbals as f32 / n as f32;
        let wobble_rate = wobbles as f32 / n as f32;
        assert!((cymbal_rate - 0.05).abs() < 0.01, "cymbal rate {cymbal_rate}");
        assert!((wobble_rate - 0.02).abs() < 0.006, "wobble rate {wobble_rate}");
    }

    #[test]
    fn empty_scale_song_keeps_the_drums() {
        let mut rng = fastrand::Rng::with_seed(6);
        let cfg = GenerationConfig { enabled_scales: Default::default(), ..GenerationConfig::default() };
        let bank = ScaleBank::generate(&cfg, &mut rng);
        let mut store = JsonPatternStore::open(MemoryKv::new());
        let plan = build_song(140.0, &bank, 0.6, &mut store, &mut rng);
        let mut out = Vec::new();
        plan.step(0, 0.0, &mut rng, &mut out);
        assert!(triggers(&out, Voice::Lead).is_empty());
        assert!(triggers(&out, Voice::Distortion).is_empty());
        assert_eq!(triggers(&out, Voice::Kick).len(), 1);
        assert_eq!(store.len(), 5);
    }
}
