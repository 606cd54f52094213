use std::collections::BTreeSet;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::TranceError;
use crate::note::PitchClass;
use crate::scale::ScaleKind;

pub const DEFAULT_BPM: u32 = 200;
/// Floor for gain-to-decibel conversion, stands in for silence.
pub const MIN_DB: f32 = -100.0;

/// Raw control values as a UI would hold them: levels are 0-100 integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlSurface {
    pub note_count: usize,
    pub max_jump: u8,
    pub min_separation: u8,
    pub enabled_notes: BTreeSet<PitchClass>,
    pub enabled_scales: BTreeSet<ScaleKind>,
    pub bass_level: u8,
    pub distortion_level: u8,
    pub reverb_level: u8,
    pub delay_level: u8,
    pub note_density: u8,
    // Read by the UI, generation ignores it
    pub velocity_range: u8,
    pub bpm: u32,
}

impl Default for ControlSurface {
    fn default() -> Self {
        ControlSurface {
            note_count: 2,
            max_jump: 2,
            min_separation: 1,
            enabled_notes: PitchClass::ALL.into_iter().collect(),
            enabled_scales: ScaleKind::ALL.into_iter().collect(),
            bass_level: 80,
            distortion_level: 80,
            reverb_level: 30,
            delay_level: 40,
            note_density: 60,
            velocity_range: 50,
            bpm: DEFAULT_BPM,
        }
    }
}

impl ControlSurface {
    pub fn load(path: &Path) -> Result<Self, TranceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranceError::Config(format!("{}: {}", path.display(), e)))?;
        let surface: ControlSurface = serde_json::from_str(&content)
            .map_err(|e| TranceError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(surface.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<(), TranceError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TranceError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| TranceError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Clamps every control into its range. Max jump is pushed above min
    /// separation when the two cross.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.note_count = out.note_count.clamp(1, 12);
        out.min_separation = out.min_separation.min(11);
        out.max_jump = out.max_jump.clamp(1, 12);
        if out.max_jump <= out.min_separation {
            out.max_jump = out.min_separation + 1;
        }
        out.bass_level = out.bass_level.min(100);
        out.distortion_level = out.distortion_level.min(100);
        out.reverb_level = out.reverb_level.min(100);
        out.delay_level = out.delay_level.min(100);
        out.note_density = out.note_density.clamp(10, 100);
        out.velocity_range = out.velocity_range.clamp(10, 100);
        out.bpm = out.bpm.clamp(20, 400);
        out
    }

    pub fn generation_config(&self) -> GenerationConfig {
        let n = self.normalized();
        GenerationConfig {
            num_notes: n.note_count,
            max_jump: n.max_jump,
            min_separation: n.min_separation,
            enabled_notes: n.enabled_notes,
            enabled_scales: n.enabled_scales,
            note_density: n.note_density as f32 / 100.0,
        }
    }

    pub fn mix_levels(&self) -> MixLevels {
        let n = self.normalized();
        MixLevels {
            bass_gain: n.bass_level as f32 / 100.0,
            distortion: n.distortion_level as f32 / 100.0,
            reverb_wet: n.reverb_level as f32 / 100.0,
            delay_wet: n.delay_level as f32 / 100.0,
        }
    }
}

/// Immutable input to the scale and pattern generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub num_notes: usize,
    pub max_jump: u8,
    pub min_separation: u8,
    pub enabled_notes: BTreeSet<PitchClass>,
    pub enabled_scales: BTreeSet<ScaleKind>,
    /// Global trigger-density knob in [0, 1].
    pub note_density: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        ControlSurface::default().generation_config()
    }
}

impl GenerationConfig {
    /// True when the two configs would produce differently shaped scales.
    /// Density only shapes patterns, so it is left out.
    pub fn scale_inputs_differ(&self, other: &GenerationConfig) -> bool {
        self.num_notes != other.num_notes
            || self.max_jump != other.max_jump
            || self.min_separation != other.min_separation
            || self.enabled_notes != other.enabled_notes
            || self.enabled_scales != other.enabled_scales
    }
}

/// Continuous mixer levels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixLevels {
    pub bass_gain: f32,
    pub distortion: f32,
    pub reverb_wet: f32,
    pub delay_wet: f32,
}

impl MixLevels {
    pub fn bass_volume_db(&self) -> f32 {
        gain_to_db(self.bass_gain)
    }

    pub fn distortion_amount(&self) -> f32 {
        0.5 + self.distortion * 0.5
    }

    pub fn bass_distortion_amount(&self) -> f32 {
        0.7 + self.distortion * 0.3
    }
}

pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        MIN_DB
    } else {
        (20.0 * gain.log10()).max(MIN_DB)
    }
}
