// Scale generation.
//
// A generated scale is a short melodic walk over one of the built-in interval
// templates. Each step moves between `min_separation` and `max_jump`
// semitones and never revisits an interval. When the walk paints itself into
// a corner the whole attempt is thrown away and started over with a freshly
// drawn template; the restart (rather than backtracking) is what gives the
// output its distribution. Attempts are capped so that jointly infeasible
// constraints end in `ConstraintInfeasible` instead of spinning.

use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::config::GenerationConfig;
use crate::error::TranceError;
use crate::note::{Note, PitchClass};

pub const MAX_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScaleKind {
    Phrygian,
    Harmonic,
    Diminished,
    WholeTone,
    Pentatonic,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 5] = [
        ScaleKind::Phrygian,
        ScaleKind::Harmonic,
        ScaleKind::Diminished,
        ScaleKind::WholeTone,
        ScaleKind::Pentatonic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScaleKind::Phrygian => "Phrygian",
            ScaleKind::Harmonic => "Harmonic",
            ScaleKind::Diminished => "Diminished",
            ScaleKind::WholeTone => "Whole Tone",
            ScaleKind::Pentatonic => "Pentatonic",
        }
    }

    /// Semitone offsets from C, ascending and within one octave.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ScaleKind::Phrygian => &[0, 1, 3, 5, 7, 8, 10],     // C Db Eb F G Ab Bb
            ScaleKind::Harmonic => &[0, 2, 4, 5, 7, 8, 11],     // C D E F G Ab B
            ScaleKind::Diminished => &[0, 2, 3, 5, 6, 8, 9, 11], // C D Eb F Gb Ab A B
            ScaleKind::WholeTone => &[0, 2, 4, 6, 8, 10],       // C D E Gb Ab Bb
            ScaleKind::Pentatonic => &[0, 2, 4, 7, 9],          // C D E G A
        }
    }
}

/// An ordered run of notes produced by one successful walk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ScaleRepr")]
pub struct GeneratedScale {
    /// Template the walk ran over; `None` for empty or legacy scales.
    pub template: Option<ScaleKind>,
    /// The chosen interval values, in walk order.
    pub steps: Vec<u8>,
    pub notes: Vec<Note>,
}

impl GeneratedScale {
    pub fn empty() -> Self {
        GeneratedScale::default()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn pick(&self, rng: &mut fastrand::Rng) -> Option<Note> {
        if self.notes.is_empty() {
            None
        } else {
            Some(self.notes[rng.usize(..self.notes.len())])
        }
    }
}

// Stored patterns written before scales carried their walk were bare arrays
// of note names.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScaleRepr {
    Full {
        #[serde(default)]
        template: Option<ScaleKind>,
        #[serde(default)]
        steps: Vec<u8>,
        notes: Vec<Note>,
    },
    Bare(Vec<Note>),
}

impl From<ScaleRepr> for GeneratedScale {
    fn from(repr: ScaleRepr) -> Self {
        match repr {
            ScaleRepr::Full { template, steps, notes } => GeneratedScale { template, steps, notes },
            ScaleRepr::Bare(notes) => GeneratedScale {
                template: None,
                steps: notes.iter().map(|n| n.pitch.semitone()).collect(),
                notes,
            },
        }
    }
}

/// Generates one scale under `cfg`.
///
/// No enabled templates, no enabled notes or a zero note count give an empty
/// scale, which callers treat as "nothing playable".
pub fn generate_scale(cfg: &GenerationConfig, rng: &mut fastrand::Rng) -> Result<GeneratedScale, TranceError> {
    let templates: Vec<ScaleKind> = ScaleKind::ALL
        .into_iter()
        .filter(|k| cfg.enabled_scales.contains(k))
        .collect();

    if templates.is_empty() || cfg.enabled_notes.is_empty() || cfg.num_notes == 0 {
        debug!("empty selection, returning an empty scale");
        return Ok(GeneratedScale::empty());
    }

    for attempt in 1..=MAX_ATTEMPTS {
        if let Some(scale) = attempt_scale(cfg, &templates, rng) {
            debug!(attempt, template = ?scale.template, notes = scale.len(), "scale generated");
            return Ok(scale);
        }
    }

    Err(TranceError::ConstraintInfeasible { attempts: MAX_ATTEMPTS })
}

/// One walk from a random template and start. `None` means the walk reached
/// a step with no legal continuation.
fn attempt_scale(cfg: &GenerationConfig, templates: &[ScaleKind], rng: &mut fastrand::Rng) -> Option<GeneratedScale> {
    let kind = templates[rng.usize(..templates.len())];
    let eligible: Vec<u8> = kind
        .intervals()
        .iter()
        .copied()
        .filter(|&iv| cfg.enabled_notes.contains(&PitchClass::from_semitone(iv)))
        .collect();

    if eligible.is_empty() {
        return None;
    }

    let mut steps = Vec::with_capacity(cfg.num_notes);
    steps.push(eligible[rng.usize(..eligible.len())]);

    let mut candidates = Vec::with_capacity(eligible.len());
    while steps.len() < cfg.num_notes {
        let last = steps[steps.len() - 1];
        candidates.clear();
        candidates.extend(eligible.iter().copied().filter(|&iv| {
            let distance = iv.abs_diff(last);
            distance <= cfg.max_jump && distance >= cfg.min_separation && !steps.contains(&iv)
        }));

        if candidates.is_empty() {
            return None;
        }
        steps.push(candidates[rng.usize(..candidates.len())]);
    }

    let notes = steps.iter().map(|&s| Note::from_semitone(s)).collect();
    Some(GeneratedScale { template: Some(kind), steps, notes })
}
