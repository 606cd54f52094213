// Pattern generation.
//
// A pattern is a run of steps cut into sections of 16 to 31 steps, each
// section drawing a kind that sets its trigger density and base velocity.
// The trigger decision per step works off the step's index in the whole
// pattern: every fourth step always plays, other even steps play at the
// section density, odd steps at half of it. That modulo structure is what
// makes the result sound busy on the beat and sparse between beats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::note::{Note, NoteLength};
use crate::scale::GeneratedScale;

pub const MIN_SECTION_LEN: usize = 16;
/// Exclusive upper bound on a drawn section width.
pub const MAX_SECTION_LEN: usize = 32;
/// Upper bound (exclusive) of the noise added on top of a section's velocity.
pub const VELOCITY_SPREAD: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    Build,
    Drop,
    Breakdown,
    Main,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Build,
        SectionKind::Drop,
        SectionKind::Breakdown,
        SectionKind::Main,
    ];

    /// Trigger density before the global note-density knob is applied.
    pub fn base_density(self) -> f32 {
        match self {
            SectionKind::Build => 0.3,
            SectionKind::Drop => 0.8,
            SectionKind::Breakdown => 0.2,
            SectionKind::Main => 0.6,
        }
    }

    pub fn base_velocity(self) -> f32 {
        match self {
            SectionKind::Build => 0.6,
            SectionKind::Drop => 0.9,
            SectionKind::Breakdown => 0.5,
            SectionKind::Main => 0.7,
        }
    }

    /// Drops lean on the shortest notes, everything else alternates between
    /// sixteenths and eighths.
    fn pick_length(self, rng: &mut fastrand::Rng) -> NoteLength {
        match self {
            SectionKind::Drop => {
                if rng.f32() < 0.3 { NoteLength::ThirtySecond } else { NoteLength::Sixteenth }
            }
            _ => {
                if rng.f32() < 0.5 { NoteLength::Eighth } else { NoteLength::Sixteenth }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub start: usize,
    pub len: usize,
    /// Density after scaling by the note-density knob.
    pub density: f32,
    pub velocity: f32,
}

impl Section {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Probability that step `index` (pattern-wide) triggers.
    pub fn trigger_probability(&self, index: usize) -> f32 {
        if index % 4 == 0 {
            1.0
        } else if index % 2 == 0 {
            self.density
        } else {
            self.density * 0.5
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub notes: Vec<Option<Note>>,
    pub rhythm: Vec<bool>,
    pub note_lengths: Vec<NoteLength>,
    /// In [0, 1]. Drop sections sit close enough to the top that their
    /// noise is clamped at 1.
    pub velocities: Vec<f32>,
    pub scale: GeneratedScale,
    #[serde(rename = "timestamp", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// What the lead voice plays on one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternStep {
    pub note: Note,
    pub length: NoteLength,
    pub velocity: f32,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.rhythm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhythm.is_empty()
    }

    /// The lead trigger at `index`, wrapping so short patterns loop. Rests
    /// and steps without a note (empty scale) give `None`.
    pub fn lead_at(&self, index: usize) -> Option<PatternStep> {
        if self.rhythm.is_empty() {
            return None;
        }
        let i = index % self.rhythm.len();
        if !self.rhythm[i] {
            return None;
        }
        let note = self.notes.get(i).copied().flatten()?;
        Some(PatternStep {
            note,
            length: self.note_lengths.get(i).copied().unwrap_or(NoteLength::Sixteenth),
            velocity: self.velocities.get(i).copied().unwrap_or(0.0),
        })
    }

    /// Checks the parallel-vector invariants: equal lengths, and rests carry
    /// no note and zero velocity.
    pub fn is_consistent(&self) -> bool {
        let n = self.rhythm.len();
        self.notes.len() == n
            && self.note_lengths.len() == n
            && self.velocities.len() == n
            && self
                .rhythm
                .iter()
                .zip(self.notes.iter().zip(&self.velocities))
                .all(|(&hit, (note, &vel))| hit || (note.is_none() && vel == 0.0))
    }
}

/// Cuts `[0, length)` into consecutive sections of random kind and width.
/// The last one is truncated to fit.
pub fn plan_sections(length: usize, note_density: f32, rng: &mut fastrand::Rng) -> Vec<Section> {
    let note_density = note_density.clamp(0.0, 1.0);
    let mut sections = Vec::new();
    let mut start = 0;
    while start < length {
        let kind = SectionKind::ALL[rng.usize(..SectionKind::ALL.len())];
        let len = rng.usize(MIN_SECTION_LEN..MAX_SECTION_LEN).min(length - start);
        sections.push(Section {
            kind,
            start,
            len,
            density: kind.base_density() * note_density,
            velocity: kind.base_velocity(),
        });
        start += len;
    }
    sections
}

/// Fills already planned sections with steps drawn from `scale`.
pub fn render_sections(scale: &GeneratedScale, sections: &[Section], rng: &mut fastrand::Rng) -> Pattern {
    let length = sections.last().map(Section::end).unwrap_or(0);
    let mut pattern = Pattern {
        notes: Vec::with_capacity(length),
        rhythm: Vec::with_capacity(length),
        note_lengths: Vec::with_capacity(length),
        velocities: Vec::with_capacity(length),
        scale: scale.clone(),
        created_at: Utc::now(),
    };

    for section in sections {
        for index in section.start..section.end() {
            let p = section.trigger_probability(index);
            let hit = p >= 1.0 || rng.f32() < p;
            pattern.rhythm.push(hit);

            if hit {
                pattern.notes.push(scale.pick(rng));
                pattern.note_lengths.push(section.kind.pick_length(rng));
                pattern.velocities.push((section.velocity + rng.f32() * VELOCITY_SPREAD).min(1.0));
            } else {
                pattern.notes.push(None);
                pattern.note_lengths.push(NoteLength::Sixteenth);
                pattern.velocities.push(0.0);
            }
        }
    }

    pattern
}

pub fn generate_pattern(scale: &GeneratedScale, length: usize, note_density: f32, rng: &mut fastrand::Rng) -> Pattern {
    let sections = plan_sections(length, note_density, rng);
    render_sections(scale, &sections, rng)
}
