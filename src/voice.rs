// Voices, trigger commands and the dispatcher that plays them.
//
// Composition code never touches a synth. Each step produces plain
// `Command` values; the `Dispatcher` owns the backend and turns commands into
// `SynthBackend` calls. Anything that can play a note with a duration and a
// velocity at a given time can sit behind the trait.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use crate::config::MixLevels;
use crate::instrument::{EffectRack, Patch};
use crate::note::{Note, NoteLength};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Voice {
    Lead,
    Bass,
    Kick,
    HiHat,
    Distortion,
    Cymbal,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Lead,
        Voice::Bass,
        Voice::Kick,
        Voice::HiHat,
        Voice::Distortion,
        Voice::Cymbal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Voice::Lead => "lead",
            Voice::Bass => "bass",
            Voice::Kick => "kick",
            Voice::HiHat => "hihat",
            Voice::Distortion => "distortion",
            Voice::Cymbal => "cymbal",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceCommand {
    pub voice: Voice,
    /// `None` for unpitched voices.
    pub note: Option<Note>,
    pub duration: NoteLength,
    /// Transport time in seconds.
    pub time: f64,
    pub velocity: f32,
}

/// Continuous parameters a backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Decibels.
    Volume(Voice),
    Distortion,
    BassDistortion,
    ReverbWet,
    DelayWet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Trigger(VoiceCommand),
    SetParam { param: Param, value: f32 },
}

impl Command {
    pub fn trigger(voice: Voice, note: Option<Note>, duration: NoteLength, time: f64, velocity: f32) -> Self {
        Command::Trigger(VoiceCommand { voice, note, duration, time, velocity })
    }
}

/// The synthesis side, as seen by the sequencer.
pub trait SynthBackend: Send {
    fn trigger_attack_release(&mut self, voice: Voice, note: Option<Note>, duration: NoteLength, time: f64, velocity: f32);

    fn set_param(&mut self, param: Param, value: f32);

    /// Cut any note still sounding on `voice`.
    fn release_all(&mut self, voice: Voice);

    fn configure_voice(&mut self, _voice: Voice, _patch: &Patch) {}

    fn configure_rack(&mut self, _rack: &EffectRack) {}
}

pub struct Dispatcher<B: SynthBackend> {
    backend: B,
    triggered: u64,
}

impl<B: SynthBackend> Dispatcher<B> {
    pub fn new(backend: B) -> Self {
        Dispatcher { backend, triggered: 0 }
    }

    pub fn dispatch(&mut self, command: &Command) {
        match *command {
            Command::Trigger(cmd) => {
                self.backend.trigger_attack_release(cmd.voice, cmd.note, cmd.duration, cmd.time, cmd.velocity);
                self.triggered += 1;
            }
            Command::SetParam { param, value } => self.backend.set_param(param, value),
        }
    }

    /// Plays and empties `commands`, keeping its allocation.
    pub fn dispatch_all(&mut self, commands: &mut Vec<Command>) {
        for command in commands.drain(..) {
            self.dispatch(&command);
        }
    }

    pub fn release_all(&mut self) {
        for voice in Voice::ALL {
            self.backend.release_all(voice);
        }
    }

    pub fn apply_mix(&mut self, mix: &MixLevels) {
        debug!(?mix, "applying mix levels");
        self.backend.set_param(Param::Volume(Voice::Bass), mix.bass_volume_db());
        self.backend.set_param(Param::Distortion, mix.distortion_amount());
        self.backend.set_param(Param::BassDistortion, mix.bass_distortion_amount());
        self.backend.set_param(Param::ReverbWet, mix.reverb_wet);
        self.backend.set_param(Param::DelayWet, mix.delay_wet);
    }

    pub fn configure(&mut self, patches: &[(Voice, Patch)], rack: &EffectRack) {
        for (voice, patch) in patches {
            self.backend.configure_voice(*voice, patch);
        }
        self.backend.configure_rack(rack);
    }

    pub fn triggered(&self) -> u64 {
        self.triggered
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Backend that only logs. Used by the CLI where no audio engine is attached.
#[derive(Debug, Default)]
pub struct TracingBackend {
    counts: [u64; 6],
}

impl TracingBackend {
    pub fn new() -> Self {
        TracingBackend::default()
    }

    pub fn count(&self, voice: Voice) -> u64 {
        self.counts[voice.index()]
    }
}

impl SynthBackend for TracingBackend {
    fn trigger_attack_release(&mut self, voice: Voice, note: Option<Note>, duration: NoteLength, time: f64, velocity: f32) {
        self.counts[voice.index()] += 1;
        match note {
            Some(note) => trace!(
                voice = voice.name(),
                %note,
                hz = note.frequency(),
                %duration,
                time,
                velocity,
                "trigger"
            ),
            None => trace!(voice = voice.name(), %duration, time, velocity, "trigger"),
        }
    }

    fn set_param(&mut self, param: Param, value: f32) {
        debug!(?param, value, "set param");
    }

    fn release_all(&mut self, voice: Voice) {
        trace!(voice = voice.name(), "release all");
    }

    fn configure_voice(&mut self, voice: Voice, patch: &Patch) {
        debug!(voice = voice.name(), waveform = ?patch.waveform, "voice configured");
    }

    fn configure_rack(&mut self, rack: &EffectRack) {
        debug!(?rack, "effect rack configured");
    }
}
