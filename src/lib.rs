//  _
// | |_ _ __ __ _ _ __   ___ ___  __ _  ___ _ __
// | __| '__/ _` | '_ \ / __/ _ \/ _` |/ _ \ '_ \
// | |_| | | (_| | | | | (_|  __/ (_| |  __/ | | |
//  \__|_|  \__,_|_| |_|\___\___|\__, |\___|_| |_|
//                               |___/

pub mod error;
pub mod note;
pub mod config;
pub mod scale;
pub mod bank;
pub mod pattern;
pub mod instrument;
pub mod voice;
pub mod song;
pub mod transport;
pub mod store;
pub mod sequencer;

pub use error::TranceError;
pub use note::{Note, NoteLength, PitchClass, parse_note};
pub use config::{ControlSurface, GenerationConfig, MixLevels};
pub use scale::{GeneratedScale, ScaleKind, generate_scale};
pub use bank::{ScaleBank, SharedBank};
pub use pattern::{Pattern, PatternStep, Section, SectionKind, generate_pattern};
pub use instrument::{EffectRack, Envelope, Patch, WaveformType};
pub use voice::{Command, Dispatcher, Param, SynthBackend, TracingBackend, Voice, VoiceCommand};
pub use song::{SongPlan, Zone, build_song, SONG_STEPS};
pub use transport::{ManualTransport, ScheduleId, StepTick, Transport};
pub use store::{FileKv, JsonPatternStore, KeyValueStore, MemoryKv, PatternStore};
pub use sequencer::{PlaybackState, Sequencer, StepHandle};
