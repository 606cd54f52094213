use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, info};
use crate::bank::{ScaleBank, SharedBank};
use crate::config::{ControlSurface, DEFAULT_BPM};
use crate::error::TranceError;
use crate::instrument::{EffectRack, Patch};
use crate::note::NoteLength;
use crate::pattern::Pattern;
use crate::song::{build_song, SongPlan, SONG_STEPS};
use crate::store::PatternStore;
use crate::transport::{ScheduleId, StepTick, Transport};
use crate::voice::{Command, Dispatcher, SynthBackend, Voice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Song,
    /// Looping a stored pattern, by store index.
    Pattern(usize),
}

enum Program {
    Song(SongPlan),
    Pattern(Pattern),
}

struct PlaybackContext {
    program: Program,
    state: PlaybackState,
    rng: fastrand::Rng,
    // reused every tick
    scratch: Vec<Command>,
}

struct Shared<B: SynthBackend> {
    dispatcher: Dispatcher<B>,
    playback: Option<PlaybackContext>,
    /// Bumped whenever playback is installed or torn down. A handle only
    /// fires while its generation is current.
    generation: u64,
}

impl<B: SynthBackend> Shared<B> {
    fn teardown(&mut self) {
        self.generation += 1;
        if self.playback.take().is_some() {
            self.dispatcher.release_all();
        }
    }
}

/// The callback side of a registration. Once the playback it was created for
/// is gone, firing it does nothing.
pub struct StepHandle<B: SynthBackend> {
    shared: Arc<Mutex<Shared<B>>>,
    generation: u64,
}

impl<B: SynthBackend> Clone for StepHandle<B> {
    fn clone(&self) -> Self {
        StepHandle { shared: Arc::clone(&self.shared), generation: self.generation }
    }
}

impl<B: SynthBackend> StepHandle<B> {
    /// Plays one step. Returns false when the handle is stale.
    pub fn fire(&self, tick: StepTick) -> bool {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;
        if shared.generation != self.generation {
            return false;
        }
        let Some(ctx) = shared.playback.as_mut() else {
            return false;
        };

        match &ctx.program {
            Program::Song(plan) => plan.step(tick.index, tick.time, &mut ctx.rng, &mut ctx.scratch),
            Program::Pattern(pattern) => {
                if let Some(step) = pattern.lead_at(tick.index) {
                    ctx.scratch.push(Command::trigger(
                        Voice::Lead,
                        Some(step.note),
                        NoteLength::Sixteenth,
                        tick.time,
                        1.0,
                    ));
                }
            }
        }
        shared.dispatcher.dispatch_all(&mut ctx.scratch);
        true
    }
}

/// Owns the voices, the scale bank and the pattern store, and keeps at most
/// one program registered with the transport.
pub struct Sequencer<B: SynthBackend + 'static, T: Transport, S: PatternStore> {
    shared: Arc<Mutex<Shared<B>>>,
    transport: T,
    store: S,
    bank: SharedBank,
    controls: ControlSurface,
    rng: fastrand::Rng,
    registration: Option<ScheduleId>,
}

impl<B: SynthBackend + 'static, T: Transport, S: PatternStore> Sequencer<B, T, S> {
    /// Patches every voice, sets up the effect rack, applies the mix and
    /// generates the first scale bank.
    pub fn new(backend: B, mut transport: T, store: S, controls: ControlSurface, mut rng: fastrand::Rng) -> Self {
        let controls = controls.normalized();

        let mut dispatcher = Dispatcher::new(backend);
        let patches: Vec<(Voice, Patch)> = Voice::ALL
            .into_iter()
            .map(|voice| (voice, Patch::for_voice(voice, &mut rng)))
            .collect();
        let rack = EffectRack::randomized(&mut rng);
        dispatcher.configure(&patches, &rack);
        dispatcher.apply_mix(&controls.mix_levels());

        let bank = SharedBank::new(ScaleBank::generate(&controls.generation_config(), &mut rng));
        transport.set_bpm(controls.bpm as f32);

        Sequencer {
            shared: Arc::new(Mutex::new(Shared { dispatcher, playback: None, generation: 0 })),
            transport,
            store,
            bank,
            controls,
            rng,
            registration: None,
        }
    }

    /// Builds a fresh song from the current bank and starts looping it.
    ///
    /// Anything already playing is torn down first. If the transport refuses
    /// to start, nothing is built, persisted or registered.
    pub fn new_song(&mut self) -> Result<(), TranceError> {
        self.dispose();
        self.transport.set_bpm(self.controls.bpm as f32);
        self.transport.start()?;

        let bank = self.bank.load();
        let density = self.controls.generation_config().note_density;
        let plan = build_song(self.controls.bpm as f32, &bank, density, &mut self.store, &mut self.rng);
        self.install(Program::Song(plan), PlaybackState::Song, SONG_STEPS);
        Ok(())
    }

    /// Loops stored pattern `index` on the lead voice alone.
    pub fn play_pattern(&mut self, index: usize) -> Result<(), TranceError> {
        let pattern = self
            .store
            .get(index)
            .cloned()
            .ok_or(TranceError::PatternIndex { index, len: self.store.len() })?;

        self.dispose();
        self.transport.set_bpm(self.controls.bpm as f32);
        self.transport.start()?;

        let steps = pattern.len();
        self.install(Program::Pattern(pattern), PlaybackState::Pattern(index), steps);
        Ok(())
    }

    /// Halts playback and silences every voice. Tempo is kept.
    pub fn stop(&mut self) {
        self.dispose();
        self.transport.stop();
        info!("playback stopped");
    }

    /// Like `stop`, but also drops every transport registration and puts the
    /// tempo back to its default.
    pub fn clear(&mut self) {
        self.dispose();
        self.transport.stop();
        self.transport.cancel();
        self.controls.bpm = DEFAULT_BPM;
        self.transport.set_bpm(DEFAULT_BPM as f32);
        info!("playback cleared");
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        self.controls = ControlSurface { bpm, ..self.controls.clone() }.normalized();
        self.transport.set_bpm(self.controls.bpm as f32);
        debug!(bpm = self.controls.bpm, "tempo changed");
    }

    /// Applies new control values. The scale bank is regenerated only when a
    /// scale-shaping control changed. Returns whether it was.
    pub fn update_controls(&mut self, surface: ControlSurface) -> bool {
        let surface = surface.normalized();
        let config = surface.generation_config();

        let regenerate = self.bank.load().config().scale_inputs_differ(&config);
        if regenerate {
            let old = self.bank.swap(ScaleBank::generate(&config, &mut self.rng));
            debug!(previous_notes = old.config().num_notes, notes = config.num_notes, "scale bank swapped");
        }

        self.shared.lock().dispatcher.apply_mix(&surface.mix_levels());
        if surface.bpm != self.controls.bpm {
            self.transport.set_bpm(surface.bpm as f32);
        }
        self.controls = surface;
        regenerate
    }

    /// Forces a new bank from the current controls.
    pub fn regenerate_bank(&mut self) {
        let config = self.controls.generation_config();
        self.bank.swap(ScaleBank::generate(&config, &mut self.rng));
    }

    pub fn state(&self) -> PlaybackState {
        self.shared
            .lock()
            .playback
            .as_ref()
            .map_or(PlaybackState::Stopped, |ctx| ctx.state)
    }

    /// Handle for the current registration, if anything is playing.
    pub fn step_handle(&self) -> Option<StepHandle<B>> {
        let shared = self.shared.lock();
        if shared.playback.is_none() {
            return None;
        }
        Some(StepHandle { shared: Arc::clone(&self.shared), generation: shared.generation })
    }

    /// Total voice triggers sent to the backend so far.
    pub fn triggered(&self) -> u64 {
        self.shared.lock().dispatcher.triggered()
    }

    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(self.shared.lock().dispatcher.backend())
    }

    pub fn controls(&self) -> &ControlSurface {
        &self.controls
    }

    pub fn bank(&self) -> &SharedBank {
        &self.bank
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn install(&mut self, program: Program, state: PlaybackState, steps: usize) {
        let handle = {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.playback = Some(PlaybackContext {
                program,
                state,
                rng: fastrand::Rng::with_seed(self.rng.u64(..)),
                scratch: Vec::with_capacity(16),
            });
            StepHandle { shared: Arc::clone(&self.shared), generation: shared.generation }
        };

        let callback = Box::new(move |tick: StepTick| {
            handle.fire(tick);
        });
        let id = self.transport.schedule_repeating(callback, NoteLength::Sixteenth, steps);
        self.registration = Some(id);
        info!(?state, steps, bpm = self.transport.bpm(), "playback started");
    }

    /// Unregisters the active callback, invalidates outstanding handles and
    /// releases every voice that was sounding.
    fn dispose(&mut self) {
        if let Some(id) = self.registration.take() {
            self.transport.unschedule(id);
        }
        self.shared.lock().teardown();
    }
}

impl<B: SynthBackend + 'static, T: Transport, S: PatternStore> Drop for Sequencer<B, T, S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
