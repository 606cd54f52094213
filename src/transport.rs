use tracing::debug;
use crate::error::TranceError;
use crate::note::NoteLength;

/// One tick handed to a repeating callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTick {
    /// Position within the registration, wraps at its step count.
    pub index: usize,
    /// Transport time in seconds.
    pub time: f64,
}

pub type StepCallback = Box<dyn FnMut(StepTick) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId(u64);

/// The clock that drives playback forward.
pub trait Transport {
    /// Registers `callback` to run once per `step`, cycling through
    /// `0..steps`.
    fn schedule_repeating(&mut self, callback: StepCallback, step: NoteLength, steps: usize) -> ScheduleId;

    /// Drops one registration. Returns false if it was already gone.
    fn unschedule(&mut self, id: ScheduleId) -> bool;

    fn start(&mut self) -> Result<(), TranceError>;

    /// Halts and rewinds. Registrations survive.
    fn stop(&mut self);

    /// Drops every registration.
    fn cancel(&mut self);

    fn bpm(&self) -> f32;

    fn set_bpm(&mut self, bpm: f32);

    fn is_running(&self) -> bool;
}

struct Scheduled {
    id: ScheduleId,
    callback: StepCallback,
    step: NoteLength,
    steps: usize,
    tick: usize,
    next_time: f64,
}

/// A transport with no clock of its own: the owner calls `advance` once per
/// step, from a timer, a loop or a test.
pub struct ManualTransport {
    bpm: f32,
    running: bool,
    locked: bool,
    next_id: u64,
    scheduled: Vec<Scheduled>,
}

impl ManualTransport {
    pub fn new(bpm: f32) -> Self {
        ManualTransport {
            bpm,
            running: false,
            locked: false,
            next_id: 0,
            scheduled: Vec::new(),
        }
    }

    /// A transport whose `start` fails until `unlock` is called, like an audio
    /// context that is waiting for a user gesture.
    pub fn locked(bpm: f32) -> Self {
        ManualTransport { locked: true, ..ManualTransport::new(bpm) }
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Fires every registration once. Returns how many callbacks ran.
    pub fn advance(&mut self) -> usize {
        if !self.running {
            return 0;
        }
        let bpm = self.bpm;
        for entry in self.scheduled.iter_mut() {
            let index = entry.tick % entry.steps;
            (entry.callback)(StepTick { index, time: entry.next_time });
            entry.tick += 1;
            entry.next_time += entry.step.seconds(bpm);
        }
        self.scheduled.len()
    }

    /// Wall-clock length of one step of the first registration.
    pub fn step_duration(&self) -> Option<std::time::Duration> {
        self.scheduled
            .first()
            .map(|entry| std::time::Duration::from_secs_f64(entry.step.seconds(self.bpm)))
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }
}

impl Transport for ManualTransport {
    fn schedule_repeating(&mut self, callback: StepCallback, step: NoteLength, steps: usize) -> ScheduleId {
        let id = ScheduleId(self.next_id);
        self.next_id += 1;
        self.scheduled.push(Scheduled {
            id,
            callback,
            step,
            steps: steps.max(1),
            tick: 0,
            next_time: 0.0,
        });
        id
    }

    fn unschedule(&mut self, id: ScheduleId) -> bool {
        let before = self.scheduled.len();
        self.scheduled.retain(|entry| entry.id != id);
        before != self.scheduled.len()
    }

    fn start(&mut self) -> Result<(), TranceError> {
        if self.locked {
            return Err(TranceError::Transport("audio context not permitted to start".to_string()));
        }
        self.running = true;
        debug!(bpm = self.bpm, "transport started");
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        for entry in self.scheduled.iter_mut() {
            entry.tick = 0;
            entry.next_time = 0.0;
        }
        debug!("transport stopped");
    }

    fn cancel(&mut self) {
        self.scheduled.clear();
    }

    fn bpm(&self) -> f32 {
        self.bpm
    }

    fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
