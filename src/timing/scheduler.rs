use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, warn};

use super::{Clock, NoteSequence};
use crate::error::SchedulerError;
use crate::events::{EngineEvent, PlaybackAction, ScheduledEvent};
use crate::midi::{MidiMessage, MidiSink};

/// Absolute send times for every note of `sequence` played from
/// `anchor_time`, followed by a completion marker at the sequence end.
pub fn schedule_sequence_events(
    sequence: &NoteSequence,
    anchor_time: f64,
    cycle: u64,
) -> Vec<ScheduledEvent> {
    let mut events: Vec<ScheduledEvent> = Vec::with_capacity(sequence.notes.len() * 2 + 1);

    for note in &sequence.notes {
        let on_time = anchor_time + note.start_time;
        let off_time = anchor_time + note.end_time;
        events.push(ScheduledEvent {
            time: on_time,
            action: PlaybackAction::Send(MidiMessage::NoteOn {
                pitch: note.pitch,
                velocity: note.velocity,
                time: on_time,
            }),
        });
        events.push(ScheduledEvent {
            time: off_time,
            action: PlaybackAction::Send(MidiMessage::NoteOff {
                pitch: note.pitch,
                time: off_time,
            }),
        });
    }

    events.push(ScheduledEvent {
        time: anchor_time + sequence.total_time.max(sequence.last_end_time()),
        action: PlaybackAction::Finish { cycle },
    });

    sort_events(&mut events);
    events
}

fn sort_events(events: &mut [ScheduledEvent]) {
    events.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.order_key().cmp(&b.order_key())));
}

enum Command {
    Schedule(Vec<ScheduledEvent>),
    Cancel(Sender<usize>),
    Shutdown,
}

/// Plays sequences on a dedicated timing thread so callers never block on
/// note timing.
pub struct PlaybackScheduler {
    commands: Sender<Command>,
    underruns: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackScheduler {
    pub fn spawn(
        output: Arc<dyn MidiSink>,
        channel: u8,
        clock: Clock,
        underrun_tolerance: f64,
        events: Sender<EngineEvent>,
    ) -> Self {
        let (commands, command_rx) = unbounded();
        let underruns = Arc::new(AtomicU64::new(0));
        let playback = PlaybackLoop {
            output,
            channel,
            clock,
            underrun_tolerance,
            events,
            commands: command_rx,
            pending: VecDeque::new(),
            sounding: BTreeSet::new(),
            underruns: underruns.clone(),
        };
        let handle = std::thread::spawn(move || playback.run());
        Self {
            commands,
            underruns,
            handle: Some(handle),
        }
    }

    pub fn schedule(
        &self,
        sequence: &NoteSequence,
        anchor_time: f64,
        cycle: u64,
    ) -> Result<(), SchedulerError> {
        let events = schedule_sequence_events(sequence, anchor_time, cycle);
        debug!(
            notes = sequence.len(),
            anchor_time, cycle, "scheduling playback"
        );
        self.commands
            .send(Command::Schedule(events))
            .map_err(|_| SchedulerError::Disconnected)
    }

    /// Drops every pending send and releases sounding notes. Returns once the
    /// timing thread has done so, with the number of notes released.
    pub fn cancel(&self) -> Result<usize, SchedulerError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.commands
            .send(Command::Cancel(ack_tx))
            .map_err(|_| SchedulerError::Disconnected)?;
        ack_rx.recv().map_err(|_| SchedulerError::Disconnected)
    }

    /// Sends that fell further behind the clock than the tolerance.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn underrun_counter(&self) -> Arc<AtomicU64> {
        self.underruns.clone()
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("playback thread panicked");
            }
        }
    }
}

struct PlaybackLoop {
    output: Arc<dyn MidiSink>,
    channel: u8,
    clock: Clock,
    underrun_tolerance: f64,
    events: Sender<EngineEvent>,
    commands: Receiver<Command>,
    pending: VecDeque<ScheduledEvent>,
    sounding: BTreeSet<u8>,
    underruns: Arc<AtomicU64>,
}

impl PlaybackLoop {
    fn run(mut self) {
        loop {
            let command = match self.pending.front() {
                Some(next) => match self.commands.recv_deadline(self.clock.instant_at(next.time)) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => Some(Command::Shutdown),
                },
                None => Some(self.commands.recv().unwrap_or(Command::Shutdown)),
            };

            match command {
                None => self.dispatch_due(),
                Some(Command::Schedule(events)) => {
                    self.pending.extend(events);
                    sort_events(self.pending.make_contiguous());
                }
                Some(Command::Cancel(ack)) => {
                    self.pending.clear();
                    let released = self.release_all();
                    let _ = ack.send(released);
                }
                Some(Command::Shutdown) => {
                    self.pending.clear();
                    self.release_all();
                    return;
                }
            }
        }
    }

    fn dispatch_due(&mut self) {
        let now = self.clock.now();
        while self.pending.front().is_some_and(|e| e.time <= now) {
            let Some(event) = self.pending.pop_front() else {
                break;
            };

            match event.action {
                PlaybackAction::Send(message) => {
                    let lateness = now - event.time;
                    if lateness > self.underrun_tolerance {
                        self.underruns.fetch_add(1, Ordering::Relaxed);
                        warn!(lateness_ms = lateness * 1000.0, "playback underrun");
                    }
                    self.send(&message);
                }
                PlaybackAction::Finish { cycle } => {
                    let _ = self.events.send(EngineEvent::PlaybackFinished {
                        cycle,
                        scheduled_time: event.time,
                    });
                }
            }
        }
    }

    fn send(&mut self, message: &MidiMessage) {
        if let Err(e) = self.output.send(self.channel, message) {
            warn!(error = %e, "failed to send playback message");
            return;
        }
        match *message {
            MidiMessage::NoteOn { pitch, .. } => {
                self.sounding.insert(pitch);
            }
            MidiMessage::NoteOff { pitch, .. } => {
                self.sounding.remove(&pitch);
            }
            MidiMessage::ControlChange { .. } => {}
        }
    }

    fn release_all(&mut self) -> usize {
        let now = self.clock.now();
        let sounding = std::mem::take(&mut self.sounding);
        for &pitch in &sounding {
            let off = MidiMessage::NoteOff { pitch, time: now };
            if let Err(e) = self.output.send(self.channel, &off) {
                warn!(pitch, error = %e, "failed to release note");
            }
        }
        if !sounding.is_empty() {
            debug!(released = sounding.len(), "released sounding notes");
        }
        sounding.len()
    }
}
