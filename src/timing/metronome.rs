use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, warn};

use super::Clock;
use crate::config::ClickConfig;
use crate::events::{EngineEvent, Tick};
use crate::midi::{MidiMessage, MidiSink};

/// Lateness beyond which a tick is reported as drift.
const DRIFT_WARNING: f64 = 0.010;

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Beat clock for the call phase. Ticks are posted to the engine's event
/// channel and, when an output is attached, sounded as short clicks.
pub struct Metronome {
    qpm: f64,
    clock: Clock,
    click: ClickConfig,
    output: Option<Arc<dyn MidiSink>>,
    events: Sender<EngineEvent>,
    running: Option<Running>,
}

impl Metronome {
    pub fn new(
        qpm: f64,
        clock: Clock,
        click: ClickConfig,
        output: Option<Arc<dyn MidiSink>>,
        events: Sender<EngineEvent>,
    ) -> Self {
        Self {
            qpm,
            clock,
            click,
            output,
            events,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts ticking with beat 0 at `epoch`. Restarts if already running.
    pub fn start(&mut self, epoch: f64, cycle: u64) {
        self.stop();

        let (stop_tx, stop_rx) = bounded(0);
        let beat = TickLoop {
            period: 60.0 / self.qpm,
            epoch,
            cycle,
            clock: self.clock,
            click: self.click.clone(),
            output: if self.click.enabled {
                self.output.clone()
            } else {
                None
            },
            events: self.events.clone(),
            stop_rx,
        };
        let handle = std::thread::spawn(move || beat.run());
        debug!(epoch, cycle, qpm = self.qpm, "metronome started");
        self.running = Some(Running { stop_tx, handle });
    }

    /// Cancels all future ticks. A tick already posted stays posted.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            drop(running.stop_tx);
            if running.handle.join().is_err() {
                warn!("metronome thread panicked");
            }
            debug!("metronome stopped");
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TickLoop {
    period: f64,
    epoch: f64,
    cycle: u64,
    clock: Clock,
    click: ClickConfig,
    output: Option<Arc<dyn MidiSink>>,
    events: Sender<EngineEvent>,
    stop_rx: Receiver<()>,
}

impl TickLoop {
    fn run(self) {
        for beat_index in 0u64.. {
            let scheduled_time = self.epoch + beat_index as f64 * self.period;
            if !self.wait_until(scheduled_time) {
                return;
            }

            let tick = Tick {
                cycle: self.cycle,
                beat_index,
                scheduled_time,
                delivered_time: self.clock.now(),
            };
            if tick.lateness() > DRIFT_WARNING {
                warn!(
                    beat_index,
                    lateness_ms = tick.lateness() * 1000.0,
                    "metronome tick late"
                );
            }

            let clicking = self.click_on(&tick);
            if self.events.send(EngineEvent::Tick(tick)).is_err() {
                self.click_off(clicking);
                return;
            }
            if let Some(pitch) = clicking {
                let click_end = scheduled_time + self.click.duration.min(self.period / 2.0);
                let keep_going = self.wait_until(click_end);
                self.click_off(Some(pitch));
                if !keep_going {
                    return;
                }
            }
        }
    }

    /// Sleeps until `time`; false when stopped first.
    fn wait_until(&self, time: f64) -> bool {
        matches!(
            self.stop_rx.recv_deadline(self.clock.instant_at(time)),
            Err(RecvTimeoutError::Timeout)
        )
    }

    fn click_on(&self, tick: &Tick) -> Option<u8> {
        let output = self.output.as_ref()?;
        let velocity = if tick.is_downbeat() {
            self.click.accent_velocity
        } else {
            self.click.velocity
        };
        let message = MidiMessage::NoteOn {
            pitch: self.click.pitch,
            velocity,
            time: tick.scheduled_time,
        };
        match output.send(self.click.channel, &message) {
            Ok(()) => Some(self.click.pitch),
            Err(e) => {
                warn!(error = %e, "failed to send metronome click");
                None
            }
        }
    }

    fn click_off(&self, pitch: Option<u8>) {
        let (Some(output), Some(pitch)) = (self.output.as_ref(), pitch) else {
            return;
        };
        let message = MidiMessage::NoteOff {
            pitch,
            time: self.clock.now(),
        };
        if let Err(e) = output.send(self.click.channel, &message) {
            warn!(error = %e, "failed to send metronome click note-off");
        }
    }
}
