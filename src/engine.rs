use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, never, unbounded};
use tracing::{debug, error, info, warn};

use crate::config::InteractionConfig;
use crate::error::{EngineError, GenerationError};
use crate::events::EngineEvent;
use crate::generator::SequenceGenerator;
use crate::midi::{MidiInPort, MidiIo, MidiMessage};
use crate::timing::{
    CallAndResponse, Clock, Effect, GenerationRequest, Metronome, PlaybackScheduler,
    SessionSnapshot,
};

/// A running call-and-response session.
///
/// One engine thread owns the state machine and consumes MIDI input together
/// with ticks, generation results and playback completions. Generation runs
/// on its own worker so a slow model never delays input handling.
pub struct Engine {
    events: Sender<EngineEvent>,
    status: Arc<ArcSwap<SessionSnapshot>>,
    underruns: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    /// Held so the input connection lives exactly as long as the session.
    input_port: Option<MidiInPort>,
}

impl Engine {
    pub fn start(
        config: InteractionConfig,
        generators: Vec<Arc<dyn SequenceGenerator>>,
        io: MidiIo,
    ) -> Result<Self, EngineError> {
        let machine = CallAndResponse::new(&config, generators.len())?;
        let MidiIo {
            clock,
            messages,
            output,
            input_port,
        } = io;

        let (event_tx, event_rx) = unbounded();
        let (request_tx, request_rx) = unbounded();
        let status = Arc::new(ArcSwap::from_pointee(machine.snapshot()));

        let scheduler = PlaybackScheduler::spawn(
            output.clone(),
            config.output_channel,
            clock,
            config.underrun_tolerance_ms / 1000.0,
            event_tx.clone(),
        );
        let underruns = scheduler.underrun_counter();
        let metronome = Metronome::new(
            config.qpm,
            clock,
            config.metronome.clone(),
            Some(output),
            event_tx.clone(),
        );

        let worker_events = event_tx.clone();
        std::thread::Builder::new()
            .name("antiphon-generator".to_string())
            .spawn(move || generator_thread(generators, request_rx, worker_events))
            .map_err(|e| EngineError::Spawn("generator", e.to_string()))?;

        let state = EngineState {
            machine,
            metronome,
            scheduler,
            requests: request_tx,
            events: event_tx.clone(),
            status: status.clone(),
            clock,
        };
        let handle = std::thread::Builder::new()
            .name("antiphon-engine".to_string())
            .spawn(move || engine_thread(state, messages, event_rx))
            .map_err(|e| EngineError::Spawn("engine", e.to_string()))?;

        Ok(Self {
            events: event_tx,
            status,
            underruns,
            handle: Some(handle),
            input_port,
        })
    }

    /// Latest published session state.
    pub fn status(&self) -> Arc<SessionSnapshot> {
        self.status.load_full()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels playback, silences sounding notes, stops the metronome and
    /// closes the input port. Returns once the engine thread has exited.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.events.send(EngineEvent::Stop);
        if handle.join().is_err() {
            error!("engine thread panicked");
        }
        if let Some(port) = self.input_port.take() {
            info!(port = port.name(), "closing MIDI input");
        }
        info!("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct EngineState {
    machine: CallAndResponse,
    metronome: Metronome,
    scheduler: PlaybackScheduler,
    requests: Sender<GenerationRequest>,
    events: Sender<EngineEvent>,
    status: Arc<ArcSwap<SessionSnapshot>>,
    clock: Clock,
}

impl EngineState {
    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartMetronome { epoch, cycle } => self.metronome.start(epoch, cycle),
                Effect::StopMetronome => self.metronome.stop(),
                Effect::Generate(request) => {
                    let cycle = request.cycle;
                    if self.requests.send(request).is_err() {
                        error!(cycle, "generator worker is gone");
                        let _ = self.events.send(EngineEvent::Generated {
                            cycle,
                            result: Err(GenerationError::Failed(
                                "worker".to_string(),
                                "generator thread exited".to_string(),
                            )),
                        });
                    }
                }
                Effect::SchedulePlayback {
                    sequence,
                    anchor_time,
                    cycle,
                } => {
                    if let Err(e) = self.scheduler.schedule(&sequence, anchor_time, cycle) {
                        error!(cycle, error = %e, "failed to schedule response");
                        let _ = self.events.send(EngineEvent::PlaybackFinished {
                            cycle,
                            scheduled_time: self.clock.now(),
                        });
                    }
                }
                Effect::CancelPlayback => match self.scheduler.cancel() {
                    Ok(released) => debug!(released, "playback cancelled"),
                    Err(e) => warn!(error = %e, "failed to cancel playback"),
                },
            }
        }
    }

    fn publish(&self) {
        self.status.store(Arc::new(self.machine.snapshot()));
    }
}

enum Closed {
    Input,
    Events,
}

fn engine_thread(
    mut state: EngineState,
    mut midi_rx: Receiver<MidiMessage>,
    event_rx: Receiver<EngineEvent>,
) {
    let effects = state.machine.start(state.clock.now());
    state.apply(effects);
    state.publish();

    loop {
        let received = crossbeam::select! {
            recv(midi_rx) -> message => message.map(EngineEvent::Midi).map_err(|_| Closed::Input),
            recv(event_rx) -> event => event.map_err(|_| Closed::Events),
        };
        let event = match received {
            Ok(event) => event,
            Err(Closed::Input) => {
                warn!("MIDI input closed");
                midi_rx = never();
                continue;
            }
            Err(Closed::Events) => break,
        };

        let effects = state.machine.handle(event, state.clock.now());
        state.apply(effects);
        state.publish();

        if state.machine.is_stopped() {
            break;
        }
    }

    let underruns = state.scheduler.underruns();
    if underruns > 0 {
        warn!(underruns, "playback fell behind during session");
    }
}

fn generator_thread(
    generators: Vec<Arc<dyn SequenceGenerator>>,
    requests: Receiver<GenerationRequest>,
    events: Sender<EngineEvent>,
) {
    for request in requests.iter() {
        let Some(generator) = generators
            .get(request.generator_index)
            .or_else(|| generators.last())
        else {
            break;
        };

        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            generator.generate(&request.primer, &request.options)
        }))
        .unwrap_or_else(|_| {
            Err(GenerationError::Failed(
                generator.id().to_string(),
                "generator panicked".to_string(),
            ))
        });
        debug!(
            generator = generator.id(),
            cycle = request.cycle,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "generation finished"
        );

        if events
            .send(EngineEvent::Generated {
                cycle: request.cycle,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}
