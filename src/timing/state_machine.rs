use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{BEATS_PER_BAR, CaptureBuffer, NoteSequence};
use crate::config::{InteractionConfig, OffCallInput, PhraseBoundary};
use crate::error::ConfigError;
use crate::events::{EngineEvent, Tick};
use crate::generator::{ArgValue, GeneratorOptions, GeneratorSelector};
use crate::midi::{MidiMessage, MidiSignal};

/// Tick lateness worth a log line.
const DRIFT_TOLERANCE: f64 = 0.010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    WaitForCallSignal,
    Call,
    Generating,
    ResponsePlayback,
}

/// The single mutable record of an interaction run.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    /// Incremented on every call so late events from an earlier cycle can be
    /// told apart.
    pub cycle: u64,
    pub phrase_start_time: f64,
    pub selected_generator: usize,
    pub temperature: f64,
    pub buffer: CaptureBuffer,
}

/// Read-only view published to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub cycle: u64,
    pub phrase_start_time: f64,
    pub selected_generator: usize,
    pub temperature: f64,
    pub captured_notes: usize,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub cycle: u64,
    pub generator_index: usize,
    pub primer: NoteSequence,
    pub options: GeneratorOptions,
}

/// Side effects the engine carries out on behalf of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartMetronome { epoch: f64, cycle: u64 },
    StopMetronome,
    Generate(GenerationRequest),
    SchedulePlayback {
        sequence: NoteSequence,
        anchor_time: f64,
        cycle: u64,
    },
    CancelPlayback,
}

#[derive(Debug, Clone, Copy)]
struct PendingResponse {
    generate_start: f64,
    generate_end: f64,
    anchor_time: f64,
}

/// WAIT → CALL → GENERATING → RESPONSE → WAIT, one event at a time.
///
/// Every event goes through [`handle`](Self::handle), which returns the
/// effects to perform; the machine never blocks and holds no locks.
pub struct CallAndResponse {
    config: InteractionConfig,
    boundary: PhraseBoundary,
    selector: GeneratorSelector,
    session: SessionState,
    held: HeapRb<MidiMessage>,
    pending: Option<PendingResponse>,
    stopped: bool,
}

impl CallAndResponse {
    pub fn new(config: &InteractionConfig, generator_count: usize) -> Result<Self, ConfigError> {
        let boundary = config.validate()?;
        let selector = GeneratorSelector::new(generator_count, config.generator_select_control)?;
        Ok(Self {
            boundary,
            selector,
            session: SessionState {
                phase: Phase::WaitForCallSignal,
                cycle: 0,
                phrase_start_time: 0.0,
                selected_generator: 0,
                temperature: config.temperature,
                buffer: CaptureBuffer::new(config.qpm),
            },
            held: HeapRb::new(config.held_input_capacity.max(1)),
            pending: None,
            stopped: false,
            config: config.clone(),
        })
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.session.phase,
            cycle: self.session.cycle,
            phrase_start_time: self.session.phrase_start_time,
            selected_generator: self.session.selected_generator,
            temperature: self.session.temperature,
            captured_notes: self.session.buffer.len(),
            running: !self.stopped,
        }
    }

    pub fn start(&mut self, now: f64) -> Vec<Effect> {
        info!(
            boundary = ?self.boundary,
            qpm = self.config.qpm,
            generators = self.selector.len(),
            "interaction started"
        );
        self.enter_wait(now)
    }

    pub fn handle(&mut self, event: EngineEvent, now: f64) -> Vec<Effect> {
        if self.stopped {
            return Vec::new();
        }
        match event {
            EngineEvent::Midi(message) => self.on_midi(message),
            EngineEvent::Tick(tick) => self.on_tick(tick),
            EngineEvent::Generated { cycle, result } => self.on_generated(cycle, result, now),
            EngineEvent::PlaybackFinished {
                cycle,
                scheduled_time,
            } => self.on_playback_finished(cycle, scheduled_time),
            EngineEvent::Stop => self.stop(),
        }
    }

    /// Valid from any phase. Later events are ignored.
    pub fn stop(&mut self) -> Vec<Effect> {
        if self.stopped {
            return Vec::new();
        }
        info!(phase = ?self.session.phase, cycle = self.session.cycle, "interaction stopping");
        self.stopped = true;
        self.pending = None;
        self.session.buffer.clear();
        vec![Effect::CancelPlayback, Effect::StopMetronome]
    }

    fn on_midi(&mut self, message: MidiMessage) -> Vec<Effect> {
        if self.update_parameters(&message) {
            return Vec::new();
        }

        match self.session.phase {
            Phase::WaitForCallSignal => {
                if self.matches(self.config.start_call_signal, &message) {
                    debug!(time = message.time(), "start call signal");
                    return self.enter_call(message.time());
                }
                self.off_call_input(message);
                Vec::new()
            }
            Phase::Call => {
                if let PhraseBoundary::SignalTriggered { end, .. } = self.boundary {
                    if end.matches(&message) {
                        let capture_end = message.time();
                        return self.end_call(capture_end, self.bars_until_bar_line(capture_end));
                    }
                }
                if self.matches(self.config.start_call_signal, &message) {
                    return Vec::new();
                }
                self.session.buffer.record(&message);
                Vec::new()
            }
            Phase::Generating | Phase::ResponsePlayback => {
                self.off_call_input(message);
                Vec::new()
            }
        }
    }

    /// Temperature and generator selection apply in every phase.
    fn update_parameters(&mut self, message: &MidiMessage) -> bool {
        let MidiMessage::ControlChange { number, value, .. } = *message else {
            return false;
        };
        if Some(number) == self.config.temperature_control {
            self.session.temperature = self.config.temperature_for(value);
            debug!(temperature = self.session.temperature, "temperature changed");
            return true;
        }
        if Some(number) == self.selector.control() {
            let selected = self.selector.select(value);
            if selected != self.session.selected_generator {
                info!(generator = selected, "generator selected");
            }
            self.session.selected_generator = selected;
            return true;
        }
        false
    }

    fn matches(&self, signal: Option<MidiSignal>, message: &MidiMessage) -> bool {
        signal.is_some_and(|signal| signal.matches(message))
    }

    fn off_call_input(&mut self, message: MidiMessage) {
        if !message.is_note() {
            return;
        }
        match self.config.off_call_input {
            OffCallInput::Discard => {
                debug!(phase = ?self.session.phase, "discarding input outside call")
            }
            OffCallInput::Buffer => {
                if self.held.push_overwrite(message).is_some() {
                    debug!("held input full, dropped oldest message");
                }
            }
        }
    }

    fn on_tick(&mut self, tick: Tick) -> Vec<Effect> {
        if tick.lateness() > DRIFT_TOLERANCE {
            debug!(
                beat = tick.beat_index,
                bar = tick.bar_index(),
                lateness_ms = tick.lateness() * 1000.0,
                "metronome drift"
            );
        }
        if self.session.phase != Phase::Call || tick.cycle != self.session.cycle {
            return Vec::new();
        }
        let PhraseBoundary::FixedBars(bars) = self.boundary else {
            return Vec::new();
        };
        if tick.beat_index >= u64::from(bars) * u64::from(BEATS_PER_BAR) {
            return self.end_call(tick.scheduled_time, bars);
        }
        Vec::new()
    }

    fn on_generated(
        &mut self,
        cycle: u64,
        result: Result<NoteSequence, crate::error::GenerationError>,
        now: f64,
    ) -> Vec<Effect> {
        if cycle != self.session.cycle || self.session.phase != Phase::Generating {
            debug!(cycle, "discarding stale generation result");
            return Vec::new();
        }
        let Some(pending) = self.pending.take() else {
            return self.enter_wait(now);
        };

        match result {
            Ok(generated) => {
                let response = generated.subsequence(pending.generate_start, pending.generate_end);
                if now > pending.anchor_time {
                    warn!(
                        late_ms = (now - pending.anchor_time) * 1000.0,
                        "response generated after its start time"
                    );
                }
                info!(
                    cycle,
                    notes = response.len(),
                    anchor_time = pending.anchor_time,
                    "playing response"
                );
                self.session.phase = Phase::ResponsePlayback;
                vec![Effect::SchedulePlayback {
                    sequence: response,
                    anchor_time: pending.anchor_time,
                    cycle,
                }]
            }
            Err(e) => {
                error!(cycle, error = %e, "generation failed, abandoning cycle");
                self.enter_wait(now)
            }
        }
    }

    fn on_playback_finished(&mut self, cycle: u64, scheduled_time: f64) -> Vec<Effect> {
        if cycle != self.session.cycle || self.session.phase != Phase::ResponsePlayback {
            return Vec::new();
        }
        debug!(cycle, "response finished");
        self.enter_wait(scheduled_time)
    }

    fn enter_wait(&mut self, time: f64) -> Vec<Effect> {
        self.session.phase = Phase::WaitForCallSignal;
        self.session.phrase_start_time = time;
        self.session.buffer.reset(time);
        self.pending = None;

        match self.config.start_call_signal {
            Some(signal) => {
                info!(%signal, "waiting for call signal");
                Vec::new()
            }
            None => self.enter_call(time),
        }
    }

    fn enter_call(&mut self, time: f64) -> Vec<Effect> {
        self.session.cycle += 1;
        self.session.phase = Phase::Call;
        self.session.phrase_start_time = time;
        self.session.buffer.reset(time);

        let held = self.held.occupied_len();
        for message in self.held.pop_iter() {
            self.session.buffer.record(&message.at(message.time().max(time)));
        }
        if held > 0 {
            debug!(held, "replayed held input into call");
        }

        info!(cycle = self.session.cycle, start = time, "call started");
        vec![Effect::StartMetronome {
            epoch: time,
            cycle: self.session.cycle,
        }]
    }

    /// Bars from the phrase start to the end of the bar in progress at
    /// `time`, at least one.
    fn bars_until_bar_line(&self, time: f64) -> u32 {
        let elapsed = (time - self.session.phrase_start_time) / self.config.bar_duration();
        (elapsed - 1e-9).ceil().max(1.0) as u32
    }

    /// Call length is whole bars on the tempo grid, never a difference of
    /// clock readings, so quantized primer ends compare exactly against it.
    fn end_call(&mut self, capture_end: f64, bars: u32) -> Vec<Effect> {
        let start = self.session.phrase_start_time;
        let call_duration = f64::from(bars) * self.config.bar_duration();
        let phrase_end = start + call_duration;

        let captured = self.session.buffer.snapshot(capture_end);
        let (quantized, dropped) = captured.quantize_lossy(self.config.steps_per_quarter);
        for e in &dropped {
            warn!(error = %e, "dropping degenerate note from call");
        }
        // Notes held through the bar line are cut at it.
        let primer = quantized
            .subsequence(0.0, call_duration)
            .extract_last_contiguous_phrase(self.config.min_primer_bars);
        debug!(pitches = ?primer.pitch_histogram(), "primer pitches");

        let options = GeneratorOptions::new((call_duration, 2.0 * call_duration))
            .with_input(0.0, call_duration)
            .with_arg("temperature", ArgValue::Float(self.session.temperature));

        self.pending = Some(PendingResponse {
            generate_start: call_duration,
            generate_end: 2.0 * call_duration,
            anchor_time: phrase_end,
        });
        self.session.phase = Phase::Generating;

        info!(
            cycle = self.session.cycle,
            captured = captured.len(),
            primer = primer.len(),
            call_duration,
            generator = self.session.selected_generator,
            "call ended, generating response"
        );

        vec![
            Effect::StopMetronome,
            Effect::Generate(GenerationRequest {
                cycle: self.session.cycle,
                generator_index: self.session.selected_generator,
                primer,
                options,
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::timing::Note;

    const BEAT_90: f64 = 60.0 / 90.0;

    fn fixed_bars(bars: u32) -> InteractionConfig {
        InteractionConfig {
            qpm: 90.0,
            phrase_bars: Some(bars),
            ..Default::default()
        }
    }

    fn signalled() -> InteractionConfig {
        InteractionConfig {
            qpm: 90.0,
            start_call_signal: Some(MidiSignal::control(20, Some(0))),
            end_call_signal: Some(MidiSignal::control(21, Some(0))),
            ..Default::default()
        }
    }

    fn machine(config: &InteractionConfig) -> CallAndResponse {
        CallAndResponse::new(config, 1).unwrap()
    }

    fn midi(message: MidiMessage) -> EngineEvent {
        EngineEvent::Midi(message)
    }

    fn cc(number: u8, value: u8, time: f64) -> EngineEvent {
        midi(MidiMessage::ControlChange {
            number,
            value,
            time,
        })
    }

    fn on(pitch: u8, time: f64) -> EngineEvent {
        midi(MidiMessage::NoteOn {
            pitch,
            velocity: 100,
            time,
        })
    }

    fn off(pitch: u8, time: f64) -> EngineEvent {
        midi(MidiMessage::NoteOff { pitch, time })
    }

    fn tick(cycle: u64, beat_index: u64, epoch: f64) -> EngineEvent {
        let scheduled_time = epoch + beat_index as f64 * BEAT_90;
        EngineEvent::Tick(Tick {
            cycle,
            beat_index,
            scheduled_time,
            delivered_time: scheduled_time + 0.001,
        })
    }

    fn generation_request(effects: &[Effect]) -> GenerationRequest {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Generate(request) => Some(request.clone()),
                _ => None,
            })
            .expect("expected a generation request")
    }

    #[test]
    fn test_starts_calling_without_start_signal() {
        let mut machine = machine(&fixed_bars(2));
        let effects = machine.start(3.0);
        assert_eq!(machine.phase(), Phase::Call);
        assert_eq!(effects, vec![Effect::StartMetronome { epoch: 3.0, cycle: 1 }]);
        assert_eq!(machine.session().phrase_start_time, 3.0);
    }

    #[test]
    fn test_waits_for_start_signal() {
        let mut machine = machine(&signalled());
        assert!(machine.start(0.0).is_empty());
        assert_eq!(machine.phase(), Phase::WaitForCallSignal);

        machine.handle(on(60, 0.5), 0.5);
        machine.handle(cc(20, 1, 0.6), 0.6);
        assert_eq!(machine.phase(), Phase::WaitForCallSignal);

        let effects = machine.handle(cc(20, 0, 1.0), 1.0);
        assert_eq!(machine.phase(), Phase::Call);
        assert_eq!(machine.session().phrase_start_time, 1.0);
        assert!(machine.session().buffer.is_empty());
        assert_eq!(effects, vec![Effect::StartMetronome { epoch: 1.0, cycle: 1 }]);
    }

    #[test]
    fn test_fixed_bars_end_exactly_after_two_bars() {
        let mut machine = machine(&fixed_bars(2));
        machine.start(10.0);
        for beat in 0..8 {
            assert!(machine.handle(tick(1, beat, 10.0), 0.0).is_empty());
            assert_eq!(machine.phase(), Phase::Call);
        }

        let effects = machine.handle(tick(1, 8, 10.0), 0.0);
        assert_eq!(machine.phase(), Phase::Generating);
        assert_eq!(effects[0], Effect::StopMetronome);

        let request = generation_request(&effects);
        let call = 8.0 * BEAT_90;
        assert!((call - 5.333_333).abs() < 1e-5);
        assert!((request.options.generate_time_range.0 - call).abs() < 1e-9);
        assert!((request.options.generate_time_range.1 - 2.0 * call).abs() < 1e-9);
        assert_eq!(request.options.input_time_range, Some((0.0, request.options.generate_time_range.0)));
        assert!(request.primer.is_empty());
        assert_eq!(request.options.temperature(), Some(1.0));
    }

    #[test]
    fn test_ticks_from_other_cycles_are_ignored() {
        let mut machine = machine(&fixed_bars(1));
        machine.start(0.0);
        assert!(machine.handle(tick(7, 4, 0.0), 0.0).is_empty());
        assert_eq!(machine.phase(), Phase::Call);
    }

    #[test]
    fn test_end_signal_ends_call_regardless_of_bars() {
        let mut machine = machine(&signalled());
        machine.start(0.0);
        machine.handle(cc(20, 0, 1.0), 1.0);
        machine.handle(on(60, 1.5), 1.5);
        machine.handle(off(60, 2.0), 2.0);

        let effects = machine.handle(cc(21, 0, 2.3), 2.3);
        assert_eq!(machine.phase(), Phase::Generating);
        let request = generation_request(&effects);
        let bar = 4.0 * BEAT_90;
        // The response starts at the end of the bar in progress.
        assert!((request.options.generate_time_range.0 - bar).abs() < 1e-9);
        assert_eq!(request.primer.len(), 1);
        assert!((request.primer.notes[0].start_time - 0.5).abs() < 0.1);
    }

    #[test]
    fn test_end_signal_on_bar_line_does_not_add_a_bar() {
        let mut machine = machine(&signalled());
        machine.start(0.0);
        machine.handle(cc(20, 0, 0.0), 0.0);
        let bar = 4.0 * BEAT_90;
        let request = generation_request(&machine.handle(cc(21, 0, 2.0 * bar), 2.0 * bar));
        assert!((request.options.generate_time_range.0 - 2.0 * bar).abs() < 1e-9);
    }

    #[test]
    fn test_response_is_scheduled_then_cycle_repeats() {
        let mut machine = machine(&fixed_bars(1));
        machine.start(0.0);
        machine.handle(on(62, 0.01), 0.01);
        machine.handle(off(62, 0.6), 0.6);
        let request = generation_request(&machine.handle(tick(1, 4, 0.0), 2.7));
        let (start, end) = request.options.generate_time_range;
        assert_eq!(request.primer.notes[0].start_time, 0.0);

        let generated = NoteSequence::from_notes(
            90.0,
            vec![
                Note::new(64, 90, start + 0.5, start + 1.0),
                Note::new(65, 90, end + 0.5, end + 1.0),
            ],
        );
        let effects = machine.handle(
            EngineEvent::Generated {
                cycle: 1,
                result: Ok(generated),
            },
            2.8,
        );
        assert_eq!(machine.phase(), Phase::ResponsePlayback);
        match &effects[..] {
            [Effect::SchedulePlayback {
                sequence,
                anchor_time,
                cycle,
            }] => {
                assert_eq!(*cycle, 1);
                assert!((anchor_time - start).abs() < 1e-9);
                assert_eq!(sequence.len(), 1);
                assert!((sequence.notes[0].start_time - 0.5).abs() < 1e-9);
                assert!((sequence.total_time - (end - start)).abs() < 1e-9);
            }
            other => panic!("unexpected effects {other:?}"),
        }

        let effects = machine.handle(
            EngineEvent::PlaybackFinished {
                cycle: 1,
                scheduled_time: end,
            },
            end,
        );
        assert_eq!(machine.phase(), Phase::Call);
        assert_eq!(machine.session().cycle, 2);
        assert_eq!(machine.session().phrase_start_time, end);
        assert_eq!(effects, vec![Effect::StartMetronome { epoch: end, cycle: 2 }]);
    }

    #[test]
    fn test_generation_error_returns_to_wait_with_empty_buffer() {
        let mut machine = machine(&signalled());
        machine.start(0.0);
        machine.handle(cc(20, 0, 0.0), 0.0);
        machine.handle(on(60, 0.2), 0.2);
        machine.handle(cc(21, 0, 1.0), 1.0);
        assert_eq!(machine.phase(), Phase::Generating);

        let effects = machine.handle(
            EngineEvent::Generated {
                cycle: 1,
                result: Err(GenerationError::Script("boom".to_string())),
            },
            1.5,
        );
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), Phase::WaitForCallSignal);
        assert!(machine.session().buffer.is_empty());
    }

    #[test]
    fn test_generation_error_without_start_signal_restarts_call() {
        let mut machine = machine(&fixed_bars(1));
        machine.start(0.0);
        machine.handle(on(60, 0.2), 0.2);
        machine.handle(tick(1, 4, 0.0), 2.7);
        let effects = machine.handle(
            EngineEvent::Generated {
                cycle: 1,
                result: Err(GenerationError::Failed("x".into(), "y".into())),
            },
            3.0,
        );
        assert_eq!(machine.phase(), Phase::Call);
        assert_eq!(machine.session().cycle, 2);
        assert!(machine.session().buffer.is_empty());
        assert_eq!(effects, vec![Effect::StartMetronome { epoch: 3.0, cycle: 2 }]);
    }

    #[test]
    fn test_stale_generation_result_is_discarded() {
        let mut machine = machine(&fixed_bars(1));
        machine.start(0.0);
        let effects = machine.handle(
            EngineEvent::Generated {
                cycle: 0,
                result: Ok(NoteSequence::new(90.0)),
            },
            0.1,
        );
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), Phase::Call);
    }

    #[test]
    fn test_parameters_update_in_any_phase() {
        let config = InteractionConfig {
            temperature_control: Some(74),
            generator_select_control: Some(75),
            ..signalled()
        };
        let mut machine = CallAndResponse::new(&config, 3).unwrap();
        machine.start(0.0);
        machine.handle(cc(74, 127, 0.1), 0.1);
        machine.handle(cc(75, 5, 0.2), 0.2);
        assert!((machine.session().temperature - 2.0).abs() < 1e-9);
        assert_eq!(machine.session().selected_generator, 2);
        assert_eq!(machine.phase(), Phase::WaitForCallSignal);

        machine.handle(cc(20, 0, 1.0), 1.0);
        machine.handle(cc(74, 0, 1.1), 1.1);
        let request = generation_request(&machine.handle(cc(21, 0, 1.5), 1.5));
        assert_eq!(request.generator_index, 2);
        assert!((request.options.temperature().unwrap() - 0.1).abs() < 1e-9);

        machine.handle(cc(75, 3, 1.6), 1.6);
        assert_eq!(machine.session().selected_generator, 0);
        assert_eq!(machine.phase(), Phase::Generating);
    }

    #[test]
    fn test_input_during_generation_discarded_by_default() {
        let mut machine = machine(&fixed_bars(1));
        machine.start(0.0);
        machine.handle(tick(1, 4, 0.0), 2.7);
        machine.handle(on(60, 2.8), 2.8);
        machine.handle(
            EngineEvent::Generated {
                cycle: 1,
                result: Err(GenerationError::EmptyRange(0.0, 0.0)),
            },
            3.0,
        );
        assert_eq!(machine.phase(), Phase::Call);
        assert!(machine.session().buffer.is_empty());
    }

    #[test]
    fn test_input_during_generation_buffered_into_next_call() {
        let config = InteractionConfig {
            off_call_input: OffCallInput::Buffer,
            ..fixed_bars(1)
        };
        let mut machine = machine(&config);
        machine.start(0.0);
        machine.handle(tick(1, 4, 0.0), 2.7);
        machine.handle(on(60, 2.8), 2.8);
        machine.handle(
            EngineEvent::Generated {
                cycle: 1,
                result: Err(GenerationError::EmptyRange(0.0, 0.0)),
            },
            3.0,
        );
        assert_eq!(machine.phase(), Phase::Call);
        let captured = machine.session().buffer.snapshot(3.5);
        assert_eq!(captured.notes, vec![Note::new(60, 100, 0.0, 0.5)]);
    }

    #[test]
    fn test_stop_from_any_phase() {
        let mut machine = machine(&fixed_bars(1));
        machine.start(0.0);
        machine.handle(tick(1, 4, 0.0), 2.7);
        assert_eq!(machine.phase(), Phase::Generating);

        let effects = machine.handle(EngineEvent::Stop, 2.8);
        assert_eq!(effects, vec![Effect::CancelPlayback, Effect::StopMetronome]);
        assert!(machine.is_stopped());
        assert!(!machine.snapshot().running);

        // A result arriving after stop is dropped.
        let effects = machine.handle(
            EngineEvent::Generated {
                cycle: 1,
                result: Ok(NoteSequence::new(90.0)),
            },
            3.0,
        );
        assert!(effects.is_empty());
        assert!(machine.stop().is_empty());
    }

    #[test]
    fn test_note_held_through_bar_line_is_accepted_by_generators() {
        use crate::generator::{EchoGenerator, SequenceGenerator, check_extends_primer};

        let echo = EchoGenerator::new(0);
        for i in 0..2000 {
            let epoch = 1.0 + f64::from(i) * 0.0137;
            let mut machine = machine(&fixed_bars(2));
            machine.start(epoch);
            machine.handle(on(60, epoch + 4.0), epoch + 4.0);
            let request = generation_request(&machine.handle(tick(1, 8, epoch), epoch + 5.4));

            let (start, _) = request.options.generate_time_range;
            assert!(request.primer.last_end_time() <= start, "epoch {epoch}");
            assert_eq!(check_extends_primer(&request.primer, &request.options), Ok(()));
            let response = echo.generate(&request.primer, &request.options).unwrap();
            assert!(!response.is_empty());
        }
    }

    #[test]
    fn test_note_held_through_end_signal_is_cut_at_bar_line() {
        let mut config = signalled();
        config.start_call_signal = None;
        let bar = 4.0 * BEAT_90;
        for i in 0..500 {
            let epoch = 0.3 + f64::from(i) * 0.0291;
            let mut machine = machine(&config);
            machine.start(epoch);
            machine.handle(on(64, epoch + 1.9), epoch + 1.9);
            let end = epoch + bar - 0.01;
            let request = generation_request(&machine.handle(cc(21, 0, end), end));

            assert_eq!(request.options.generate_time_range, (bar, 2.0 * bar));
            assert_eq!(check_extends(&request), Ok(()));
        }
    }

    fn check_extends(request: &GenerationRequest) -> Result<(), GenerationError> {
        crate::generator::check_extends_primer(&request.primer, &request.options)
    }

    #[test]
    fn test_input_while_waiting_follows_off_call_policy() {
        let config = InteractionConfig {
            off_call_input: OffCallInput::Buffer,
            ..signalled()
        };
        let mut machine = machine(&config);
        machine.start(0.0);
        machine.handle(on(67, 0.5), 0.5);
        assert_eq!(machine.phase(), Phase::WaitForCallSignal);

        machine.handle(cc(20, 0, 1.0), 1.0);
        let captured = machine.session().buffer.snapshot(1.5);
        assert_eq!(captured.notes, vec![Note::new(67, 100, 0.0, 0.5)]);
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        assert!(matches!(
            CallAndResponse::new(&InteractionConfig::default(), 1),
            Err(ConfigError::AmbiguousBoundary)
        ));
        assert!(matches!(
            CallAndResponse::new(&fixed_bars(2), 2),
            Err(ConfigError::MissingGeneratorSelect(2))
        ));
    }
}
