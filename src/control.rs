//! The debounced stop/start state machine and the frame-sequential loop that feeds it.

use std::time::Instant;
use crate::actuator::Actuator;
use crate::annotate::Annotator;
use crate::common::{Detection, Frame};
use crate::data::{DetectorFailurePolicy, LogFailurePolicy, TimeCalc};
use crate::detectors::Detector;
use crate::error::MonitorError;
use crate::event_log::{EventKind, EventLogEntry, EventRecorder};
use crate::frame_io::{FrameSink, FrameSource};
use crate::hazard::{HazardAssessment, HazardPolicy};
use crate::utils;

pub const RESTART_DETAILS: &str = "No hazard detected.";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    #[default] Running,
    Stopped,
}

impl MachineState {
    pub fn banner(&self) -> &'static str {
        match self {
            MachineState::Running => "Machine Status: RUNNING",
            MachineState::Stopped => "ALERT: MACHINE STOPPED!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: MachineState,
    pub to: MachineState,
    /// `None` only when the append failed under [`LogFailurePolicy::Degrade`].
    pub entry: Option<EventLogEntry>,
}

/// Owns the machine state. The actuator is called only on an actual
/// Running <-> Stopped change, and every change appends exactly one event.
#[derive(Debug)]
pub struct MachineController<A, R> {
    actuator: A,
    recorder: R,
    state: MachineState,
    log_policy: LogFailurePolicy,
    log_failures: u64,
}

impl<A: Actuator, R: EventRecorder> MachineController<A, R> {
    pub fn new(actuator: A, recorder: R) -> Self {
        let state = if actuator.is_running() { MachineState::Running } else { MachineState::Stopped };
        Self {
            actuator,
            recorder,
            state,
            log_policy: LogFailurePolicy::default(),
            log_failures: 0,
        }
    }

    pub fn with_log_policy(mut self, log_policy: LogFailurePolicy) -> Self {
        self.log_policy = log_policy;
        self
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn log_failures(&self) -> u64 {
        self.log_failures
    }

    pub fn into_parts(self) -> (A, R) {
        (self.actuator, self.recorder)
    }

    pub fn on_assessment(&mut self, assessment: &HazardAssessment) -> Result<Option<Transition>, MonitorError> {
        match (self.state, assessment.is_hazard) {
            (MachineState::Running, true) => {
                self.actuator
                    .stop()
                    .map_err(|source| MonitorError::Actuator { action: "stop", source })?;
                self.state = MachineState::Stopped;

                let details = assessment.details();
                log::warn!("Hazard detected, machine stopped: {}", details);
                self.record(EventKind::HazardDetected, &details, MachineState::Running).map(Some)
            }
            (MachineState::Stopped, false) => {
                self.actuator
                    .start()
                    .map_err(|source| MonitorError::Actuator { action: "start", source })?;
                self.state = MachineState::Running;

                log::info!("No hazard detected, machine restarted");
                self.record(EventKind::MachineRestarted, RESTART_DETAILS, MachineState::Stopped).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn record(&mut self, kind: EventKind, details: &str, from: MachineState) -> Result<Transition, MonitorError> {
        let entry = match self.recorder.append(kind, details) {
            Ok(entry) => Some(entry),
            Err(source) => match self.log_policy {
                LogFailurePolicy::Fatal => {
                    return Err(MonitorError::EventLog { kind: kind.as_str(), source });
                }
                LogFailurePolicy::Degrade => {
                    self.log_failures += 1;
                    log::error!("AUDIT TRAIL INCOMPLETE: could not record '{}' event: {}", kind.as_str(), source);
                    None
                }
            },
        };

        Ok(Transition {
            from,
            to: self.state,
            entry,
        })
    }
}

/// Result of one processed frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub detections: Vec<Detection>,
    pub assessment: HazardAssessment,
    pub transition: Option<Transition>,
    pub state: MachineState,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub hazard_frames: u64,
    pub detector_failures: u64,
    pub stops: u64,
    pub restarts: u64,
    pub log_failures: u64,
    pub final_state: MachineState,
}

/// detect -> classify -> transition -> render, one frame at a time.
pub struct ControlLoop<D, A, R> {
    detector: D,
    policy: HazardPolicy,
    controller: MachineController<A, R>,
    annotator: Option<Annotator>,
    conf_threshold: f32,
    on_detector_error: DetectorFailurePolicy,
    timing: TimeCalc,
    summary: LoopSummary,
}

impl<D: Detector, A: Actuator, R: EventRecorder> ControlLoop<D, A, R> {
    pub fn new(detector: D, policy: HazardPolicy, controller: MachineController<A, R>) -> Self {
        let summary = LoopSummary {
            final_state: controller.state(),
            ..Default::default()
        };
        Self {
            detector,
            policy,
            controller,
            annotator: None,
            conf_threshold: 0.3,
            on_detector_error: DetectorFailurePolicy::default(),
            timing: TimeCalc::default(),
            summary,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_conf_threshold(mut self, conf_threshold: f32) -> Self {
        self.conf_threshold = conf_threshold;
        self
    }

    pub fn with_detector_failure_policy(mut self, policy: DetectorFailurePolicy) -> Self {
        self.on_detector_error = policy;
        self
    }

    pub fn controller(&self) -> &MachineController<A, R> {
        &self.controller
    }

    pub fn summary(&self) -> &LoopSummary {
        &self.summary
    }

    pub fn into_controller(self) -> MachineController<A, R> {
        self.controller
    }

    pub fn process_frame(&mut self, frame: &mut Frame) -> Result<FrameOutcome, MonitorError> {
        let started = Instant::now();

        let (detections, assessment) = match self.detector.detect(frame, self.conf_threshold) {
            Ok(detections) => {
                let assessment = self.policy.classify(&detections);
                (detections, assessment)
            }
            Err(err) => {
                self.summary.detector_failures += 1;
                match self.on_detector_error {
                    DetectorFailurePolicy::FailClosed => {
                        log::error!("Detector failed on frame {}, treating frame as hazardous: {:#}", frame.index, err);
                        (Vec::new(), HazardAssessment::hazard(format!("Detector failure: {err}")))
                    }
                    DetectorFailurePolicy::NoDetections => {
                        log::error!("Detector failed on frame {}, treating frame as empty: {:#}", frame.index, err);
                        (Vec::new(), HazardAssessment::clear())
                    }
                }
            }
        };
        self.timing.add("detect", utils::trace("detect", frame.index, started));

        let started = Instant::now();
        // A failed transition still renders the frame with whatever state the relay is in.
        let transition = self.controller.on_assessment(&assessment);
        let state = self.controller.state();
        self.timing.add("control", utils::trace("control", frame.index, started));

        if let Some(annotator) = &self.annotator {
            let started = Instant::now();
            annotator.draw(frame, &detections, &self.policy, state);
            self.timing.add("render", utils::trace("render", frame.index, started));
        }
        self.timing.frame_done();

        self.summary.frames += 1;
        if assessment.is_hazard {
            self.summary.hazard_frames += 1;
        }
        self.summary.final_state = state;
        let transition = transition?;
        if let Some(t) = &transition {
            match t.to {
                MachineState::Stopped => self.summary.stops += 1,
                MachineState::Running => self.summary.restarts += 1,
            }
        }
        self.summary.log_failures = self.controller.log_failures();

        Ok(FrameOutcome {
            detections,
            assessment,
            transition,
            state,
        })
    }

    /// Runs until the source ends, a read fails, `max_frames` is reached or a sink asks to stop.
    ///
    /// A fatal frame error still writes that frame and finishes every sink before it is returned.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sinks: &mut [Box<dyn FrameSink>],
        max_frames: Option<u64>,
    ) -> Result<LoopSummary, MonitorError> {
        log::info!("Monitoring {}", source.describe());

        let mut failure: Option<MonitorError> = None;

        'frames: loop {
            if max_frames.is_some_and(|max| self.summary.frames >= max) {
                log::info!("Reached frame limit");
                break;
            }

            let mut frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("End of stream");
                    break;
                }
                Err(err) => {
                    log::warn!("Frame read failed, treating as end of stream: {:#}", err);
                    break;
                }
            };

            if let Err(err) = self.process_frame(&mut frame) {
                log::error!("Stopping monitor on frame {}: {}", frame.index, err);
                failure = Some(err);
            }

            let started = Instant::now();
            for sink in sinks.iter_mut() {
                if let Err(e) = sink.write(&frame) {
                    failure.get_or_insert(MonitorError::Sink(format!("{e:#}")));
                    break 'frames;
                }
                if sink.wants_stop() {
                    log::info!("Output requested stop");
                    break 'frames;
                }
            }
            self.timing.add("persist", utils::trace("persist", frame.index, started));

            if failure.is_some() {
                break;
            }
        }

        for sink in sinks.iter_mut() {
            if let Err(e) = sink.finish() {
                log::error!("Failed to finish output: {:#}", e);
                failure.get_or_insert(MonitorError::Sink(format!("{e:#}")));
            }
        }

        let s = &self.summary;
        log::info!(
            "Processed {} frames ({} hazardous): {} stops, {} restarts, {} detector failures, final state {:?}",
            s.frames, s.hazard_frames, s.stops, s.restarts, s.detector_failures, s.final_state
        );
        if s.log_failures > 0 {
            log::error!("{} events could not be recorded", s.log_failures);
        }
        log::info!("Average stage times: {}", self.timing.summary());

        match failure {
            Some(err) => Err(err),
            None => Ok(self.summary.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BBox;
    use crate::error::{ActuatorError, EventLogError};
    use chrono::Local;

    #[derive(Debug, Default)]
    struct FakeActuator {
        running: bool,
        starts: u32,
        stops: u32,
        fail_stop: bool,
    }

    impl FakeActuator {
        fn running() -> Self {
            Self { running: true, ..Default::default() }
        }
    }

    impl Actuator for FakeActuator {
        fn start(&mut self) -> Result<(), ActuatorError> {
            self.starts += 1;
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), ActuatorError> {
            if self.fail_stop {
                return Err(ActuatorError::Unavailable("relay offline".into()));
            }
            self.stops += 1;
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    #[derive(Debug, Default)]
    struct MemoryLog {
        entries: Vec<EventLogEntry>,
        fail: bool,
    }

    impl EventRecorder for MemoryLog {
        fn append(&mut self, kind: EventKind, details: &str) -> Result<EventLogEntry, EventLogError> {
            if self.fail {
                return Err(EventLogError::Io {
                    path: "memory".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            let entry = EventLogEntry {
                timestamp: Local::now().naive_local(),
                event_kind: kind,
                details: details.to_string(),
            };
            self.entries.push(entry.clone());
            Ok(entry)
        }
    }

    fn controller() -> MachineController<FakeActuator, MemoryLog> {
        MachineController::new(FakeActuator::running(), MemoryLog::default())
    }

    fn person() -> HazardAssessment {
        HazardPolicy::default().classify(&[Detection::new(0, "person", BBox::new(0., 0., 5., 5.), 0.8)])
    }

    fn kinds(c: &MachineController<FakeActuator, MemoryLog>) -> Vec<EventKind> {
        c.recorder().entries.iter().map(|e| e.event_kind).collect()
    }

    #[test]
    fn hazard_while_running_stops_once() {
        let mut c = controller();
        let t = c.on_assessment(&person()).unwrap().unwrap();
        assert_eq!((t.from, t.to), (MachineState::Running, MachineState::Stopped));
        assert_eq!(t.entry.unwrap().details, "Human detected in hazard zone!");
        assert!(c.on_assessment(&person()).unwrap().is_none());
        assert_eq!(c.actuator().stops, 1);
        assert_eq!(kinds(&c), vec![EventKind::HazardDetected]);
        assert_eq!(c.state(), MachineState::Stopped);
    }

    #[test]
    fn clear_while_stopped_restarts_once() {
        let mut c = controller();
        c.on_assessment(&person()).unwrap();
        let t = c.on_assessment(&HazardAssessment::clear()).unwrap().unwrap();
        assert_eq!(t.to, MachineState::Running);
        assert_eq!(t.entry.unwrap().details, RESTART_DETAILS);
        assert!(c.on_assessment(&HazardAssessment::clear()).unwrap().is_none());
        assert_eq!(c.actuator().starts, 1);
        assert_eq!(kinds(&c), vec![EventKind::HazardDetected, EventKind::MachineRestarted]);
    }

    #[test]
    fn clear_while_running_does_nothing() {
        let mut c = controller();
        assert!(c.on_assessment(&HazardAssessment::clear()).unwrap().is_none());
        assert_eq!(c.actuator().starts + c.actuator().stops, 0);
        assert!(c.recorder().entries.is_empty());
    }

    #[test]
    fn initial_state_follows_actuator() {
        let c = MachineController::new(FakeActuator::default(), MemoryLog::default());
        assert_eq!(c.state(), MachineState::Stopped);
    }

    #[test]
    fn actuator_failure_is_fatal_and_keeps_state() {
        let mut c = MachineController::new(
            FakeActuator { running: true, fail_stop: true, ..Default::default() },
            MemoryLog::default(),
        );
        let err = c.on_assessment(&person()).unwrap_err();
        assert!(matches!(err, MonitorError::Actuator { action: "stop", .. }));
        assert_eq!(c.state(), MachineState::Running);
        assert!(c.recorder().entries.is_empty());
    }

    #[test]
    fn log_failure_is_fatal_by_default() {
        let mut c = MachineController::new(FakeActuator::running(), MemoryLog { fail: true, ..Default::default() });
        let err = c.on_assessment(&person()).unwrap_err();
        assert!(matches!(err, MonitorError::EventLog { kind: "Hazard Detected", .. }));
        // the relay already opened; state must say so
        assert_eq!(c.state(), MachineState::Stopped);
    }

    #[test]
    fn log_failure_can_degrade() {
        let mut c = MachineController::new(FakeActuator::running(), MemoryLog { fail: true, ..Default::default() })
            .with_log_policy(LogFailurePolicy::Degrade);
        let t = c.on_assessment(&person()).unwrap().unwrap();
        assert!(t.entry.is_none());
        assert_eq!(c.log_failures(), 1);
        assert_eq!(c.state(), MachineState::Stopped);
    }

    #[test]
    fn banner_reflects_state() {
        assert_eq!(MachineState::Stopped.banner(), "ALERT: MACHINE STOPPED!");
        assert_eq!(MachineState::Running.banner(), "Machine Status: RUNNING");
    }
}
