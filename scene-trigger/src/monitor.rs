/// Sampling loop
///
/// Each iteration waits for one frame, then runs loudness → rolling log →
/// trigger engine → actuator strictly in order. The cancellation token is
/// checked only while waiting for audio, so a started iteration always
/// completes. The audio source is closed on every way out of `run`.

use crate::actuator::SceneActuator;
use crate::audio::{AudioError, AudioSample, AudioSource};
use crate::loudness::compute_rms;
use crate::playback::play_wav;
use crate::rolling_log::RollingLogger;
use crate::trigger::{Step, TriggerEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames_processed: u64,
    pub fires: u64,
    pub summaries: u64,
}

pub struct Monitor {
    engine: TriggerEngine,
    logger: RollingLogger,
    actuator: Arc<dyn SceneActuator>,
    frame_size: usize,
    cue_wav: Option<PathBuf>,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(
        engine: TriggerEngine,
        logger: RollingLogger,
        actuator: Arc<dyn SceneActuator>,
        frame_size: usize,
    ) -> Self {
        Self {
            engine,
            logger,
            actuator,
            frame_size,
            cue_wav: None,
            stats: MonitorStats::default(),
        }
    }

    /// Play `path` after every fire
    pub fn with_cue(mut self, path: Option<PathBuf>) -> Self {
        self.cue_wav = path;
        self
    }

    /// Sample until cancelled or the source fails, then close the source.
    pub async fn run<S: AudioSource>(
        &mut self,
        mut source: S,
        cancel: CancellationToken,
    ) -> Result<MonitorStats, AudioError> {
        info!(
            "Monitoring with {} policy (threshold {}, cooldown {} frames)",
            self.engine.policy(),
            self.engine.config().threshold,
            self.engine.config().cooldown
        );

        let result = self.sample_loop(&mut source, &cancel).await;
        source.close();

        match &result {
            Ok(stats) => info!(
                "Monitor stopped: {} frames, {} fires",
                stats.frames_processed, stats.fires
            ),
            Err(e) => warn!("Monitor aborted: {}", e),
        }
        result
    }

    async fn sample_loop<S: AudioSource>(
        &mut self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<MonitorStats, AudioError> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stop requested, shutting down");
                    return Ok(self.stats.clone());
                }
                frame = source.read(self.frame_size) => frame?,
            };

            self.process_frame(&frame).await;
        }
    }

    /// One iteration, once its frame has arrived
    pub async fn process_frame(&mut self, frame: &[AudioSample]) -> Step {
        let loudness = compute_rms(frame);
        trace!("loudness={:.1}", loudness);

        if let Some(line) = self.logger.record(loudness) {
            println!("{}", line);
            self.stats.summaries += 1;
        }

        let step = self.engine.step(loudness);
        self.stats.frames_processed += 1;

        if step.ready {
            info!("READY");
        }

        if step.is_fire() {
            self.stats.fires += 1;
            info!(
                "Triggered: loudness {:.1} ({} policy), executing scene",
                loudness,
                self.engine.policy()
            );
            self.actuator.invoke().await;
            self.play_cue();
        }

        step
    }

    fn play_cue(&self) {
        let Some(path) = self.cue_wav.clone() else {
            return;
        };

        tokio::task::spawn_blocking(move || {
            if let Err(e) = play_wav(&path) {
                warn!("Skipping cue playback: {}", e);
            }
        });
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn engine(&self) -> &TriggerEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::MockSceneActuator;
    use crate::rolling_log::LogConfig;
    use crate::trigger::{FireDecision, TriggerConfig, TriggerPolicy};
    use tempfile::TempDir;

    fn monitor(
        policy: TriggerPolicy,
        trigger: TriggerConfig,
        actuator: MockSceneActuator,
    ) -> (Monitor, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = LogConfig {
            path: dir.path().join("output.csv"),
            window: trigger.window_size,
        };
        let engine = TriggerEngine::new(trigger, policy).unwrap();
        let monitor = Monitor::new(engine, RollingLogger::new(&log), Arc::new(actuator), 4);
        (monitor, dir)
    }

    #[tokio::test]
    async fn test_loud_frames_invoke_actuator() {
        let mut actuator = MockSceneActuator::new();
        actuator.expect_invoke().times(2).returning(|| ());

        let trigger = TriggerConfig {
            threshold: 100.0,
            cooldown: 2,
            window_size: 10,
            streak_required: 1,
        };
        let (mut monitor, _dir) = monitor(TriggerPolicy::Single, trigger, actuator);

        let loud = [500i16, -500, 500, -500];
        let quiet = [10i16, -10, 10, -10];

        assert_eq!(monitor.process_frame(&quiet).await.decision, FireDecision::NoOp);
        let step = monitor.process_frame(&loud).await;
        assert!(step.ready && step.is_fire());
        assert!(!monitor.process_frame(&loud).await.is_fire());
        assert!(monitor.process_frame(&loud).await.is_fire());

        assert_eq!(monitor.stats().frames_processed, 4);
        assert_eq!(monitor.stats().fires, 2);
    }

    #[tokio::test]
    async fn test_quiet_frames_never_invoke() {
        let mut actuator = MockSceneActuator::new();
        actuator.expect_invoke().never();

        let trigger = TriggerConfig {
            threshold: 100.0,
            cooldown: 0,
            window_size: 5,
            streak_required: 2,
        };
        let (mut monitor, _dir) = monitor(TriggerPolicy::Term, trigger, actuator);

        for _ in 0..50 {
            monitor.process_frame(&[0, 0, 0, 0]).await;
        }
        // Empty frames read as silence
        monitor.process_frame(&[]).await;

        assert_eq!(monitor.stats().fires, 0);
        assert_eq!(monitor.stats().frames_processed, 51);
    }

    #[tokio::test]
    async fn test_summaries_follow_window() {
        let mut actuator = MockSceneActuator::new();
        actuator.expect_invoke().returning(|| ());

        let trigger = TriggerConfig {
            threshold: 1000.0,
            cooldown: 0,
            window_size: 3,
            streak_required: 1,
        };
        let (mut monitor, dir) = monitor(TriggerPolicy::Term, trigger, actuator);

        for _ in 0..7 {
            monitor.process_frame(&[200, -200, 200, -200]).await;
        }
        assert_eq!(monitor.stats().summaries, 2);

        let contents = std::fs::read_to_string(dir.path().join("output.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.ends_with(",200,200")));
    }

    #[tokio::test]
    async fn test_missing_cue_is_not_fatal() {
        let mut actuator = MockSceneActuator::new();
        actuator.expect_invoke().times(1).returning(|| ());

        let trigger = TriggerConfig {
            threshold: 100.0,
            cooldown: 0,
            window_size: 10,
            streak_required: 1,
        };
        let (monitor, dir) = monitor(TriggerPolicy::Single, trigger, actuator);
        let mut monitor = monitor.with_cue(Some(dir.path().join("missing.wav")));

        assert!(monitor.process_frame(&[900; 4]).await.is_fire());
        assert_eq!(monitor.stats().fires, 1);
    }
}
