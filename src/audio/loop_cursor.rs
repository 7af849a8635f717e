//! Gapless loop cursor shared by both playback backends.
//!
//! The cursor walks an in-memory clip and is pulled by the output stage
//! (ALSA writer thread or cpal callback). Shortly before the current pass
//! ends it re-arms the next pass, so the first frame of pass N+1 is written
//! right behind the last frame of pass N.

use std::sync::Arc;
use std::time::Duration;

use super::decode::PcmClip;
use super::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Playing,
    /// Next pass queued; the current one is about to finish.
    Rearmed,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    AboutToFinish { pass: u64 },
    /// A new pass started at frame 0.
    Wrapped { pass: u64 },
}

pub struct LoopCursor {
    clip: Arc<PcmClip>,
    /// Sample offset into the clip
    pos: usize,
    rearm_samples: usize,
    state: LoopState,
    pass: u64,
}

impl LoopCursor {
    pub fn new(clip: Arc<PcmClip>, rearm: Duration) -> Self {
        let rearm_frames = (clip.sample_rate as f64 * rearm.as_secs_f64()).round() as usize;
        let rearm_samples = rearm_frames * clip.channels as usize;
        Self {
            clip,
            pos: 0,
            rearm_samples,
            state: LoopState::Idle,
            pass: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of completed passes.
    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn start(&mut self) -> Result<(), PlaybackError> {
        self.transition(LoopState::Playing)
    }

    /// Request a stop. The output stage keeps pulling silence until it is torn down.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        self.transition(LoopState::Stopping)
    }

    pub fn finish(&mut self) -> Result<(), PlaybackError> {
        self.transition(LoopState::Terminated)
    }

    fn transition(&mut self, to: LoopState) -> Result<(), PlaybackError> {
        use LoopState::*;
        let allowed = matches!(
            (self.state, to),
            (Idle, Playing)
                | (Playing, Rearmed)
                | (Rearmed, Playing)
                | (Idle | Playing | Rearmed, Stopping)
                | (Stopping, Terminated)
        );
        if !allowed {
            return Err(PlaybackError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        log::debug!("Loop state: {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Fill `out` with interleaved samples, reporting loop boundaries through `on_event`.
    ///
    /// Outside `Playing`/`Rearmed` the buffer is filled with silence.
    pub fn fill(&mut self, out: &mut [f32], mut on_event: impl FnMut(LoopEvent)) {
        let len = self.clip.samples.len();
        for slot in out.iter_mut() {
            if !matches!(self.state, LoopState::Playing | LoopState::Rearmed) {
                *slot = 0.0;
                continue;
            }
            if self.state == LoopState::Playing && len - self.pos <= self.rearm_samples {
                self.state = LoopState::Rearmed;
                on_event(LoopEvent::AboutToFinish { pass: self.pass });
            }
            if self.pos == len {
                // 已经预先排好下一轮，直接从头继续
                self.pos = 0;
                self.pass += 1;
                self.state = LoopState::Playing;
                on_event(LoopEvent::Wrapped { pass: self.pass });
                if len <= self.rearm_samples {
                    self.state = LoopState::Rearmed;
                    on_event(LoopEvent::AboutToFinish { pass: self.pass });
                }
            }
            *slot = self.clip.samples[self.pos];
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_clip(frames: usize) -> Arc<PcmClip> {
        // 1 kHz mono so one frame == one millisecond
        let samples = (1..=frames).map(|i| i as f32 / 1000.0).collect();
        Arc::new(PcmClip::new(1000, 1, samples).unwrap())
    }

    #[test]
    fn silence_before_start() {
        let mut cursor = LoopCursor::new(ramp_clip(10), Duration::from_millis(2));
        let mut out = [1.0f32; 4];
        cursor.fill(&mut out, |_| panic!("no events while idle"));
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn wraps_without_gap() {
        let mut cursor = LoopCursor::new(ramp_clip(4), Duration::from_millis(1));
        cursor.start().unwrap();

        let mut out = [0.0f32; 10];
        let mut events = Vec::new();
        cursor.fill(&mut out, |e| events.push(e));

        let expected: Vec<f32> = [1, 2, 3, 4, 1, 2, 3, 4, 1, 2]
            .iter()
            .map(|&i| i as f32 / 1000.0)
            .collect();
        assert_eq!(out.to_vec(), expected);
        assert!(!out.contains(&0.0));
        assert_eq!(cursor.pass(), 2);
        assert_eq!(
            events,
            vec![
                LoopEvent::AboutToFinish { pass: 0 },
                LoopEvent::Wrapped { pass: 1 },
                LoopEvent::AboutToFinish { pass: 1 },
                LoopEvent::Wrapped { pass: 2 },
            ]
        );
    }

    #[test]
    fn rearms_before_end_of_pass() {
        let mut cursor = LoopCursor::new(ramp_clip(10), Duration::from_millis(3));
        cursor.start().unwrap();

        let mut out = [0.0f32; 8];
        let mut events = Vec::new();
        cursor.fill(&mut out, |e| events.push(e));
        assert_eq!(events, vec![LoopEvent::AboutToFinish { pass: 0 }]);
        assert_eq!(cursor.state(), LoopState::Rearmed);
        assert_eq!(cursor.pass(), 0);
    }

    #[test]
    fn clip_shorter_than_threshold_still_loops() {
        let mut cursor = LoopCursor::new(ramp_clip(2), Duration::from_millis(50));
        cursor.start().unwrap();
        let mut out = [0.0f32; 6];
        cursor.fill(&mut out, |_| {});
        assert_eq!(cursor.pass(), 2);
        assert_eq!(cursor.state(), LoopState::Rearmed);
        assert!(!out.contains(&0.0));
    }

    #[test]
    fn stop_silences_output() {
        let mut cursor = LoopCursor::new(ramp_clip(10), Duration::from_millis(1));
        cursor.start().unwrap();
        cursor.stop().unwrap();
        let mut out = [1.0f32; 3];
        cursor.fill(&mut out, |_| {});
        assert_eq!(out, [0.0; 3]);
        cursor.finish().unwrap();
        assert_eq!(cursor.state(), LoopState::Terminated);
    }

    #[test]
    fn terminated_is_final() {
        let mut cursor = LoopCursor::new(ramp_clip(10), Duration::ZERO);
        assert!(cursor.finish().is_err());
        cursor.stop().unwrap();
        cursor.finish().unwrap();
        assert!(cursor.start().is_err());
        assert!(cursor.stop().is_err());
    }

    #[test]
    fn zero_threshold_rearms_on_last_sample() {
        let mut cursor = LoopCursor::new(ramp_clip(3), Duration::ZERO);
        cursor.start().unwrap();
        let mut events = Vec::new();
        let mut out = [0.0f32; 4];
        cursor.fill(&mut out, |e| events.push(e));
        assert_eq!(
            events,
            vec![
                LoopEvent::AboutToFinish { pass: 0 },
                LoopEvent::Wrapped { pass: 1 },
            ]
        );
    }
}
