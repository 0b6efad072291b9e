//! Liveness gate
//!
//! The matcher never sees raw captures. A probe has to pass through
//! [`LivenessGate::admit`], the only constructor of [`AdmittedProbe`].
//!
//! A capture is live when, within the window that starts at its first signal
//! sample, the subject either blinks (an eye-aspect-ratio sample below the
//! blink threshold and one at or above it) or turns their head (a yaw at or past
//! the left bound and one at or past the right bound), and the lighting
//! score is inside the accepted range.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One timed measurement from the capture client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedSample {
    /// Milliseconds since the capture started
    pub at_ms: u64,
    pub value: f32,
}

/// Liveness signals reported alongside a capture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSignals {
    #[serde(default)]
    pub eye_aspect_ratios: Vec<TimedSample>,
    #[serde(default)]
    pub yaw_degrees: Vec<TimedSample>,
    /// Mean frame brightness in [0, 1]
    pub brightness: f32,
}

/// Raw descriptor with its optional yaw estimate
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSample {
    pub embedding: Vec<f32>,
    pub yaw: Option<f32>,
}

/// Descriptors and signals of one capture, before the gate has seen them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceCapture {
    pub samples: Vec<ProbeSample>,
    pub signals: Option<CaptureSignals>,
}

impl FaceCapture {
    /// Capture of descriptors without yaw estimates
    pub fn from_embeddings(embeddings: Vec<Vec<f32>>, signals: Option<CaptureSignals>) -> Self {
        Self {
            samples: embeddings
                .into_iter()
                .map(|embedding| ProbeSample {
                    embedding,
                    yaw: None,
                })
                .collect(),
            signals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessCue {
    Blink,
    HeadTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LivenessVerdict {
    Passed { cue: LivenessCue },
    NotEvaluated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    pub enforced: bool,
    /// Eye aspect ratio below which the eyes count as closed
    pub blink_threshold: f32,
    /// Yaw (degrees) at or below which the head counts as turned left
    pub yaw_left_bound: f32,
    /// Yaw (degrees) at or above which the head counts as turned right
    pub yaw_right_bound: f32,
    pub window_ms: u64,
    pub min_brightness: f32,
    pub max_brightness: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enforced: true,
            blink_threshold: 0.21,
            yaw_left_bound: -15.0,
            yaw_right_bound: 15.0,
            window_ms: 8_000,
            min_brightness: 0.25,
            max_brightness: 0.90,
        }
    }
}

impl LivenessConfig {
    /// Admit every probe without evaluating signals
    pub fn disabled() -> Self {
        Self {
            enforced: false,
            ..Self::default()
        }
    }
}

/// A probe that passed the liveness gate
#[derive(Debug, Clone)]
pub struct AdmittedProbe {
    samples: Vec<ProbeSample>,
    verdict: LivenessVerdict,
}

impl AdmittedProbe {
    pub fn samples(&self) -> &[ProbeSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn verdict(&self) -> LivenessVerdict {
        self.verdict
    }
}

pub struct LivenessGate {
    config: LivenessConfig,
}

impl LivenessGate {
    pub fn new(config: LivenessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// Evaluate `signals` and wrap `samples` into an admitted probe
    pub fn admit(
        &self,
        signals: Option<&CaptureSignals>,
        samples: Vec<ProbeSample>,
    ) -> Result<AdmittedProbe> {
        if samples.is_empty() {
            return Err(Error::invalid_input("At least one face descriptor is required"));
        }

        if !self.config.enforced {
            return Ok(AdmittedProbe {
                samples,
                verdict: LivenessVerdict::NotEvaluated,
            });
        }

        let signals =
            signals.ok_or_else(|| Error::forbidden("Liveness signals are required"))?;
        let cue = self.evaluate(signals)?;

        tracing::debug!(cue = ?cue, samples = samples.len(), "Liveness check passed");

        Ok(AdmittedProbe {
            samples,
            verdict: LivenessVerdict::Passed { cue },
        })
    }

    fn evaluate(&self, signals: &CaptureSignals) -> Result<LivenessCue> {
        let config = &self.config;

        if !signals.brightness.is_finite()
            || signals.brightness < config.min_brightness
            || signals.brightness > config.max_brightness
        {
            tracing::info!(brightness = signals.brightness, "Liveness rejected: lighting");
            return Err(Error::forbidden(
                "Lighting is too dark or too bright for a liveness check",
            ));
        }

        let start = signals
            .eye_aspect_ratios
            .iter()
            .chain(signals.yaw_degrees.iter())
            .map(|sample| sample.at_ms)
            .min()
            .ok_or_else(|| Error::forbidden("No liveness signal was captured"))?;
        let deadline = start.saturating_add(config.window_ms);
        let in_window = |sample: &&TimedSample| sample.at_ms <= deadline && sample.value.is_finite();

        let ears: Vec<f32> = signals
            .eye_aspect_ratios
            .iter()
            .filter(in_window)
            .map(|s| s.value)
            .collect();
        let blinked = ears.iter().any(|ear| *ear < config.blink_threshold)
            && ears.iter().any(|ear| *ear >= config.blink_threshold);
        if blinked {
            return Ok(LivenessCue::Blink);
        }

        let yaws: Vec<f32> = signals
            .yaw_degrees
            .iter()
            .filter(in_window)
            .map(|s| s.value)
            .collect();
        let turned = yaws.iter().any(|yaw| *yaw <= config.yaw_left_bound)
            && yaws.iter().any(|yaw| *yaw >= config.yaw_right_bound);
        if turned {
            return Ok(LivenessCue::HeadTurn);
        }

        tracing::info!(
            ear_samples = ears.len(),
            yaw_samples = yaws.len(),
            "Liveness rejected: no blink or head turn"
        );
        Err(Error::forbidden(
            "Liveness check failed: blink or turn your head and try again",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<ProbeSample> {
        vec![ProbeSample {
            embedding: vec![0.5; 4],
            yaw: None,
        }]
    }

    fn timed(values: &[(u64, f32)]) -> Vec<TimedSample> {
        values
            .iter()
            .map(|(at_ms, value)| TimedSample {
                at_ms: *at_ms,
                value: *value,
            })
            .collect()
    }

    fn gate() -> LivenessGate {
        LivenessGate::new(LivenessConfig::default())
    }

    #[test]
    fn test_blink_passes() {
        let signals = CaptureSignals {
            eye_aspect_ratios: timed(&[(0, 0.31), (400, 0.12), (700, 0.30)]),
            yaw_degrees: Vec::new(),
            brightness: 0.6,
        };

        let probe = gate().admit(Some(&signals), samples()).unwrap();
        assert_eq!(
            probe.verdict(),
            LivenessVerdict::Passed {
                cue: LivenessCue::Blink
            }
        );
        assert_eq!(probe.len(), 1);
    }

    #[test]
    fn test_head_turn_passes() {
        let signals = CaptureSignals {
            eye_aspect_ratios: timed(&[(0, 0.3), (500, 0.3)]),
            yaw_degrees: timed(&[(100, -18.0), (2_000, 2.0), (3_500, 21.0)]),
            brightness: 0.5,
        };

        let probe = gate().admit(Some(&signals), samples()).unwrap();
        assert_eq!(
            probe.verdict(),
            LivenessVerdict::Passed {
                cue: LivenessCue::HeadTurn
            }
        );
    }

    #[test]
    fn test_cue_outside_window_fails() {
        let signals = CaptureSignals {
            eye_aspect_ratios: timed(&[(0, 0.3), (9_000, 0.1)]),
            yaw_degrees: Vec::new(),
            brightness: 0.5,
        };

        assert!(matches!(
            gate().admit(Some(&signals), samples()),
            Err(Error::Forbidden { .. })
        ));
    }

    #[test]
    fn test_lighting_bounds() {
        let mut signals = CaptureSignals {
            eye_aspect_ratios: timed(&[(0, 0.3), (300, 0.1)]),
            yaw_degrees: Vec::new(),
            brightness: 0.1,
        };
        assert!(gate().admit(Some(&signals), samples()).is_err());

        signals.brightness = 0.95;
        assert!(gate().admit(Some(&signals), samples()).is_err());

        signals.brightness = 0.25;
        assert!(gate().admit(Some(&signals), samples()).is_ok());
    }

    #[test]
    fn test_missing_signals_and_samples() {
        assert!(matches!(
            gate().admit(None, samples()),
            Err(Error::Forbidden { .. })
        ));
        assert!(matches!(
            gate().admit(Some(&CaptureSignals::default()), Vec::new()),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_disabled_gate_admits_without_signals() {
        let gate = LivenessGate::new(LivenessConfig::disabled());
        let probe = gate.admit(None, samples()).unwrap();
        assert_eq!(probe.verdict(), LivenessVerdict::NotEvaluated);
    }
}
