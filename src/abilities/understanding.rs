//! The `Understanding` ability: turns captured speech into text.
//!
//! Samples pushed through [`Understanding::add_samples`] are split into
//! utterances by a [`SilenceDetector`]; each utterance is reported as a
//! `samples` event and transcribed by a [`SpeechParser`] into an `analysis`
//! event. Samples are ignored while the ability is switched off.

use crate::ability::{Ability, Activable, EventSink};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Ability name used when registering with the brain.
pub const NAME: &str = "Understanding";

/// Splits an audio stream into the valid samples found between silences.
pub trait SilenceDetector: Send {
    /// Feed samples; returns every utterance completed by this chunk.
    fn add(
        &mut self,
        samples: &[i32],
        sample_rate: u32,
        silence_max_audio_level: f64,
    ) -> Vec<Vec<i32>>;

    /// Drop any partially accumulated utterance.
    fn reset(&mut self);
}

/// Speech-to-text engine.
pub trait SpeechParser: Send + Sync {
    fn speech_to_text(
        &self,
        samples: &[i32],
        sample_rate: u32,
        significant_bits: u32,
    ) -> Result<String>;
}

/// Events emitted by the `Understanding` ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderstandingEvent {
    /// Text parsed from an utterance.
    Analysis,
    /// An utterance was detected.
    Samples,
}

impl UnderstandingEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Samples => "samples",
        }
    }
}

/// Audio parameters for the ability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnderstandingOptions {
    /// Audio level at or below which a chunk counts as silence.
    pub silence_max_audio_level: f64,
    /// Significant bits per sample, passed to the parser.
    pub significant_bits: u32,
}

impl Default for UnderstandingOptions {
    fn default() -> Self {
        Self {
            silence_max_audio_level: 35_000_000.0,
            significant_bits: 32,
        }
    }
}

pub struct Understanding {
    detector: Mutex<Box<dyn SilenceDetector>>,
    parser: Arc<dyn SpeechParser>,
    sink: Arc<dyn EventSink>,
    options: UnderstandingOptions,
    active: AtomicBool,
}

impl Understanding {
    pub fn new(
        detector: Box<dyn SilenceDetector>,
        parser: Arc<dyn SpeechParser>,
        sink: Arc<dyn EventSink>,
        options: UnderstandingOptions,
    ) -> Self {
        Self {
            detector: Mutex::new(detector),
            parser,
            sink,
            options,
            active: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Feed captured samples. Returns the number of utterances processed.
    pub fn add_samples(&self, samples: &[i32], sample_rate: u32) -> usize {
        if !self.is_active() {
            return 0;
        }

        let utterances = self
            .detector
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add(samples, sample_rate, self.options.silence_max_audio_level);

        for utterance in &utterances {
            self.process_utterance(utterance, sample_rate);
        }
        utterances.len()
    }

    fn process_utterance(&self, samples: &[i32], sample_rate: u32) {
        let duration_ms = if sample_rate == 0 {
            0
        } else {
            samples.len() as u64 * 1000 / u64::from(sample_rate)
        };
        self.sink.send(
            UnderstandingEvent::Samples.as_str(),
            serde_json::json!({
                "name": NAME,
                "sample_count": samples.len(),
                "sample_rate": sample_rate,
                "duration_ms": duration_ms,
            }),
        );

        match self
            .parser
            .speech_to_text(samples, sample_rate, self.options.significant_bits)
        {
            Ok(text) => {
                debug!(chars = text.len(), duration_ms, "utterance parsed");
                self.sink.send(
                    UnderstandingEvent::Analysis.as_str(),
                    serde_json::json!({ "name": NAME, "text": text }),
                );
            }
            Err(e) => {
                warn!(error = %e, duration_ms, "speech to text failed");
            }
        }
    }
}

impl Activable for Understanding {
    fn activate(&self, enabled: bool) {
        self.active.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.detector
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .reset();
        }
    }
}

impl Ability for Understanding {
    fn as_activable(self: Arc<Self>) -> Option<Arc<dyn Activable>> {
        Some(self)
    }
}

/// Energy-based silence detector.
///
/// A chunk whose RMS level exceeds the silence level is speech. An utterance
/// ends once `min_silence_ms` of silence follows it, and is kept only if it
/// spans at least `min_speech_ms`.
#[derive(Debug, Clone)]
pub struct EnergySilenceDetector {
    min_silence_ms: u32,
    min_speech_ms: u32,
    buffer: Vec<i32>,
    in_speech: bool,
    silent_samples: usize,
}

impl EnergySilenceDetector {
    #[must_use]
    pub fn new(min_silence_ms: u32, min_speech_ms: u32) -> Self {
        Self {
            min_silence_ms,
            min_speech_ms,
            buffer: Vec::new(),
            in_speech: false,
            silent_samples: 0,
        }
    }
}

impl Default for EnergySilenceDetector {
    fn default() -> Self {
        Self::new(800, 300)
    }
}

fn samples_for_ms(ms: u32, sample_rate: u32) -> usize {
    (u64::from(ms) * u64::from(sample_rate) / 1000) as usize
}

impl SilenceDetector for EnergySilenceDetector {
    fn add(
        &mut self,
        samples: &[i32],
        sample_rate: u32,
        silence_max_audio_level: f64,
    ) -> Vec<Vec<i32>> {
        let mut utterances = Vec::new();
        if samples.is_empty() {
            return utterances;
        }

        if rms_level(samples) > silence_max_audio_level {
            self.in_speech = true;
            self.silent_samples = 0;
            self.buffer.extend_from_slice(samples);
        } else if self.in_speech {
            // Trailing silence stays in the utterance.
            self.silent_samples += samples.len();
            self.buffer.extend_from_slice(samples);

            if self.silent_samples >= samples_for_ms(self.min_silence_ms, sample_rate) {
                self.in_speech = false;
                self.silent_samples = 0;
                let utterance = std::mem::take(&mut self.buffer);
                if utterance.len() >= samples_for_ms(self.min_speech_ms, sample_rate) {
                    utterances.push(utterance);
                }
            }
        }
        utterances
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.in_speech = false;
        self.silent_samples = 0;
    }
}

/// RMS level of integer samples.
fn rms_level(samples: &[i32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::BrainError;

    const RATE: u32 = 1_000;
    const LEVEL: f64 = 100.0;

    fn loud(n: usize) -> Vec<i32> {
        vec![1_000; n]
    }

    fn quiet(n: usize) -> Vec<i32> {
        vec![1; n]
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(String, serde_json::Value)>>);

    impl EventSink for RecordingSink {
        fn send(&self, event: &str, payload: serde_json::Value) {
            self.0.lock().unwrap().push((event.to_owned(), payload));
        }
    }

    struct FixedParser(std::result::Result<&'static str, &'static str>);

    impl SpeechParser for FixedParser {
        fn speech_to_text(&self, _samples: &[i32], _rate: u32, _bits: u32) -> Result<String> {
            self.0
                .map(str::to_owned)
                .map_err(|e| BrainError::Ability(e.to_owned()))
        }
    }

    fn understanding(
        parser: FixedParser,
    ) -> (Arc<Understanding>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let ability = Arc::new(Understanding::new(
            Box::new(EnergySilenceDetector::new(200, 100)),
            Arc::new(parser),
            Arc::clone(&sink) as Arc<dyn EventSink>,
            UnderstandingOptions {
                silence_max_audio_level: LEVEL,
                significant_bits: 16,
            },
        ));
        (ability, sink)
    }

    #[test]
    fn rms_level_of_constant_signal() {
        assert_eq!(rms_level(&[]), 0.0);
        assert!((rms_level(&[3, -3, 3, -3]) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn detector_emits_utterance_after_enough_silence() {
        let mut detector = EnergySilenceDetector::new(200, 100);
        assert!(detector.add(&quiet(100), RATE, LEVEL).is_empty());
        assert!(detector.add(&loud(150), RATE, LEVEL).is_empty());
        assert!(detector.add(&quiet(100), RATE, LEVEL).is_empty());

        let utterances = detector.add(&quiet(100), RATE, LEVEL);
        assert_eq!(utterances.len(), 1);
        assert_eq!(utterances[0].len(), 350);
    }

    #[test]
    fn detector_drops_too_short_utterances() {
        let mut detector = EnergySilenceDetector::new(50, 500);
        detector.add(&loud(20), RATE, LEVEL);
        assert!(detector.add(&quiet(60), RATE, LEVEL).is_empty());
        assert!(!detector.in_speech);
    }

    #[test]
    fn detector_reset_discards_partial_utterance() {
        let mut detector = EnergySilenceDetector::new(50, 10);
        detector.add(&loud(100), RATE, LEVEL);
        detector.reset();
        assert!(detector.add(&quiet(100), RATE, LEVEL).is_empty());
    }

    #[test]
    fn inactive_ability_ignores_samples() {
        let (ability, sink) = understanding(FixedParser(Ok("hello")));
        assert_eq!(ability.add_samples(&loud(500), RATE), 0);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn active_ability_emits_samples_then_analysis() {
        let (ability, sink) = understanding(FixedParser(Ok("hello brain")));
        ability.activate(true);

        ability.add_samples(&loud(300), RATE);
        assert_eq!(ability.add_samples(&quiet(250), RATE), 1);

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "samples");
        assert_eq!(events[0].1["sample_count"], 550);
        assert_eq!(events[0].1["duration_ms"], 550);
        assert_eq!(events[1].0, "analysis");
        assert_eq!(events[1].1["text"], "hello brain");
    }

    #[test]
    fn parser_failure_is_not_an_analysis() {
        let (ability, sink) = understanding(FixedParser(Err("model missing")));
        ability.activate(true);
        ability.add_samples(&loud(300), RATE);
        ability.add_samples(&quiet(250), RATE);

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "samples");
    }

    #[test]
    fn deactivation_resets_the_detector() {
        let (ability, sink) = understanding(FixedParser(Ok("x")));
        ability.activate(true);
        ability.add_samples(&loud(300), RATE);
        ability.activate(false);
        ability.activate(true);
        assert_eq!(ability.add_samples(&quiet(250), RATE), 0);
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
