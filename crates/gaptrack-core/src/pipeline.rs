//! Normalize-then-detect pipeline shared by live tracking and replay

use crate::config::TrackingConfig;
use crate::detector::{DetectorConfig, EventDetector};
use crate::normalizer::IntervalNormalizer;
use crate::types::{DriverPair, Event, IntervalPoint, SampleBatch};

/// Output of one pipeline tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutput {
    pub point: Option<IntervalPoint>,
    pub events: Vec<Event>,
}

/// Normalizer and detector for one driver pair
#[derive(Debug, Clone)]
pub struct TrackingPipeline {
    normalizer: IntervalNormalizer,
    detector: EventDetector,
}

impl TrackingPipeline {
    pub fn new(pair: DriverPair, config: &TrackingConfig) -> Self {
        Self {
            normalizer: IntervalNormalizer::new(pair, config.stale_after()),
            detector: EventDetector::new(pair, DetectorConfig::from(config)),
        }
    }

    pub fn normalizer(&self) -> &IntervalNormalizer {
        &self.normalizer
    }

    /// Run one batch through the normalizer and detector
    pub fn process(&mut self, batch: &SampleBatch) -> TickOutput {
        match self.normalizer.process(batch) {
            Some(point) => TickOutput {
                events: self.detector.observe(&point),
                point: Some(point),
            },
            None => TickOutput::default(),
        }
    }

    /// Flush events still open at the end of the session
    pub fn finish(&mut self) -> Vec<Event> {
        self.detector.finish().into_iter().collect()
    }

    /// Process a complete batch sequence at once
    pub fn run<'a>(
        pair: DriverPair,
        config: &TrackingConfig,
        batches: impl IntoIterator<Item = &'a SampleBatch>,
    ) -> (Vec<IntervalPoint>, Vec<Event>) {
        let mut pipeline = Self::new(pair, config);
        let mut points = Vec::new();
        let mut events = Vec::new();
        for batch in batches {
            let output = pipeline.process(batch);
            points.extend(output.point);
            events.extend(output.events);
        }
        events.extend(pipeline.finish());
        (points, events)
    }
}
