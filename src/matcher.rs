//! Matcher contract between the session manager and the biometric
//! classification algorithm. The session manager treats the matcher as an
//! external collaborator: it hands over a labeled training set and a decoded
//! probe, and gets back the nearest label with a confidence, or nothing.
//!
//! `NearestTemplateMatcher` is the bundled reference implementation so the
//! service runs end-to-end. Its scoring (normalized byte distance) is a
//! stand-in, not a contract; any engine honoring the trait can replace it.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// One labeled enrollment sample handed to the matcher at training time.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub label: String,
    pub sample: Vec<u8>,
}

/// Best-match outcome for a probe that passed the rejection threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub label: String,
    pub confidence: f64,
}

pub trait Matcher: Send + Sync {
    /// Replace the training set. Recognitions already in flight keep the
    /// snapshot they started with.
    fn train(&self, examples: Vec<TrainingExample>);

    /// Nearest enrolled label for the probe, or None when the best
    /// confidence falls below the rejection threshold.
    fn recognize(&self, probe: &[u8]) -> Option<MatchOutcome>;
}

pub struct NearestTemplateMatcher {
    threshold: f64,
    snapshot: RwLock<Arc<Vec<TrainingExample>>>,
}

impl NearestTemplateMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn threshold(&self) -> f64 { self.threshold }

    fn similarity(a: &[u8], b: &[u8]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let n = a.len().max(b.len());
        let mut total: u64 = 0;
        for i in 0..n {
            let x = a.get(i).copied().unwrap_or(0) as i64;
            let y = b.get(i).copied().unwrap_or(0) as i64;
            total += (x - y).unsigned_abs();
        }
        1.0 - (total as f64) / (255.0 * n as f64)
    }
}

impl Matcher for NearestTemplateMatcher {
    fn train(&self, examples: Vec<TrainingExample>) {
        let count = examples.len();
        *self.snapshot.write() = Arc::new(examples);
        debug!(target: "facegate::matcher", "trained with {} example(s)", count);
    }

    fn recognize(&self, probe: &[u8]) -> Option<MatchOutcome> {
        let set = self.snapshot.read().clone();
        let mut best: Option<MatchOutcome> = None;
        for example in set.iter() {
            let confidence = Self::similarity(probe, &example.sample);
            let better = match &best {
                Some(b) => confidence > b.confidence,
                None => true,
            };
            if better {
                best = Some(MatchOutcome { label: example.label.clone(), confidence });
            }
        }
        match best {
            Some(b) if b.confidence >= self.threshold => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(label: &str, sample: &[u8]) -> TrainingExample {
        TrainingExample { label: label.to_string(), sample: sample.to_vec() }
    }

    #[test]
    fn exact_sample_matches_with_full_confidence() {
        let m = NearestTemplateMatcher::new(0.75);
        m.train(vec![example("alice", b"abcdef"), example("bob", b"zzzzzz")]);
        let out = m.recognize(b"abcdef").unwrap();
        assert_eq!(out.label, "alice");
        assert!((out.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dissimilar_probe_is_rejected() {
        let m = NearestTemplateMatcher::new(0.9);
        m.train(vec![example("alice", &[0u8; 64])]);
        assert!(m.recognize(&[255u8; 64]).is_none());
    }

    #[test]
    fn empty_training_set_never_matches() {
        let m = NearestTemplateMatcher::new(0.0);
        assert!(m.recognize(b"anything").is_none());
    }

    #[test]
    fn retrain_replaces_the_snapshot() {
        let m = NearestTemplateMatcher::new(0.75);
        m.train(vec![example("alice", b"aaaa")]);
        assert_eq!(m.recognize(b"aaaa").unwrap().label, "alice");
        m.train(vec![example("bob", b"aaaa")]);
        assert_eq!(m.recognize(b"aaaa").unwrap().label, "bob");
    }

    #[test]
    fn nearest_of_several_wins() {
        let m = NearestTemplateMatcher::new(0.5);
        m.train(vec![
            example("far", &[0u8, 0, 0, 0]),
            example("near", &[10u8, 10, 10, 10]),
        ]);
        let out = m.recognize(&[12u8, 12, 12, 12]).unwrap();
        assert_eq!(out.label, "near");
    }
}
