//! Roster matching: probe encodings against registered reference encodings.

use crate::types::{Embedding, FaceMatch, Student};

/// Default maximum cosine distance for a match to count.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f32 = 0.6;

/// Matches probe encodings against a roster snapshot by cosine distance.
///
/// Every reference encoding of every student is compared; the closest one
/// wins. Ties go to the student registered first.
#[derive(Debug, Clone, Copy)]
pub struct RosterMatcher {
    threshold: f32,
}

impl Default for RosterMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPTANCE_THRESHOLD)
    }
}

impl RosterMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Closest student for a single probe, if strictly below the threshold.
    pub fn best_match(&self, probe: &Embedding, roster: &[Student]) -> Option<FaceMatch> {
        let (idx, distance) = closest(probe, roster)?;
        self.accept(roster, idx, distance)
    }

    /// Globally closest student across all probe faces of one frame.
    pub fn match_frame(&self, probes: &[Embedding], roster: &[Student]) -> Option<FaceMatch> {
        let mut best: Option<(usize, f32)> = None;
        for probe in probes {
            let Some((idx, distance)) = closest(probe, roster) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_idx, best_distance)) => {
                    distance < best_distance || (distance == best_distance && idx < best_idx)
                }
            };
            if better {
                best = Some((idx, distance));
            }
        }

        let (idx, distance) = best?;
        self.accept(roster, idx, distance)
    }

    fn accept(&self, roster: &[Student], idx: usize, distance: f32) -> Option<FaceMatch> {
        (distance < self.threshold).then(|| FaceMatch {
            roll_number: roster[idx].roll_number.clone(),
            distance,
        })
    }
}

/// Roster index and distance of the closest reference encoding.
///
/// References whose dimension differs from the probe are skipped.
fn closest(probe: &Embedding, roster: &[Student]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, student) in roster.iter().enumerate() {
        for reference in &student.encodings {
            if reference.dimension() != probe.dimension() {
                continue;
            }
            let distance = probe.distance(reference);
            if !distance.is_finite() {
                continue;
            }
            // Strict comparison keeps the earliest student on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
    }
    best
}
