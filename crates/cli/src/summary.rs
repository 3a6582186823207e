use latticefield::{FieldOutput, Vec3};

/// Aggregate numbers about a finished pass, for printing after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub sample_count: usize,
    pub bounds: (Vec3, Vec3),
    /// `(min, max, mean)` of the noise values, if the pass produced noise.
    pub noise_range: Option<(f32, f32, f32)>,
    /// Number of distinct hash values, if the pass produced hashes.
    pub distinct_hashes: Option<usize>,
}

impl FieldSummary {
    pub fn new(output: &FieldOutput) -> Self {
        let noise_range = output.noise().filter(|n| !n.is_empty()).map(|noise| {
            let (min, max, sum) = noise.iter().fold(
                (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
                |(min, max, sum), &n| (min.min(n), max.max(n), sum + n as f64),
            );
            (min, max, (sum / noise.len() as f64) as f32)
        });
        let distinct_hashes = output.hashes().map(|hashes| {
            let mut sorted = hashes.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.len()
        });

        Self {
            sample_count: output.sample_count(),
            bounds: output.bounds(),
            noise_range,
            distinct_hashes,
        }
    }
}

#[cfg(test)]
mod tests {
    use latticefield::{FieldPass, FieldSettings, OutputKind, SpaceTrs};

    use super::*;

    #[test]
    fn summarizes_noise_and_hashes() {
        let noise = FieldPass::new(FieldSettings {
            resolution: 10,
            ..FieldSettings::default()
        })
        .unwrap()
        .run()
        .unwrap();
        let summary = FieldSummary::new(&noise);
        assert_eq!(summary.sample_count, 100);
        assert!(summary.distinct_hashes.is_none());
        let (min, max, mean) = summary.noise_range.unwrap();
        assert!(-1.0 <= min && min <= mean && mean <= max && max <= 1.0);

        // Unscaled domain: every plane sample falls in one of four lattice cells.
        let hashes = FieldPass::new(FieldSettings {
            resolution: 10,
            output_kind: OutputKind::Hash,
            noise_transform: SpaceTrs::IDENTITY,
            ..FieldSettings::default()
        })
        .unwrap()
        .run()
        .unwrap();
        let summary = FieldSummary::new(&hashes);
        assert!(summary.noise_range.is_none());
        assert_eq!(summary.distinct_hashes, Some(4));
    }
}
