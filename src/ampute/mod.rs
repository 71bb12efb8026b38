//! Missingness induction ("amputation").
//!
//! The `Amputer` trait is the collaborator contract the driver depends on.
//! `PatternAmputer` is the default implementation:
//!
//! - one missingness pattern per affected field (that field absent, all others kept)
//! - every row is assigned to a pattern uniformly at random
//! - within a pattern group each row is made incomplete with probability `p_i`,
//!   where `mean(p_i)` equals the target proportion
//!
//! For MCAR `p_i` is the target proportion itself. For right-tailed MAR,
//! `p_i = logistic(s_i + shift)` where `s_i` is the standardized sum score of the
//! fields that stay observed in the row's pattern, and `shift` is solved by
//! bisection. Rows with high observed values are therefore amputed more often.

use rand::Rng;

use crate::domain::{Dataset, Mechanism, MissingnessSpec};
use crate::error::SimError;
use crate::rng::SimRng;

/// Turns a complete dataset into an incomplete copy.
pub trait Amputer: Send + Sync {
    fn amputate(&self, data: &Dataset, spec: &MissingnessSpec, rng: &mut SimRng) -> Result<Dataset, SimError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternAmputer;

const SHIFT_BOUND: f64 = 60.0;
const BISECTION_STEPS: usize = 100;

impl Amputer for PatternAmputer {
    fn amputate(&self, data: &Dataset, spec: &MissingnessSpec, rng: &mut SimRng) -> Result<Dataset, SimError> {
        if !data.is_complete() {
            return Err(SimError::integrity("amputation requires a complete dataset"));
        }
        let targets = spec
            .fields()
            .iter()
            .map(|f| {
                data.field_index(f)
                    .ok_or_else(|| SimError::invalid(format!("cannot ampute unknown field '{f}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let n = data.n_rows();
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); targets.len()];
        for row in 0..n {
            groups[rng.gen_range(0..targets.len())].push(row);
        }

        let standardized = match spec.mechanism() {
            Mechanism::Mcar => None,
            Mechanism::MarRight => Some(standardize_columns(data)),
        };

        let mut out = data.clone();
        for (&target, rows) in targets.iter().zip(&groups) {
            let probs = match &standardized {
                None => vec![spec.proportion(); rows.len()],
                Some(z) => {
                    let scores: Vec<f64> = rows
                        .iter()
                        .map(|&r| {
                            (0..data.n_fields())
                                .filter(|&c| c != target)
                                .map(|c| z[c][r])
                                .sum::<f64>()
                        })
                        .collect();
                    right_tail_probabilities(&scores, spec.proportion())
                }
            };
            for (&row, p) in rows.iter().zip(probs) {
                if rng.r#gen::<f64>() < p {
                    out.set(row, target, None);
                }
            }
        }

        tracing::trace!(
            mechanism = spec.mechanism().display_name(),
            incomplete_rows = out.incomplete_rows(),
            rows = n,
            "amputed dataset"
        );
        Ok(out)
    }
}

/// Column-wise z-scores of a complete dataset (`z[col][row]`).
///
/// Constant columns map to zeros.
fn standardize_columns(data: &Dataset) -> Vec<Vec<f64>> {
    (0..data.n_fields())
        .map(|c| {
            let values = data.observed(c);
            let (mean, sd) = mean_sd(&values);
            values
                .iter()
                .map(|v| if sd > 0.0 { (v - mean) / sd } else { 0.0 })
                .collect()
        })
        .collect()
}

fn mean_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (values.first().copied().unwrap_or(0.0), 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Deletion probabilities increasing in `scores` with mean `proportion`.
///
/// Degenerate groups (fewer than two rows or constant scores) fall back to a
/// constant probability.
fn right_tail_probabilities(scores: &[f64], proportion: f64) -> Vec<f64> {
    let (mean, sd) = mean_sd(scores);
    if sd <= 0.0 {
        return vec![proportion; scores.len()];
    }
    let z: Vec<f64> = scores.iter().map(|s| (s - mean) / sd).collect();
    let mean_prob = |shift: f64| z.iter().map(|v| logistic(v + shift)).sum::<f64>() / z.len() as f64;

    let (mut lo, mut hi) = (-SHIFT_BOUND, SHIFT_BOUND);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mean_prob(mid) < proportion {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let shift = 0.5 * (lo + hi);
    z.iter().map(|v| logistic(v + shift)).collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::data::generate;
    use crate::domain::GeneratorParams;

    fn all_fields() -> Vec<String> {
        vec!["x".into(), "z".into(), "y".into()]
    }

    #[test]
    fn right_tail_probabilities_hit_target_and_increase() {
        let scores: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let p = right_tail_probabilities(&scores, 0.3);
        let mean = p.iter().sum::<f64>() / p.len() as f64;
        assert!((mean - 0.3).abs() < 1e-9, "mean {mean}");
        assert!(p.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn constant_scores_fall_back_to_constant_probability() {
        assert_eq!(right_tail_probabilities(&[2.0, 2.0, 2.0], 0.4), vec![0.4; 3]);
        assert_eq!(right_tail_probabilities(&[1.0], 0.4), vec![0.4]);
    }

    #[test]
    fn mcar_hits_target_proportion_with_single_field_patterns() {
        let data = generate(4_000, &GeneratorParams::default(), 1).unwrap();
        let spec = MissingnessSpec::new(0.5, Mechanism::Mcar, all_fields()).unwrap();
        let mut rng = SimRng::seed_from_u64(2);
        let out = PatternAmputer.amputate(&data, &spec, &mut rng).unwrap();

        assert!(out.same_shape(&data));
        let share = out.incomplete_rows() as f64 / out.n_rows() as f64;
        assert!((share - 0.5).abs() < 0.04, "incomplete share {share}");
        // One absent field per incomplete row.
        assert_eq!(out.missing_count(), out.incomplete_rows());
        for c in 0..3 {
            assert!(out.missing_in_field(c) > 500, "field {c}");
        }
    }

    #[test]
    fn mar_right_deletes_high_covariate_rows() {
        let data = generate(6_000, &GeneratorParams::default(), 3).unwrap();
        let spec = MissingnessSpec::new(0.5, Mechanism::MarRight, vec!["y".into()]).unwrap();
        let mut rng = SimRng::seed_from_u64(4);
        let out = PatternAmputer.amputate(&data, &spec, &mut rng).unwrap();

        let (mut x_missing, mut x_kept) = (Vec::new(), Vec::new());
        for r in 0..out.n_rows() {
            let x = data.get(r, 0).unwrap();
            if out.get(r, 2).is_none() {
                x_missing.push(x);
            } else {
                x_kept.push(x);
            }
        }
        let share = x_missing.len() as f64 / out.n_rows() as f64;
        assert!((share - 0.5).abs() < 0.04, "missing share {share}");

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(
            mean(&x_missing) > mean(&x_kept) + 0.3,
            "x among amputed rows {} vs kept {}",
            mean(&x_missing),
            mean(&x_kept)
        );
        // Only y was targeted.
        assert_eq!(out.missing_in_field(0), 0);
        assert_eq!(out.missing_in_field(1), 0);
    }

    #[test]
    fn amputation_is_reproducible() {
        let data = generate(300, &GeneratorParams::default(), 1).unwrap();
        let spec = MissingnessSpec::new(0.5, Mechanism::MarRight, all_fields()).unwrap();
        let a = PatternAmputer.amputate(&data, &spec, &mut SimRng::seed_from_u64(9)).unwrap();
        let b = PatternAmputer.amputate(&data, &spec, &mut SimRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_unknown_fields_and_incomplete_input() {
        let mut data = generate(30, &GeneratorParams::default(), 1).unwrap();
        let spec = MissingnessSpec::new(0.5, Mechanism::Mcar, vec!["w".into()]).unwrap();
        let mut rng = SimRng::seed_from_u64(1);
        assert!(matches!(
            PatternAmputer.amputate(&data, &spec, &mut rng),
            Err(SimError::InvalidParameter(_))
        ));

        data.set(0, 0, None);
        let spec = MissingnessSpec::new(0.5, Mechanism::Mcar, all_fields()).unwrap();
        assert!(matches!(
            PatternAmputer.amputate(&data, &spec, &mut rng),
            Err(SimError::DataIntegrity(_))
        ));
    }
}
