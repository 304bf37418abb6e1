use crate::error::{Error, Result};
use crate::prelude::Real;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretePoint {
    pub probability: Real,
    pub value: Real,
}

/// Dwell-time distribution of a progression. Samples are in ticks and never
/// negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Distribution {
    Fixed(Real),
    Discrete(Vec<DiscretePoint>),
    Uniform { min: Real, max: Real },
    #[serde(rename_all = "camelCase")]
    Normal { mean: Real, standard_deviation: Real },
}

impl Distribution {
    pub fn validate(&self) -> Result<()> {
        match self {
            Distribution::Fixed(value) => {
                if *value < 0.0 {
                    return Err(Error::semantic("fixed dwell time must not be negative"));
                }
            }
            Distribution::Discrete(points) => {
                if points.is_empty() {
                    return Err(Error::semantic("discrete dwell time needs at least one point"));
                }
                let total: Real = points.iter().map(|p| p.probability).sum();
                if (total - 1.0).abs() > 1e-6 {
                    return Err(Error::semantic(format!(
                        "discrete dwell time probabilities sum to {}, expected 1",
                        total
                    )));
                }
                if points.iter().any(|p| p.probability < 0.0 || p.value < 0.0) {
                    return Err(Error::semantic("discrete dwell time entries must not be negative"));
                }
            }
            Distribution::Uniform { min, max } => {
                if *min < 0.0 || max < min {
                    return Err(Error::semantic("uniform dwell time needs 0 <= min <= max"));
                }
            }
            Distribution::Normal { standard_deviation, .. } => {
                if *standard_deviation <= 0.0 {
                    return Err(Error::semantic("normal dwell time needs a positive standard deviation"));
                }
            }
        }
        Ok(())
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Real {
        let value = match self {
            Distribution::Fixed(value) => *value,
            Distribution::Discrete(points) => {
                let mut u: Real = rng.gen();
                let mut chosen = points.last().map(|p| p.value).unwrap_or(0.0);
                for point in points {
                    if u < point.probability {
                        chosen = point.value;
                        break;
                    }
                    u -= point.probability;
                }
                chosen
            }
            Distribution::Uniform { min, max } => {
                if max > min {
                    rng.gen_range(*min..*max)
                } else {
                    *min
                }
            }
            Distribution::Normal { mean, standard_deviation } => {
                mean + standard_deviation * standard_normal(rng)
            }
        };
        value.max(0.0)
    }
}

/// Box-Muller draw from the standard normal.
fn standard_normal<R: Rng>(rng: &mut R) -> Real {
    let u1: Real = rng.gen_range(Real::MIN_POSITIVE..1.0);
    let u2: Real = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
