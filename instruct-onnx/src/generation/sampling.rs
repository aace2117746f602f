use crate::error::{AdapterError, Result};
use rand::{
    distr::{weighted::WeightedIndex, Distribution},
    rngs::StdRng,
    SeedableRng,
};

/// How the next token is picked from a logits row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Argmax,
    /// Temperature scaling, then top-k, then nucleus (top-p) filtering.
    /// `top_k == 0` disables the top-k cut.
    Sample {
        temperature: f32,
        top_k: usize,
        top_p: f32,
    },
}

/// Next-token sampler. One is created per predict call so that a fixed seed
/// replays the same draws.
pub struct Sampler {
    strategy: Strategy,
    rng: StdRng,
}

impl Sampler {
    pub fn new(strategy: Strategy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { strategy, rng }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn sample(&mut self, logits: &[f32]) -> Result<u32> {
        if logits.is_empty() {
            return Err(AdapterError::generation("Cannot sample from empty logits"));
        }

        match self.strategy {
            Strategy::Argmax => Ok(argmax(logits)),
            Strategy::Sample {
                temperature,
                top_k,
                top_p,
            } => {
                let peak = logits
                    .iter()
                    .copied()
                    .filter(|l| !l.is_nan())
                    .fold(f32::NEG_INFINITY, f32::max);
                if peak.is_finite() && !(peak / temperature).is_finite() {
                    log::debug!("Temperature {temperature} overflows the logits, picking argmax");
                    return Ok(argmax(logits));
                }

                let candidates = nucleus(logits, temperature, top_k, top_p);
                let dist = WeightedIndex::new(candidates.iter().map(|&(_, p)| p))
                    .map_err(|e| AdapterError::generation(format!("Invalid distribution: {e}")))?;
                Ok(candidates[dist.sample(&mut self.rng)].0)
            }
        }
    }
}

pub fn argmax(logits: &[f32]) -> u32 {
    let mut max_idx = 0usize;
    let mut max_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > max_val {
            max_val = v;
            max_idx = i;
        }
    }
    max_idx as u32
}

/// Token ids with their renormalized probabilities, most likely first.
fn nucleus(logits: &[f32], temperature: f32, top_k: usize, top_p: f32) -> Vec<(u32, f32)> {
    let mut scaled: Vec<(u32, f32)> = logits
        .iter()
        .enumerate()
        .map(|(i, &l)| (i as u32, if l.is_nan() { f32::NEG_INFINITY } else { l / temperature }))
        .collect();
    scaled.sort_by(|a, b| b.1.total_cmp(&a.1));

    if top_k > 0 && top_k < scaled.len() {
        scaled.truncate(top_k);
    }

    // softmax over the survivors
    let max_logit = scaled[0].1;
    let mut probs: Vec<(u32, f32)> = scaled
        .into_iter()
        .map(|(i, l)| (i, (l - max_logit).exp()))
        .collect();
    let sum: f32 = probs.iter().map(|&(_, p)| p).sum();
    probs.iter_mut().for_each(|(_, p)| *p /= sum);

    let mut cumulative = 0.0;
    let mut cutoff = probs.len();
    for (i, &(_, p)) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= top_p {
            cutoff = i + 1;
            break;
        }
    }
    probs.truncate(cutoff);
    probs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling(temperature: f32, top_k: usize, top_p: f32) -> Strategy {
        Strategy::Sample {
            temperature,
            top_k,
            top_p,
        }
    }

    #[test]
    fn test_argmax_picks_highest_logit() {
        let mut sampler = Sampler::new(Strategy::Argmax, None);
        assert_eq!(sampler.sample(&[0.1, 2.5, -1.0, 2.4]).unwrap(), 1);
    }

    #[test]
    fn test_empty_logits_is_generation_failure() {
        let mut sampler = Sampler::new(Strategy::Argmax, None);
        assert!(sampler.sample(&[]).unwrap_err().is_generation_failure());
    }

    #[test]
    fn test_top_k_one_is_greedy() {
        let mut sampler = Sampler::new(sampling(1.0, 1, 1.0), Some(7));
        for _ in 0..20 {
            assert_eq!(sampler.sample(&[0.0, 0.5, 3.0, 0.2]).unwrap(), 2);
        }
    }

    #[test]
    fn test_top_p_keeps_smallest_covering_set() {
        // probabilities after softmax are roughly [0.64, 0.24, 0.09, 0.03]
        let kept = nucleus(&[3.0, 2.0, 1.0, 0.0], 1.0, 0, 0.8);
        let ids: Vec<u32> = kept.iter().map(|&(i, _)| i).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_low_temperature_concentrates_mass() {
        let kept = nucleus(&[1.0, 2.0, 1.5], 0.1, 50, 1.0);
        assert_eq!(kept[0].0, 1);
        assert!(kept[0].1 > 0.99);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let logits = [1.0, 1.1, 0.9, 1.05, 0.95];
        let draw = |seed| {
            let mut sampler = Sampler::new(sampling(1.0, 0, 1.0), Some(seed));
            (0..32)
                .map(|_| sampler.sample(&logits).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_vanishing_temperature_falls_back_to_argmax() {
        let mut sampler = Sampler::new(sampling(1e-39, 50, 1.0), Some(3));
        assert_eq!(sampler.sample(&[0.5, 2.0, 1.0]).unwrap(), 1);
        assert_eq!(sampler.sample(&[-4.0, -1.0, -2.0]).unwrap(), 1);
    }

    #[test]
    fn test_all_masked_logits_fail() {
        let mut sampler = Sampler::new(sampling(1.0, 0, 1.0), Some(1));
        let logits = [f32::NEG_INFINITY, f32::NEG_INFINITY];
        assert!(sampler.sample(&logits).unwrap_err().is_generation_failure());
    }
}
