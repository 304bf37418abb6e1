use rand::Rng;

/// Split a global sampling budget into per-partition allowances by
/// proportional rounding with error carry, so the allowances sum to exactly
/// `min(limit, Σ sizes)` and each stays within its partition's size.
pub fn proportional_allowances(sizes: &[u64], limit: u64) -> Vec<u64> {
    let total: u64 = sizes.iter().sum();
    let mut out = vec![0u64; sizes.len()];
    if total == 0 {
        return out;
    }
    let limit = limit.min(total);

    let mut carry = 0.0f64;
    let mut assigned = 0u64;
    for (i, &size) in sizes.iter().enumerate() {
        let exact = limit as f64 * size as f64 / total as f64;
        let mut allowance = (exact + carry).round().max(0.0) as u64;
        allowance = allowance.min(size).min(limit - assigned);
        carry += exact - allowance as f64;
        out[i] = allowance;
        assigned += allowance;
    }

    // clamping may leave a remainder; hand it to partitions with spare
    // capacity in rank order
    let mut i = 0;
    while assigned < limit {
        if out[i] < sizes[i] {
            out[i] += 1;
            assigned += 1;
        }
        i = (i + 1) % sizes.len();
    }

    out
}

/// Streaming selection of exactly `allowance` of `count` items: each item is
/// taken with probability remaining-allowance / remaining-available.
pub fn sample_exact<R: Rng>(count: usize, allowance: u64, rng: &mut R) -> Vec<bool> {
    let mut taken = Vec::with_capacity(count);
    let mut remaining = count as u64;
    let mut need = allowance.min(remaining);

    for _ in 0..count {
        let take = need > 0 && rng.gen::<f64>() < need as f64 / remaining as f64;
        if take {
            need -= 1;
        }
        remaining -= 1;
        taken.push(take);
    }
    taken
}

/// Independent per-item Bernoulli sampling with probability `percent / 100`.
/// May select zero items; that outcome is accepted as is.
pub fn sample_percent<R: Rng>(count: usize, percent: f64, rng: &mut R) -> Vec<bool> {
    let p = (percent / 100.0).clamp(0.0, 1.0);
    (0..count).map(|_| rng.gen::<f64>() < p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::{SeedableRng, SmallRng};

    #[test]
    fn allowances_sum_exactly() {
        for limit in &[0u64, 1, 37, 300, 1000, 5000] {
            let sizes = vec![100u64, 400, 250, 250];
            let allowances = proportional_allowances(&sizes, *limit);
            let total: u64 = allowances.iter().sum();
            assert_eq!(total, (*limit).min(1000));
            for (allowance, size) in allowances.iter().zip(sizes.iter()) {
                assert!(allowance <= size);
            }
        }
    }

    #[test]
    fn allowances_proportional_within_one() {
        let sizes = vec![100u64, 400, 250, 250];
        let allowances = proportional_allowances(&sizes, 300);
        let expected = [30.0, 120.0, 75.0, 75.0];
        for (allowance, exact) in allowances.iter().zip(expected.iter()) {
            assert!((*allowance as f64 - exact).abs() <= 1.0);
        }
    }

    #[test]
    fn allowances_with_empty_partitions() {
        let allowances = proportional_allowances(&[0, 10, 0, 10], 15);
        assert_eq!(allowances.iter().sum::<u64>(), 15);
        assert_eq!(allowances[0], 0);
        assert_eq!(allowances[2], 0);
    }

    #[test]
    fn exact_sampling_hits_allowance() {
        let mut rng = SmallRng::seed_from_u64(9);
        for &(count, allowance) in &[(0usize, 0u64), (10, 0), (10, 10), (1000, 300), (5, 9)] {
            let taken = sample_exact(count, allowance, &mut rng);
            let hits = taken.iter().filter(|&&t| t).count() as u64;
            assert_eq!(hits, allowance.min(count as u64));
        }
    }

    #[test]
    fn percent_sampling_is_approximate() {
        let mut rng = SmallRng::seed_from_u64(5);
        let taken = sample_percent(10_000, 25.0, &mut rng);
        let hits = taken.iter().filter(|&&t| t).count();
        assert!(hits > 2_200 && hits < 2_800, "hits = {}", hits);
    }
}
