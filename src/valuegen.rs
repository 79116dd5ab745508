use crate::random::RandomGenerator;

// Maximum number of refinement attempts when generating.
const MAX_ATTEMPTS: u32 = 2000;

// How much the generated byte count may differ from the desired one.
const MAX_DIFF_RATIO: f64 = 0.01;

// Minimal allowed difference, as the exact amount may be unreachable with
// smaller byte counts.
const MIN_DIFF: u64 = 50;

// The maximum distance to look when choosing an exact value.
const GET_EXACT_MAX_DISTANCE: usize = 1000;

// If the generated sum differs from the desired sum by this ratio, fall back
// to the uniform distribution.
const DIFF_RATIO_FALLBACK_TO_UNIFORM: f64 = 0.2;

/// A half-open value interval with a probability weight. Weights across a
/// distribution need not sum to 1; draws use the running sum as their range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalInfo {
    pub from: u64,
    pub to: u64,
    pub probability: f64,
}

fn sum_probabilities(intervals: &[IntervalInfo]) -> f64 {
    intervals.iter().map(|inter| inter.probability).sum()
}

/// Pick an interval by weight, then a value uniformly inside it.
fn generate_random_value(
    intervals: &[IntervalInfo],
    interval_prob_sum: f64,
    rng: &mut RandomGenerator,
) -> u64 {
    let mut prob_sum = 0.0;
    let gen_val = rng.random_double_range(0.0, interval_prob_sum);
    let mut value = 0;
    for inter in intervals {
        prob_sum += inter.probability;
        if gen_val <= prob_sum {
            value = rng.random_uint(inter.from, inter.to);
            break;
        }
    }
    value
}

/// Generates `num_pkts` packet sizes whose sum approximates `num_bytes`
/// while each size still follows the interval distribution.
///
/// Callers first reserve the structurally pinned sizes with
/// [`get_value_exact`](Self::get_value_exact), then call
/// [`plan_remaining`](Self::plan_remaining) once, then drain the pool with
/// [`get_value`](Self::get_value).
#[derive(Debug, Clone)]
pub struct PacketSizeGenerator {
    intervals: Vec<IntervalInfo>,
    num_pkts: u64,
    num_bytes: u64,
    assigned_pkts: u64,
    assigned_bytes: u64,
    values: Vec<u64>,
}

impl PacketSizeGenerator {
    pub fn new(intervals: Vec<IntervalInfo>, num_pkts: u64, num_bytes: u64) -> Self {
        assert!(!intervals.is_empty());
        PacketSizeGenerator {
            intervals,
            num_pkts,
            num_bytes,
            assigned_pkts: 0,
            assigned_bytes: 0,
            values: Vec::new(),
        }
    }

    /// Regenerate the value pool for whatever budget the exact reservations
    /// left over.
    pub fn plan_remaining(&mut self, rng: &mut RandomGenerator) {
        let rem_pkts = self.num_pkts.saturating_sub(self.assigned_pkts);
        let rem_bytes = self.num_bytes.saturating_sub(self.assigned_bytes);
        self.generate(rem_pkts, rem_bytes, rng);
    }

    fn generate(&mut self, desired_pkts: u64, desired_bytes: u64, rng: &mut RandomGenerator) {
        let mut intervals = self.intervals.clone();

        let mut prob_sum = sum_probabilities(&intervals);
        let mut values_sum: u64 = 0;
        self.values = vec![0; desired_pkts as usize];

        if desired_pkts == 0 || desired_bytes == 0 {
            return;
        }

        if desired_pkts == 1 {
            self.values[0] = desired_bytes;
            return;
        }

        for value in self.values.iter_mut() {
            *value = generate_random_value(&intervals, prob_sum, rng);
            values_sum += *value;
        }

        let max_diff = u64::max((MAX_DIFF_RATIO * desired_bytes as f64) as u64, MIN_DIFF);
        let target_min = desired_bytes.saturating_sub(max_diff);
        let target_max = desired_bytes + max_diff;

        let mut num_attempts = MAX_ATTEMPTS;
        let mut best_diff = values_sum.abs_diff(desired_bytes);
        let mut best_values = self.values.clone();
        while (values_sum < target_min || values_sum > target_max) && num_attempts > 0 {
            num_attempts -= 1;

            // Bias the next sweep by silencing the intervals on the wrong
            // side of the current average.
            let avg_value = values_sum / desired_pkts;
            let orig_intervals = intervals.clone();
            if values_sum < target_min {
                for inter in intervals.iter_mut() {
                    let inter_avg = inter.from / 2 + inter.to / 2;
                    if inter_avg < avg_value {
                        inter.probability = 0.0;
                    }
                }
            } else if values_sum > target_max {
                for inter in intervals.iter_mut() {
                    let inter_avg = inter.from / 2 + inter.to / 2;
                    if inter_avg > avg_value {
                        inter.probability = 0.0;
                    }
                }
            }
            prob_sum = sum_probabilities(&intervals);

            for i in 0..self.values.len() {
                let new_value = generate_random_value(&intervals, prob_sum, rng);
                values_sum = values_sum - self.values[i] + new_value;
                self.values[i] = new_value;

                if values_sum >= target_min && values_sum <= target_max {
                    break;
                }

                let diff = values_sum.abs_diff(desired_bytes);
                if diff < best_diff {
                    best_values = self.values.clone();
                    best_diff = diff;
                }
            }

            intervals = orig_intervals;
            prob_sum = sum_probabilities(&intervals);

            let diff = values_sum.abs_diff(desired_bytes);
            if diff < best_diff {
                best_values = self.values.clone();
                best_diff = diff;
            }
        }

        let final_diff_ratio = best_diff as f64 / desired_bytes as f64;
        log::trace!(
            "final diff: {best_diff}, ratio: {final_diff_ratio}, desired: {desired_bytes}"
        );

        if final_diff_ratio > DIFF_RATIO_FALLBACK_TO_UNIFORM {
            self.values.fill(desired_bytes / desired_bytes);
            log::info!(
                "generated values difference too large {final_diff_ratio}, \
                 fallback to uniform distribution"
            );
        } else {
            self.values = best_values;
            rng.shuffle(&mut self.values);
        }
    }

    /// Take the next planned value; when the pool is drained, draw a fresh
    /// one from the unbiased distribution.
    pub fn get_value(&mut self, rng: &mut RandomGenerator) -> u64 {
        let value = match self.values.pop() {
            Some(value) => value,
            None => generate_random_value(&self.intervals, sum_probabilities(&self.intervals), rng),
        };

        self.assigned_pkts += 1;
        self.assigned_bytes += value;

        value
    }

    /// Reserve budget for a structurally pinned size: remove the pool value
    /// closest to `value` within a bounded window, and account `value`
    /// itself against the byte budget.
    pub fn get_value_exact(&mut self, value: u64, rng: &mut RandomGenerator) {
        if self.values.is_empty() {
            self.assigned_pkts += 1;
            self.assigned_bytes += value;
            return;
        }

        let (start, end) = if self.values.len() <= GET_EXACT_MAX_DISTANCE {
            (0, self.values.len())
        } else {
            let start =
                rng.random_uint(0, (self.values.len() - GET_EXACT_MAX_DISTANCE) as u64) as usize;
            (start, start + GET_EXACT_MAX_DISTANCE)
        };

        let mut closest = 0;
        let mut closest_diff = value;
        for i in start..end {
            let diff = self.values[i].abs_diff(value);
            if diff < closest_diff {
                closest = i;
                closest_diff = diff;
            }
        }

        self.values.swap_remove(closest);

        self.assigned_pkts += 1;
        self.assigned_bytes += value;
    }

    pub fn print_report(&self) {
        let d_bytes = if self.num_bytes == 0 {
            0.0
        } else {
            self.num_bytes.abs_diff(self.assigned_bytes) as f64 / self.num_bytes as f64
        };
        let d_pkts = if self.num_pkts == 0 {
            0.0
        } else {
            self.num_pkts.abs_diff(self.assigned_pkts) as f64 / self.num_pkts as f64
        };
        log::debug!(
            "[bytes] target={} actual={} (diff={:.2}%)  [pkts] target={} actual={} (diff={:.2}%)",
            self.num_bytes,
            self.assigned_bytes,
            d_bytes * 100.0,
            self.num_pkts,
            self.assigned_pkts,
            d_pkts * 100.0,
        );
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.values.len()
    }
}
