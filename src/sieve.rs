//! Segmented sieve of Eratosthenes: a cold run starting from 2, and a warm
//! run over `[start, max)` seeded by every prime up to `start`.
//!
//! Both constructors drive a [`Consumer`] synchronously on the calling
//! thread (see module docs on [`crate::batch`] for how the batch driver
//! chains runs together via scratch files).

use crate::bitset::BitSet;
use crate::error::{Result, SieveError};

/// Sink for primes emitted by a sieve run. `end` is called exactly once,
/// after the last `accept`, but only on a clean finish. A run that fails
/// partway never calls it, so a consumer chained to a file writer knows
/// not to finalize a header for a truncated run.
pub trait Consumer {
    fn accept(&mut self, value: u64) -> Result<()>;
    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Adapts a plain closure into a [`Consumer`] with a no-op `end`.
pub struct FnConsumer<F>(pub F);

impl<F: FnMut(u64) -> Result<()>> Consumer for FnConsumer<F> {
    fn accept(&mut self, value: u64) -> Result<()> {
        (self.0)(value)
    }
}

/// A fan-out sink: every inner consumer receives each value, in order;
/// `end()` is likewise broadcast to all of them.
pub struct FanOut<'a>(pub Vec<&'a mut dyn Consumer>);

impl Consumer for FanOut<'_> {
    fn accept(&mut self, value: u64) -> Result<()> {
        for c in &mut self.0 {
            c.accept(value)?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        for c in &mut self.0 {
            c.end()?;
        }
        Ok(())
    }
}

/// Segmented sieve of Eratosthenes, run either cold (from 2) or warm
/// (seeded by a preceding window's primes).
pub struct Sieve;

impl Sieve {
    /// Sieves every prime in `[2, max)`, emitting at most `total` of them
    /// (unlimited when `total < 0`). Returns the last prime emitted, or `0`
    /// if none were (e.g. `max < 3`).
    pub fn run_cold(max: u64, consumer: &mut dyn Consumer, total: i64) -> Result<u64> {
        if max < 3 {
            consumer.end()?;
            return Ok(0);
        }
        let mut bits = BitSet::new(max);
        bits.set_all(2, max);

        let mut last = 0u64;
        let mut emitted = 0i64;
        let mut cursor = bits.next_set_bit(2);
        while let Some(p) = cursor {
            if total >= 0 && emitted >= total {
                break;
            }
            consumer.accept(p)?;
            last = p;
            emitted += 1;
            clear_multiples_from(&mut bits, p, 2 * p, max);
            cursor = bits.next_set_bit(p + 1);
        }
        consumer.end()?;
        Ok(last)
    }

    /// Sieves every prime in `(start, max)`, given `seed` yielding every
    /// prime in `[2, start]` in ascending order followed by `-1`. Emits at
    /// most `total` of them (unlimited when `total < 0`). Returns the last
    /// prime emitted, or `start` if none were.
    pub fn run_warm(
        start: u64,
        mut seed: impl FnMut() -> i64,
        consumer: &mut dyn Consumer,
        max: u64,
        total: i64,
    ) -> Result<u64> {
        if max <= start {
            consumer.end()?;
            return Ok(start);
        }
        let mut bits = BitSet::new(max - start);
        bits.set_all(0, max - start);

        let mut prev: Option<u64> = None;
        loop {
            let raw = seed();
            if raw == -1 {
                break;
            }
            let value = raw as u64;

            if prev.is_none() && value != 2 {
                return Err(SieveError::SeedDoesNotStartAtTwo(value).into());
            }
            if let Some(p) = prev {
                if value <= p {
                    return Err(SieveError::SeedNotAscending {
                        previous: p,
                        value,
                    }
                    .into());
                }
            }
            for &small in &[2u64, 3, 5, 7] {
                if value > small && value % small == 0 {
                    return Err(SieveError::SeedNotSmooth(value).into());
                }
            }
            if value > max {
                return Err(SieveError::SeedExceedsMax { value, max }.into());
            }

            let lowest = if start / value > 0 {
                (start / value + 1) * value
            } else {
                2 * value
            };
            clear_multiples_in_window(&mut bits, value, lowest, start, max);
            prev = Some(value);
        }

        match prev {
            Some(last) if last == start => {}
            Some(last) => return Err(SieveError::SeedEndpointMismatch { last, start }.into()),
            None => return Err(SieveError::SeedDoesNotStartAtTwo(0).into()),
        }

        let mut last_emitted = start;
        let mut emitted = 0i64;
        let mut cursor = bits.next_set_bit(1);
        while let Some(bit) = cursor {
            if total >= 0 && emitted >= total {
                break;
            }
            let p = start + bit;
            consumer.accept(p)?;
            last_emitted = p;
            emitted += 1;
            clear_multiples_in_window(&mut bits, p, 2 * p, start, max);
            cursor = bits.next_set_bit(bit + 1);
        }
        consumer.end()?;
        Ok(last_emitted)
    }
}

/// Clears multiples of `i` starting at `from`, stepping by `2*i` and
/// clearing both `j` and `j+i` each step: halved-iteration inner loop, for
/// `i == 2` it still clears every even multiple, since consecutive `j` and
/// `j+2` cover both even residues.
fn clear_multiples_from(bits: &mut BitSet, i: u64, from: u64, max: u64) {
    let mut j = from;
    while j < max {
        bits.clear(j);
        if j + i < max {
            bits.clear(j + i);
        }
        j += 2 * i;
    }
}

/// As [`clear_multiples_from`], but operating on a window bitset offset by
/// `start` (bit `k` represents integer `start + k`).
fn clear_multiples_in_window(bits: &mut BitSet, i: u64, from: u64, start: u64, max: u64) {
    let mut j = from;
    while j < max {
        if j >= start {
            bits.clear(j - start);
        }
        let j_plus_i = j + i;
        if j_plus_i < max && j_plus_i >= start {
            bits.clear(j_plus_i - start);
        }
        j += 2 * i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_cold(max: u64, total: i64) -> (Vec<u64>, u64) {
        let mut out = Vec::new();
        let last = Sieve::run_cold(
            max,
            &mut FnConsumer(|v| {
                out.push(v);
                Ok(())
            }),
            total,
        )
        .unwrap();
        (out, last)
    }

    #[test]
    fn tiny_cold_matches_known_primes() {
        let (primes, last) = collect_cold(30, -1);
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(last, 29);
    }

    #[test]
    fn cold_respects_total_cap() {
        let (primes, last) = collect_cold(100, 5);
        assert_eq!(primes, vec![2, 3, 5, 7, 11]);
        assert_eq!(last, 11);
    }

    #[test]
    fn cold_matches_brute_force_up_to_small_bound() {
        fn is_prime(n: u64) -> bool {
            if n < 2 {
                return false;
            }
            (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
        }
        let expected: Vec<u64> = (2..500).filter(|&n| is_prime(n)).collect();
        let (primes, _) = collect_cold(500, -1);
        assert_eq!(primes, expected);
    }

    #[test]
    fn warm_continues_where_cold_left_off() {
        let (cold_primes, last) = collect_cold(1000, -1);
        assert_eq!(last, 997);

        let mut idx = 0usize;
        let seed = move || -> i64 {
            if idx < cold_primes.len() {
                let v = cold_primes[idx] as i64;
                idx += 1;
                v
            } else {
                -1
            }
        };

        let mut warm_primes = Vec::new();
        let last_warm = Sieve::run_warm(
            997,
            seed,
            &mut FnConsumer(|v| {
                warm_primes.push(v);
                Ok(())
            }),
            2000,
            -1,
        )
        .unwrap();

        assert_eq!(warm_primes.len(), 135);
        assert_eq!(warm_primes.first(), Some(&1009));
        assert_eq!(warm_primes.last(), Some(&1999));
        assert_eq!(last_warm, 1999);
    }

    #[test]
    fn warm_rejects_seed_not_starting_at_two() {
        let mut seed_values = vec![3i64, -1].into_iter();
        let result = Sieve::run_warm(
            3,
            move || seed_values.next().unwrap_or(-1),
            &mut FnConsumer(|_| Ok(())),
            10,
            -1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn warm_rejects_endpoint_mismatch() {
        let mut seed_values = vec![2i64, 3, -1].into_iter();
        let result = Sieve::run_warm(
            5,
            move || seed_values.next().unwrap_or(-1),
            &mut FnConsumer(|_| Ok(())),
            20,
            -1,
        );
        assert!(result.is_err());
    }
}
