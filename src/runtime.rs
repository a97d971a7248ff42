// AOgmaNeo host - process-wide runtime state
//
// One generator serves every facade operation that needs randomness. It starts from a
// fixed seed, can be re-seeded or restored at any time, and is only ever touched through
// the guard returned by `rng()`.

use parking_lot::{const_mutex, Mutex, MutexGuard};

use crate::helpers::Rng;

/// Seed of the generator before any call to [`set_global_state`].
pub const DEFAULT_SEED: u64 = 0;

static GLOBAL_RNG: Mutex<Rng> = const_mutex(Rng::new(DEFAULT_SEED));

/// Exclusive access to the process-wide generator. Hold it only for the duration of one
/// operation.
pub fn rng() -> MutexGuard<'static, Rng> {
    GLOBAL_RNG.lock()
}

/// Restore the generator to a raw state previously returned by [`global_state`].
pub fn set_global_state(state: u64) {
    *GLOBAL_RNG.lock() = Rng::from_state(state);
}

/// Re-seed the generator.
pub fn seed_global(seed: u64) {
    *GLOBAL_RNG.lock() = Rng::new(seed);
}

pub fn global_state() -> u64 {
    GLOBAL_RNG.lock().state()
}

/// Configure the rayon global pool. Only the first successful call takes effect; later
/// calls log a warning and leave the pool untouched.
pub fn set_num_threads(num_threads: usize) {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        Ok(()) => tracing::debug!(num_threads, "configured global thread pool"),
        Err(e) => tracing::warn!(num_threads, error = %e, "global thread pool already configured"),
    }
}

pub fn num_threads() -> usize {
    rayon::current_num_threads()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restored_state_reproduces_draws() {
        // one guard, so other tests drawing concurrently cannot interleave
        let mut r = rng();
        let state = r.state();
        let first: Vec<u32> = (0..4).map(|_| r.next_u32()).collect();

        *r = Rng::from_state(state);
        let second: Vec<u32> = (0..4).map(|_| r.next_u32()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_num_threads_is_positive() {
        assert!(num_threads() >= 1);
    }
}
