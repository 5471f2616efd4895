use rand::Rng;

/// Narrow randomness seam so probabilistic decisions (heal sampling) are deterministic in
///  tests.
#[cfg_attr(test, mockall::automock)]
pub trait RandomSource: Send + Sync {
    /// Uniform draw from `0..bound`.
    fn next_uint(&self, bound: u32) -> u32;
}

pub struct ThreadRngRandom;

impl RandomSource for ThreadRngRandom {
    fn next_uint(&self, bound: u32) -> u32 {
        rand::rng().random_range(0..bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_uint_stays_in_bounds() {
        let random = ThreadRngRandom;
        for _ in 0..100 {
            assert!(random.next_uint(5) < 5);
        }
    }
}
