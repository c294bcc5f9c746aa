//! Randomness is injected rather than owned by the solver, the same way the
//! original C library left `WFC_RAND(ctx)` as a macro hook for the caller to
//! fill in — here it's a trait object instead of a context pointer.

/// Source of uniform randomness for tie-breaking and weighted collapse.
pub trait WfcRng {
    /// Returns a value uniformly distributed in `[0, 1)`.
    fn next_f32(&mut self) -> f32;
}

/// Adapts any [`rand::Rng`] into a [`WfcRng`].
pub struct RandRng<R>(pub R);

impl<R: rand::Rng> WfcRng for RandRng<R> {
    fn next_f32(&mut self) -> f32 {
        self.0.random::<f32>()
    }
}

/// Convenience constructor wrapping the thread-local RNG.
pub fn default_rng() -> RandRng<rand::rngs::ThreadRng> {
    RandRng(rand::rng())
}

/// Picks an index in `[0, len)` uniformly at random. `len` must be positive.
pub(crate) fn rand_index(rng: &mut dyn WfcRng, len: usize) -> usize {
    let draw = (rng.next_f32() * len as f32) as usize;
    draw.min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32);
    impl WfcRng for Fixed {
        fn next_f32(&mut self) -> f32 {
            self.0
        }
    }

    #[test]
    fn rand_index_stays_in_bounds_at_the_extremes() {
        let mut lo = Fixed(0.0);
        assert_eq!(rand_index(&mut lo, 5), 0);
        let mut hi = Fixed(0.999_999);
        assert_eq!(rand_index(&mut hi, 5), 4);
    }
}
