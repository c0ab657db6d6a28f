// Deterministic pseudo-random numbers for projection weights.
//
// The generator is xoshiro256** (Blackman & Vigna) with its state expanded
// from a single `u64` seed through SplitMix64. Standard-normal draws use the
// Box-Muller transform, handing out the sine half on the next
// call. The sequence for a seed is fixed on every platform: changing any
// constant here changes every index built from that seed.

/// Increment of the SplitMix64 sequence (2^64 / golden ratio).
pub const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Advances `state` and returns the next SplitMix64 output.
#[inline]
pub fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(GOLDEN_GAMMA);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct Xoshiro256StarStar {
    s: [u64; 4],
    spare: Option<f64>,
}

impl Xoshiro256StarStar {
    pub fn seed_from_u64(seed: u64) -> Self {
        let mut z = seed;
        let mut s = [0u64; 4];
        for slot in &mut s {
            *slot = splitmix64(&mut z);
        }
        Self { s, spare: None }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `0..bound`. Slightly biased for bounds that are not powers
    /// of two, which is irrelevant at the sizes used here.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        self.next_u64() % bound
    }

    /// Standard normal draw (mean 0, variance 1).
    pub fn next_normal(&mut self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }

        loop {
            let u1 = self.next_f64();
            let u2 = self.next_f64();
            if u1 > 0.0 {
                let mag = (-2.0 * u1.ln()).sqrt();
                let angle = std::f64::consts::TAU * u2;
                self.spare = Some(mag * angle.sin());
                return mag * angle.cos();
            }
        }
    }
}
