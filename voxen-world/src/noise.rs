//! Deterministic gradient-lattice noise, fractal Brownian motion over it,
//! and the seeded PRNGs the generators are built on.
//!
//! Everything here is integer-seeded and uses wrapping arithmetic only, so
//! a given `(seed, coordinate)` pair produces bit-identical results on
//! every platform. That property is load-bearing: worlds regenerate
//! missing chunks years later and the seams have to line up.

use glam::Vec3;

/// Noise behaviour flags.
pub mod noise_flags {
    /// Use the per-dimension defaults (eased 2D, non-eased 3D).
    pub const DEFAULTS: u32 = 0x01;
    /// Force eased (smoothstep) interpolation.
    pub const EASED: u32 = 0x02;
    /// Sum the absolute value of every octave.
    pub const ABSVALUE: u32 = 0x04;
    /// Accepted for parameter compatibility; bulk maps always evaluate
    /// per point, so the flag changes nothing.
    pub const POINTBUFFER: u32 = 0x08;
    /// Accepted for parameter compatibility; a simplex basis was never
    /// shipped, the gradient lattice is used regardless.
    pub const SIMPLEX: u32 = 0x10;
}

/// Raised when noise parameters cannot produce a usable lattice, e.g. when
/// the per-octave spread collapses below one node after lacunarity
/// expansion.
#[derive(thiserror::Error, Debug)]
#[error("invalid noise parameters: {0}")]
pub struct InvalidNoiseParams(pub String);

const MAGIC_X: i32 = 1619;
const MAGIC_Y: i32 = 31337;
const MAGIC_Z: i32 = 52591;
const MAGIC_SEED: i32 = 1013;

/// White lattice noise at an integer 2D point, in `[-1, 1]`.
#[must_use]
pub fn noise2d(x: i32, y: i32, seed: i32) -> f32 {
    let mut n = MAGIC_X
        .wrapping_mul(x)
        .wrapping_add(MAGIC_Y.wrapping_mul(y))
        .wrapping_add(MAGIC_SEED.wrapping_mul(seed))
        & 0x7fff_ffff;
    n = (n >> 13) ^ n;
    n = n
        .wrapping_mul(
            n.wrapping_mul(n)
                .wrapping_mul(60493)
                .wrapping_add(19_990_303),
        )
        .wrapping_add(1_376_312_589)
        & 0x7fff_ffff;
    #[expect(
        clippy::cast_precision_loss,
        reason = "the 31-bit hash is intentionally mapped onto f32"
    )]
    {
        1.0 - n as f32 / 0x4000_0000 as f32
    }
}

/// White lattice noise at an integer 3D point, in `[-1, 1]`.
#[must_use]
pub fn noise3d(x: i32, y: i32, z: i32, seed: i32) -> f32 {
    let mut n = MAGIC_X
        .wrapping_mul(x)
        .wrapping_add(MAGIC_Y.wrapping_mul(y))
        .wrapping_add(MAGIC_Z.wrapping_mul(z))
        .wrapping_add(MAGIC_SEED.wrapping_mul(seed))
        & 0x7fff_ffff;
    n = (n >> 13) ^ n;
    n = n
        .wrapping_mul(
            n.wrapping_mul(n)
                .wrapping_mul(60493)
                .wrapping_add(19_990_303),
        )
        .wrapping_add(1_376_312_589)
        & 0x7fff_ffff;
    #[expect(
        clippy::cast_precision_loss,
        reason = "the 31-bit hash is intentionally mapped onto f32"
    )]
    {
        1.0 - n as f32 / 0x4000_0000 as f32
    }
}

fn linear_interpolation(v0: f32, v1: f32, t: f32) -> f32 {
    v0 + (v1 - v0) * t
}

/// The classic quintic ease curve `6t⁵ − 15t⁴ + 10t³`.
fn ease_curve(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn interpolate(v0: f32, v1: f32, t: f32, eased: bool) -> f32 {
    if eased {
        linear_interpolation(v0, v1, ease_curve(t))
    } else {
        linear_interpolation(v0, v1, t)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "floor of a world coordinate always fits i32"
)]
fn floor_i32(value: f32) -> i32 {
    value.floor() as i32
}

/// Interpolated lattice noise at a fractional 2D point.
#[must_use]
pub fn noise2d_gradient(x: f32, y: f32, seed: i32, eased: bool) -> f32 {
    let x0 = floor_i32(x);
    let y0 = floor_i32(y);
    #[expect(clippy::cast_precision_loss, reason = "fraction is below 1")]
    let xl = x - x0 as f32;
    #[expect(clippy::cast_precision_loss, reason = "fraction is below 1")]
    let yl = y - y0 as f32;

    let v00 = noise2d(x0, y0, seed);
    let v10 = noise2d(x0.wrapping_add(1), y0, seed);
    let v01 = noise2d(x0, y0.wrapping_add(1), seed);
    let v11 = noise2d(x0.wrapping_add(1), y0.wrapping_add(1), seed);

    let u = interpolate(v00, v10, xl, eased);
    let v = interpolate(v01, v11, xl, eased);
    interpolate(u, v, yl, eased)
}

/// Interpolated lattice noise at a fractional 3D point.
#[must_use]
pub fn noise3d_gradient(x: f32, y: f32, z: f32, seed: i32, eased: bool) -> f32 {
    let x0 = floor_i32(x);
    let y0 = floor_i32(y);
    let z0 = floor_i32(z);
    #[expect(clippy::cast_precision_loss, reason = "fraction is below 1")]
    let xl = x - x0 as f32;
    #[expect(clippy::cast_precision_loss, reason = "fraction is below 1")]
    let yl = y - y0 as f32;
    #[expect(clippy::cast_precision_loss, reason = "fraction is below 1")]
    let zl = z - z0 as f32;

    let x1 = x0.wrapping_add(1);
    let y1 = y0.wrapping_add(1);
    let z1 = z0.wrapping_add(1);

    let v000 = noise3d(x0, y0, z0, seed);
    let v100 = noise3d(x1, y0, z0, seed);
    let v010 = noise3d(x0, y1, z0, seed);
    let v110 = noise3d(x1, y1, z0, seed);
    let v001 = noise3d(x0, y0, z1, seed);
    let v101 = noise3d(x1, y0, z1, seed);
    let v011 = noise3d(x0, y1, z1, seed);
    let v111 = noise3d(x1, y1, z1, seed);

    let u00 = interpolate(v000, v100, xl, eased);
    let u10 = interpolate(v010, v110, xl, eased);
    let u01 = interpolate(v001, v101, xl, eased);
    let u11 = interpolate(v011, v111, xl, eased);
    let v0 = interpolate(u00, u10, yl, eased);
    let v1 = interpolate(u01, u11, yl, eased);
    interpolate(v0, v1, zl, eased)
}

/// Parameters of one fractal noise stack.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseParams {
    /// Added to the summed octaves.
    pub offset: f32,
    /// Multiplies the summed octaves.
    pub scale: f32,
    /// Wavelength of the first octave, per axis, in nodes.
    pub spread: Vec3,
    /// Mixed into the world seed; distinguishes stacks within one mapgen.
    pub seed: i32,
    /// Number of layers to sum.
    pub octaves: u16,
    /// Amplitude decay per octave.
    pub persist: f32,
    /// Frequency multiplier per octave.
    pub lacunarity: f32,
    /// See [`noise_flags`].
    pub flags: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
            spread: Vec3::splat(250.0),
            seed: 12345,
            octaves: 3,
            persist: 0.6,
            lacunarity: 2.0,
            flags: noise_flags::DEFAULTS,
        }
    }
}

impl NoiseParams {
    /// Shorthand constructor in the order the textual form uses.
    #[must_use]
    pub fn new(
        offset: f32,
        scale: f32,
        spread: Vec3,
        seed: i32,
        octaves: u16,
        persist: f32,
        lacunarity: f32,
    ) -> Self {
        Self {
            offset,
            scale,
            spread,
            seed,
            octaves,
            persist,
            lacunarity,
            flags: noise_flags::DEFAULTS,
        }
    }

    fn eased_2d(&self) -> bool {
        // 2D noise defaults to eased; 3D defaults to plain trilinear
        self.flags & (noise_flags::DEFAULTS | noise_flags::EASED) != 0
    }

    fn eased_3d(&self) -> bool {
        self.flags & noise_flags::EASED != 0
    }

    /// Validates that every octave keeps a spread of at least one node.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] describing the collapsing octave.
    pub fn validate(&self) -> Result<(), InvalidNoiseParams> {
        if self.octaves == 0 {
            return Err(InvalidNoiseParams("octaves must be at least 1".into()));
        }
        let mut spread = self.spread;
        for octave in 0..self.octaves {
            if spread.min_element() < 1.0 {
                return Err(InvalidNoiseParams(format!(
                    "spread drops below one node at octave {octave} \
                     (base spread {base}, lacunarity {lacunarity})",
                    base = self.spread,
                    lacunarity = self.lacunarity
                )));
            }
            spread /= self.lacunarity;
        }
        Ok(())
    }

    /// Parses the textual form
    /// `offset, scale, (sx, sy, sz), seed, octaves, persist[, lacunarity]`
    /// used in `map_meta.txt`.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] on malformed input.
    pub fn parse(text: &str) -> Result<Self, InvalidNoiseParams> {
        let bad = |what: &str| InvalidNoiseParams(format!("{what} in `{text}`"));

        let (scalar_part, rest) = text
            .split_once('(')
            .ok_or_else(|| bad("missing spread group"))?;
        let (spread_part, tail) = rest
            .split_once(')')
            .ok_or_else(|| bad("unterminated spread group"))?;

        let head: Vec<&str> = scalar_part
            .split(',')
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .collect();
        let [offset, scale] = head.as_slice() else {
            return Err(bad("expected offset and scale before the spread"));
        };

        let spread: Vec<f32> = spread_part
            .split(',')
            .map(|chunk| chunk.trim().parse())
            .collect::<Result<_, _>>()
            .map_err(|_| bad("unparsable spread component"))?;
        let [sx, sy, sz] = spread.as_slice() else {
            return Err(bad("spread needs exactly three components"));
        };

        let tail: Vec<&str> = tail
            .split(',')
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .collect();
        if !(3..=4).contains(&tail.len()) {
            return Err(bad("expected seed, octaves, persistence[, lacunarity]"));
        }

        let parse_f32 = |chunk: &str| chunk.parse::<f32>().map_err(|_| bad("unparsable number"));
        Ok(Self {
            offset: parse_f32(offset)?,
            scale: parse_f32(scale)?,
            spread: Vec3::new(*sx, *sy, *sz),
            seed: tail[0].parse().map_err(|_| bad("unparsable seed"))?,
            octaves: tail[1].parse().map_err(|_| bad("unparsable octaves"))?,
            persist: parse_f32(tail[2])?,
            lacunarity: tail
                .get(3)
                .map_or(Ok(2.0), |chunk| parse_f32(chunk))?,
            flags: noise_flags::DEFAULTS,
        })
    }

    /// The textual form accepted by [`Self::parse`].
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "{}, {}, ({}, {}, {}), {}, {}, {}, {}",
            self.offset,
            self.scale,
            self.spread.x,
            self.spread.y,
            self.spread.z,
            self.seed,
            self.octaves,
            self.persist,
            self.lacunarity
        )
    }
}

fn mix_seed(world_seed: u64, np_seed: i32) -> i32 {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        reason = "seed folding is defined as wrapping"
    )]
    {
        (world_seed as i32).wrapping_add(np_seed)
    }
}

/// Fractal Brownian motion over the 2D lattice at one point.
#[must_use]
pub fn fractal2d(params: &NoiseParams, x: f32, y: f32, world_seed: u64) -> f32 {
    let mut seed = mix_seed(world_seed, params.seed);
    let eased = params.eased_2d();
    let absvalue = params.flags & noise_flags::ABSVALUE != 0;

    let mut frequency = 1.0_f32;
    let mut amplitude = 1.0_f32;
    let mut sum = 0.0_f32;
    for _ in 0..params.octaves {
        let mut octave = noise2d_gradient(
            x * frequency / params.spread.x,
            y * frequency / params.spread.y,
            seed,
            eased,
        );
        if absvalue {
            octave = octave.abs();
        }
        sum += octave * amplitude;
        frequency *= params.lacunarity;
        amplitude *= params.persist;
        seed = seed.wrapping_add(1);
    }
    params.offset + params.scale * sum
}

/// Fractal Brownian motion over the 3D lattice at one point.
#[must_use]
pub fn fractal3d(params: &NoiseParams, x: f32, y: f32, z: f32, world_seed: u64) -> f32 {
    let mut seed = mix_seed(world_seed, params.seed);
    let eased = params.eased_3d();
    let absvalue = params.flags & noise_flags::ABSVALUE != 0;

    let mut frequency = 1.0_f32;
    let mut amplitude = 1.0_f32;
    let mut sum = 0.0_f32;
    for _ in 0..params.octaves {
        let mut octave = noise3d_gradient(
            x * frequency / params.spread.x,
            y * frequency / params.spread.y,
            z * frequency / params.spread.z,
            seed,
            eased,
        );
        if absvalue {
            octave = octave.abs();
        }
        sum += octave * amplitude;
        frequency *= params.lacunarity;
        amplitude *= params.persist;
        seed = seed.wrapping_add(1);
    }
    params.offset + params.scale * sum
}

/// A noise stack bound to a buffer shaped like a VManip slice; the bulk
/// companion of [`fractal2d`]/[`fractal3d`].
pub struct Noise {
    /// The parameters this stack was built with.
    pub params: NoiseParams,
    world_seed: u64,
    size_x: usize,
    size_y: usize,
    size_z: usize,
    /// The most recently computed map, row-major `[z][y][x]` (2D maps use
    /// `y = 1`).
    pub result: Vec<f32>,
}

impl Noise {
    /// Builds a stack for `size_x × size_z` 2D maps.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] when the parameters collapse, see
    /// [`NoiseParams::validate`].
    pub fn new_2d(
        params: NoiseParams,
        world_seed: u64,
        size_x: usize,
        size_z: usize,
    ) -> Result<Self, InvalidNoiseParams> {
        params.validate()?;
        Ok(Self {
            params,
            world_seed,
            size_x,
            size_y: 1,
            size_z,
            result: vec![0.0; size_x * size_z],
        })
    }

    /// Builds a stack for `size_x × size_y × size_z` 3D maps.
    ///
    /// # Errors
    /// [`InvalidNoiseParams`] when the parameters collapse, see
    /// [`NoiseParams::validate`].
    pub fn new_3d(
        params: NoiseParams,
        world_seed: u64,
        size_x: usize,
        size_y: usize,
        size_z: usize,
    ) -> Result<Self, InvalidNoiseParams> {
        params.validate()?;
        Ok(Self {
            params,
            world_seed,
            size_x,
            size_y,
            size_z,
            result: vec![0.0; size_x * size_y * size_z],
        })
    }

    /// Fills the result buffer with the 2D map whose minimum corner sits at
    /// `(x, z)` in world coordinates, stepping one node per cell.
    pub fn perlin_map_2d(&mut self, x: f32, z: f32) -> &[f32] {
        let mut index = 0;
        for step_z in 0..self.size_z {
            for step_x in 0..self.size_x {
                #[expect(clippy::cast_precision_loss, reason = "map extents are small")]
                let value = fractal2d(
                    &self.params,
                    x + step_x as f32,
                    z + step_z as f32,
                    self.world_seed,
                );
                #[expect(
                    clippy::indexing_slicing,
                    reason = "the buffer was allocated for exactly this iteration"
                )]
                {
                    self.result[index] = value;
                }
                index += 1;
            }
        }
        &self.result
    }

    /// Fills the result buffer with the 3D map whose minimum corner sits at
    /// `(x, y, z)` in world coordinates, stepping one node per cell.
    pub fn perlin_map_3d(&mut self, x: f32, y: f32, z: f32) -> &[f32] {
        let mut index = 0;
        for step_z in 0..self.size_z {
            for step_y in 0..self.size_y {
                for step_x in 0..self.size_x {
                    #[expect(clippy::cast_precision_loss, reason = "map extents are small")]
                    let value = fractal3d(
                        &self.params,
                        x + step_x as f32,
                        y + step_y as f32,
                        z + step_z as f32,
                        self.world_seed,
                    );
                    #[expect(
                        clippy::indexing_slicing,
                        reason = "the buffer was allocated for exactly this iteration"
                    )]
                    {
                        self.result[index] = value;
                    }
                    index += 1;
                }
            }
        }
        &self.result
    }

    /// Index into the 2D result buffer.
    #[must_use]
    pub fn index_2d(&self, x: usize, z: usize) -> usize {
        z * self.size_x + x
    }

    /// Index into the 3D result buffer.
    #[must_use]
    pub fn index_3d(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.size_y + y) * self.size_x + x
    }
}

// --- PRNGs --------------------------------------------------------------

/// The classic 31-bit linear-congruential generator; 15 useful bits per
/// step. Kept for the generators whose output patterns are defined by it.
#[derive(Clone, Debug)]
pub struct PseudoRandom {
    state: u32,
}

impl PseudoRandom {
    /// Maximum value `next` can return.
    pub const RANDOM_RANGE: u32 = 32767;

    /// Seeds the generator.
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// The next 15-bit value.
    pub fn next(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12345);
        (self.state / 65536) % (Self::RANDOM_RANGE + 1)
    }

    /// A value in `min..=max`.
    ///
    /// `max` may be below `min`, in which case the two are swapped.
    pub fn range(&mut self, min: i32, max: i32) -> i32 {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let span = (max - min + 1) as u32;
        #[expect(
            clippy::cast_possible_wrap,
            reason = "next() is at most 15 bits, far from wrapping"
        )]
        {
            min + (self.next() % span) as i32
        }
    }
}

/// PCG32: full 32-bit output, 64-bit state, good statistical quality.
/// Used wherever the exact stream is not part of the world format.
#[derive(Clone, Debug)]
pub struct PcgRandom {
    state: u64,
    increment: u64,
}

impl PcgRandom {
    /// Seeds the generator with the standard PCG initialization sequence.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: 0,
            increment: (seed << 1) | 1,
        };
        rng.next();
        rng.state = rng.state.wrapping_add(seed);
        rng.next();
        rng
    }

    /// The next full-range value.
    pub fn next(&mut self) -> u32 {
        let oldstate = self.state;
        self.state = oldstate
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(self.increment);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the xorshift intentionally reduces to 32 bits"
        )]
        let xorshifted = (((oldstate >> 18) ^ oldstate) >> 27) as u32;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the rotation count is at most 31"
        )]
        let rot = (oldstate >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// An unbiased value in `0..bound` (`bound = 0` means the full range).
    pub fn range_upto(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return self.next();
        }
        // rejection sampling to remove modulo bias
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let candidate = self.next();
            if candidate >= threshold {
                return candidate % bound;
            }
        }
    }

    /// A value in `min..=max`.
    pub fn range(&mut self, min: i32, max: i32) -> i32 {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let bound = (i64::from(max) - i64::from(min) + 1) as u64;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "an i32 span always fits u32"
        )]
        let offset = self.range_upto(bound as u32);
        #[expect(
            clippy::cast_possible_wrap,
            reason = "offset is within the i32 span by construction"
        )]
        {
            min.wrapping_add(offset as i32)
        }
    }

    /// Fills a buffer with random bytes.
    pub fn bytes(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(4) {
            let word = self.next().to_le_bytes();
            let len = chunk.len();
            #[expect(
                clippy::indexing_slicing,
                reason = "chunk length is at most the word length"
            )]
            chunk.copy_from_slice(&word[..len]);
        }
    }
}

/// MurmurHash64A; derives numeric world seeds from seed strings.
#[must_use]
pub fn murmur64(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let mut hash = seed ^ (data.len() as u64).wrapping_mul(M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        hash ^= k;
        hash = hash.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0_u64;
        for (shift, byte) in tail.iter().enumerate() {
            k |= u64::from(*byte) << (8 * shift);
        }
        hash ^= k;
        hash = hash.wrapping_mul(M);
    }

    hash ^= hash >> R;
    hash = hash.wrapping_mul(M);
    hash ^ (hash >> R)
}

/// Derives the numeric world seed from a settings value: numbers pass
/// through, anything else is hashed, an empty value means "roll one".
#[must_use]
pub fn seed_from_text(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    text.parse::<u64>()
        .ok()
        .or_else(|| Some(murmur64(text.as_bytes(), 0x1337)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_noise_is_deterministic_and_bounded() {
        for seed in [0, 1, -77, 12345] {
            for x in -20..20 {
                for y in -20..20 {
                    let value = noise2d(x, y, seed);
                    assert_eq!(value, noise2d(x, y, seed), "must be pure");
                    assert!((-1.0..=1.0).contains(&value), "out of range: {value}");
                    let value3 = noise3d(x, y, x ^ y, seed);
                    assert!((-1.0..=1.0).contains(&value3));
                }
            }
        }
    }

    #[test]
    fn gradient_matches_lattice_at_integers() {
        let value = noise2d_gradient(3.0, -4.0, 42, true);
        assert!((value - noise2d(3, -4, 42)).abs() < 1e-6);
    }

    #[test]
    fn fractal_maps_match_pointwise_evaluation() {
        let params = NoiseParams::default();
        let mut noise = Noise::new_2d(params.clone(), 999, 8, 6).unwrap();
        noise.perlin_map_2d(-16.0, 32.0);
        for z in 0..6 {
            for x in 0..8 {
                #[expect(clippy::cast_precision_loss, reason = "tiny test extents")]
                let expected = fractal2d(&params, -16.0 + x as f32, 32.0 + z as f32, 999);
                assert_eq!(noise.result[noise.index_2d(x, z)], expected);
            }
        }
    }

    #[test]
    fn collapsing_spread_is_rejected() {
        let params = NoiseParams {
            spread: Vec3::splat(4.0),
            octaves: 6,
            lacunarity: 2.0,
            ..NoiseParams::default()
        };
        assert!(params.validate().is_err());
        assert!(Noise::new_3d(params, 0, 8, 8, 8).is_err());
    }

    #[test]
    fn params_text_round_trip() {
        let params = NoiseParams::new(
            4.0,
            70.0,
            Vec3::new(600.0, 600.0, 600.0),
            82341,
            5,
            0.6,
            2.0,
        );
        let reparsed = NoiseParams::parse(&params.format()).unwrap();
        assert_eq!(reparsed, params);
    }

    #[test]
    fn pseudo_random_streams_are_reproducible() {
        let mut first = PseudoRandom::new(1337);
        let mut second = PseudoRandom::new(1337);
        for _ in 0..1000 {
            let value = first.next();
            assert_eq!(value, second.next());
            assert!(value <= PseudoRandom::RANDOM_RANGE);
        }
    }

    #[test]
    fn pseudo_random_range_is_inclusive() {
        let mut rng = PseudoRandom::new(7);
        let mut seen_min = false;
        let mut seen_max = false;
        for _ in 0..10_000 {
            let value = rng.range(-3, 3);
            assert!((-3..=3).contains(&value));
            seen_min |= value == -3;
            seen_max |= value == 3;
        }
        assert!(seen_min && seen_max, "range endpoints never hit");
    }

    #[test]
    fn pcg_range_and_bytes() {
        let mut rng = PcgRandom::new(0xdead_beef);
        for _ in 0..10_000 {
            let value = rng.range(10, 20);
            assert!((10..=20).contains(&value));
        }
        let mut buf = [0_u8; 13];
        rng.bytes(&mut buf);
        assert_ne!(buf, [0_u8; 13], "13 zero bytes would be astronomically unlikely");
    }

    #[test]
    fn murmur_and_seed_derivation() {
        assert_eq!(
            murmur64(b"voxen world", 1),
            murmur64(b"voxen world", 1),
            "hash must be pure"
        );
        assert_ne!(murmur64(b"a", 0), murmur64(b"b", 0));
        assert_eq!(seed_from_text("12345"), Some(12345));
        assert_eq!(seed_from_text(""), None);
        assert_eq!(
            seed_from_text("glacier"),
            Some(murmur64(b"glacier", 0x1337))
        );
    }
}
