// AOgmaNeo host - helpers module

use serde::{Deserialize, Serialize};

// --- Constants ---

pub const LIMIT_MIN: f32 = -999999.0;
pub const LIMIT_SMALL: f32 = 0.000001;

pub const RAND_SUBSEED_OFFSET: u64 = 12345;
pub const INIT_WEIGHT_NOISEI: u32 = 8;
pub const INIT_WEIGHT_NOISEF: f32 = 0.01;

pub const SOFTPLUS_LIMIT: f32 = 4.0;

const PCG_MULTIPLIER: u64 = 6364136223846793005;
const PCG_INCREMENT: u64 = 1442695040888963407;
pub const RAND_MAX: u32 = 0x00ffffff;

// --- Type aliases ---

pub type ByteBuffer = Vec<u8>;
pub type SByteBuffer = Vec<i8>;
pub type IntBuffer = Vec<i32>;
pub type FloatBuffer = Vec<f32>;

// --- Vector types ---

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Int2 {
    pub x: i32,
    pub y: i32,
}

impl Int2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Grid coordinate or grid size: `x`, `y` address columns, `z` cells within a column.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Int3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Spatial extent `(x, y)` of this size.
    pub fn xy(self) -> Int2 {
        Int2::new(self.x, self.y)
    }

    /// Number of columns (`x * y`).
    pub fn num_columns(self) -> usize {
        (self.x * self.y) as usize
    }

    /// Number of cells (`x * y * z`).
    pub fn num_cells(self) -> usize {
        self.num_columns() * self.z as usize
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

impl Float2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// --- Math helpers ---

pub fn sigmoidf(x: f32) -> f32 {
    x.tanh() * 0.5 + 0.5
}

pub fn symlogf(x: f32) -> f32 {
    ((x > 0.0) as i32 as f32 * 2.0 - 1.0) * (x.abs() + 1.0).ln()
}

pub fn symexpf(x: f32) -> f32 {
    ((x > 0.0) as i32 as f32 * 2.0 - 1.0) * (x.abs().exp() - 1.0)
}

pub fn softplusf(x: f32) -> f32 {
    let in_range = if x < SOFTPLUS_LIMIT { 1.0f32 } else { 0.0f32 };
    (1.0 + (x * in_range).exp()).ln() * in_range + x * (1.0 - in_range)
}

pub fn ceilf_to_i32(x: f32) -> i32 {
    x.ceil() as i32
}

pub fn roundf2i(x: f32) -> i32 {
    (x + if x > 0.0 { 1.0 } else { 0.0 } - 0.5) as i32
}

pub fn roundf2b(x: f32) -> u8 {
    (x + 0.5) as u8
}

/// Collapse one cell's dendrites into a signed activation.
///
/// The first half of the dendrites inhibit, the second half excite. Each dendrite slot is
/// overwritten with the sigmoid of its scaled input (the softplus derivative used by learning).
pub fn dendrite_activation(dendrite_acts: &mut [f32], dendrite_scale: f32) -> f32 {
    let half = dendrite_acts.len() / 2;
    let activation_scale = (1.0f32 / dendrite_acts.len() as f32).sqrt();

    let mut activation = 0.0f32;

    for (di, d) in dendrite_acts.iter_mut().enumerate() {
        let act = *d * dendrite_scale;
        *d = sigmoidf(act);
        activation += softplusf(act) * dendrite_sign(di, half);
    }

    activation * activation_scale
}

#[inline]
pub fn dendrite_sign(di: usize, half: usize) -> f32 {
    if di >= half { 1.0 } else { -1.0 }
}

/// Numerically stable softmax, in place.
pub fn softmax(acts: &mut [f32]) {
    let max_activation = acts.iter().copied().fold(LIMIT_MIN, f32::max);

    let mut total = 0.0f32;
    for a in acts.iter_mut() {
        *a = (*a - max_activation).exp();
        total += *a;
    }

    let total_inv = 1.0 / LIMIT_SMALL.max(total);
    for a in acts.iter_mut() {
        *a *= total_inv;
    }
}

// --- Bounds checking ---

pub fn in_bounds0(pos: Int2, upper_bound: Int2) -> bool {
    pos.x >= 0 && pos.x < upper_bound.x && pos.y >= 0 && pos.y < upper_bound.y
}

pub fn in_bounds(pos: Int2, lower_bound: Int2, upper_bound: Int2) -> bool {
    pos.x >= lower_bound.x
        && pos.x < upper_bound.x
        && pos.y >= lower_bound.y
        && pos.y < upper_bound.y
}

// --- Projections ---

/// Map a column onto another grid through `to_scalars`, landing on the center of the
/// corresponding cell: `floor((pos + 0.5) * scalar)`.
pub fn project(pos: Int2, to_scalars: Float2) -> Int2 {
    Int2::new(
        ((pos.x as f32 + 0.5) * to_scalars.x) as i32,
        ((pos.y as f32 + 0.5) * to_scalars.y) as i32,
    )
}

/// Per-axis ratio `to / from`.
pub fn scalars(from: Int3, to: Int3) -> Float2 {
    Float2::new(to.x as f32 / from.x as f32, to.y as f32 / from.y as f32)
}

// --- Addressing (row-major) ---

pub fn address2(pos: Int2, dims: Int2) -> usize {
    (pos.y + pos.x * dims.y) as usize
}

/// Inverse of [`address2`] for a grid of size `dims`.
pub fn column_pos(index: usize, dims: Int3) -> Int2 {
    Int2::new(
        (index / dims.y as usize) as i32,
        (index % dims.y as usize) as i32,
    )
}

// --- PCG32 RNG ---

pub const fn rand_get_state(seed: u64) -> u64 {
    let state = seed.wrapping_add(PCG_INCREMENT);
    state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT)
}

#[inline]
fn rotr32(x: u32, r: u32) -> u32 {
    x >> r | x << (r.wrapping_neg() & 31)
}

/// PCG32 generator. Every engine and sampler operation draws from an explicitly passed
/// `Rng`; the process-wide instance lives in [`crate::runtime`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub const fn new(seed: u64) -> Self {
        Self {
            state: rand_get_state(seed),
        }
    }

    /// Resume from a raw state previously returned by [`Rng::state`].
    pub const fn from_state(state: u64) -> Self {
        Self { state }
    }

    pub fn state(&self) -> u64 {
        self.state
    }

    pub fn next_u32(&mut self) -> u32 {
        let x = self.state;
        let count = (x >> 59) as u32;
        self.state = x.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);
        let x = x ^ (x >> 18);
        rotr32((x >> 27) as u32, count)
    }

    /// Uniform in `[0, 1)`.
    pub fn randf(&mut self) -> f32 {
        (self.next_u32() % RAND_MAX) as f32 / RAND_MAX as f32
    }

    pub fn randf_range(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.randf()
    }

    /// Round toward zero, then away from it with probability equal to the remainder.
    pub fn round_stochastic(&mut self, x: f32) -> i32 {
        let i = x as i32;
        let abs_rem = (x - i as f32).abs();
        let s = if x > 0.0 { 1i32 } else { -1i32 };
        i + if self.randf() < abs_rem { s } else { 0 }
    }

    /// Independent per-column stream derived from a base draw.
    pub fn subseed(base: u64, index: usize) -> Self {
        Self::new(base.wrapping_add(index as u64 * RAND_SUBSEED_OFFSET))
    }
}

// --- CircleBuffer ---

#[derive(Clone, Debug)]
pub struct CircleBuffer<T> {
    pub data: Vec<T>,
    pub start: usize,
}

impl<T: Default + Clone> CircleBuffer<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            start: 0,
        }
    }

    pub fn resize(&mut self, size: usize) {
        self.data.resize(size, T::default());
    }

    pub fn push_front(&mut self) {
        if self.data.is_empty() {
            return;
        }
        if self.start == 0 {
            self.start = self.data.len() - 1;
        } else {
            self.start -= 1;
        }
    }

    pub fn get(&self, index: usize) -> &T {
        &self.data[(self.start + index) % self.data.len()]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let len = self.data.len();
        &mut self.data[(self.start + index) % len]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Default + Clone> Default for CircleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_identity_ratio() {
        let ratio = scalars(Int3::new(4, 4, 16), Int3::new(4, 4, 16));
        for x in 0..4 {
            for y in 0..4 {
                assert_eq!(project(Int2::new(x, y), ratio), Int2::new(x, y));
            }
        }
    }

    #[test]
    fn test_project_upsamples_to_cell_center() {
        // hidden 2 wide onto visible 8 wide: centers at floor(0.5*4)=2 and floor(1.5*4)=6
        let ratio = scalars(Int3::new(2, 2, 1), Int3::new(8, 8, 1));
        assert_eq!(project(Int2::new(0, 1), ratio), Int2::new(2, 6));
    }

    #[test]
    fn test_address_roundtrip() {
        let dims = Int3::new(3, 5, 2);
        for i in 0..dims.num_columns() {
            assert_eq!(address2(column_pos(i, dims), dims.xy()), i);
        }
    }

    #[test]
    fn test_rng_is_deterministic() {
        let mut a = Rng::new(7);
        let mut b = Rng::new(7);
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        let f = a.randf();
        assert!((0.0..1.0).contains(&f));
    }

    #[test]
    fn test_softmax_normalizes() {
        let mut acts = vec![1.0, 2.0, 3.0];
        softmax(&mut acts);
        let total: f32 = acts.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(acts[2] > acts[1] && acts[1] > acts[0]);
    }

    #[test]
    fn test_circle_buffer_push_front() {
        let mut buf: CircleBuffer<i32> = CircleBuffer::new();
        buf.resize(3);
        for v in 1..=4 {
            buf.push_front();
            *buf.get_mut(0) = v;
        }
        assert_eq!(*buf.get(0), 4);
        assert_eq!(*buf.get(1), 3);
        assert_eq!(*buf.get(2), 2);
    }
}
