//! Coherent 2D noise used to vary fur length and strand pattern.
//!
//! Both kernels evaluate against the same fixed 256-entry permutation table, so
//! every texture synthesized from them is reproducible across runs.

use std::f64::consts::SQRT_2;
use ::noise::NoiseFn;
use image::{Rgba, RgbaImage};
use serde::{Serialize, Deserialize};

const PERM: [u8; 256] = [
  151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69,
  142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219,
  203, 117, 35, 11, 32, 57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
  74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122, 60, 211, 133, 230,
  220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216, 80, 73, 209, 76,
  132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173,
  186, 3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206,
  59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163,
  70, 221, 153, 101, 155, 167, 43, 172, 9, 129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232,
  178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162,
  241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184, 84, 204,
  176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141,
  128, 195, 78, 66, 215, 61, 156, 180,
];

// skew / unskew factors for the 2D simplex grid
const F2: f64 = 0.366_025_403_784_438_6;
const G2: f64 = 0.211_324_865_405_187_1;

// nearest-feature search reaches two cells out, which is exact for jitter in [0, 1)
const WORLEY_REACH: i64 = 2;

#[inline]
fn perm(i: i64) -> i64 {
  PERM[(i & 255) as usize] as i64
}

#[inline]
fn hash(i: i64, j: i64) -> i64 {
  perm(i + perm(j))
}

fn grad(hash: i64, x: f64, y: f64) -> f64 {
  let h = hash & 7;
  let (u, v) = if h < 4 { (x, y) } else { (y, x) };
  (if h & 1 != 0 { -u } else { u }) + (if h & 2 != 0 { -2.0 * v } else { 2.0 * v })
}

/// Gradient noise on a simplex lattice, C¹-continuous everywhere.
pub fn simplex(x: f64, y: f64) -> f64 {
  let s = (x + y) * F2;
  let i = (x + s).floor();
  let j = (y + s).floor();
  let t = (i + j) * G2;
  let x0 = x - (i - t);
  let y0 = y - (j - t);
  let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };
  let corners = [
    (x0, y0, 0, 0),
    (x0 - i1 as f64 + G2, y0 - j1 as f64 + G2, i1, j1),
    (x0 - 1.0 + 2.0 * G2, y0 - 1.0 + 2.0 * G2, 1, 1),
  ];
  let (i, j) = (i as i64, j as i64);
  let n: f64 = corners
    .iter()
    .map(|&(dx, dy, di, dj)| {
      let t = 0.5 - dx * dx - dy * dy;
      if t < 0.0 {
        0.0
      } else {
        let t = t * t;
        t * t * grad(hash(i + di, j + dj), dx, dy)
      }
    })
    .sum();
  (40.0 * n).clamp(-1.0, 1.0)
}

/// Cellular noise: distance to the nearest jittered lattice point, remapped so
/// points sit at -1 and the farthest possible gap at 1.
pub fn worley(x: f64, y: f64) -> f64 {
  let (cx, cy) = (x.floor() as i64, y.floor() as i64);
  let mut nearest = f64::MAX;
  for j in cy - WORLEY_REACH..=cy + WORLEY_REACH {
    for i in cx - WORLEY_REACH..=cx + WORLEY_REACH {
      let h = hash(i, j);
      let fx = i as f64 + perm(h) as f64 / 256.0;
      let fy = j as f64 + perm(h + 1) as f64 / 256.0;
      nearest = nearest.min((fx - x).powi(2) + (fy - y).powi(2));
    }
  }
  (2.0 * nearest.sqrt() / SQRT_2 - 1.0).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
  #[default]
  Simplex,
  Worley,
}

impl NoiseKind {
  pub fn next(self) -> Self {
    match self {
      Self::Simplex => Self::Worley,
      Self::Worley => Self::Simplex,
    }
  }

  /// Value handed to the shell shader so it can pick the matching strand mask.
  pub fn as_uniform(self) -> u32 {
    match self {
      Self::Simplex => 0,
      Self::Worley => 1,
    }
  }
}

/// A noise kernel selected by kind. Output is always in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseField {
  pub kind: NoiseKind,
}

impl NoiseField {
  pub fn new(kind: NoiseKind) -> Self {
    Self { kind }
  }

  pub fn sample(&self, x: f64, y: f64) -> f64 {
    match self.kind {
      NoiseKind::Simplex => simplex(x, y),
      NoiseKind::Worley => worley(x, y),
    }
  }
}

impl NoiseFn<f64, 2> for NoiseField {
  fn get(&self, point: [f64; 2]) -> f64 {
    self.sample(point[0], point[1])
  }
}

/// Fills a square gray-scale RGBA8 texture by sampling `source` at texel
/// coordinates times `scale`. Alpha is always opaque and the result tiles:
/// each texel blends the field with its copies one period left and up, so
/// column `size` would equal column 0. A zero size gives a single texel.
pub fn synthesize<N: NoiseFn<f64, 2>>(source: &N, size: u32, scale: f64) -> RgbaImage {
  let size = size.max(1);
  let period = size as f64 * scale;
  RgbaImage::from_fn(size, size, |x, y| {
    let (x, y) = (x as f64 * scale, y as f64 * scale);
    let v = if period > 0.0 {
      let (u, w) = (x / period, y / period);
      source.get([x, y]) * (1.0 - u) * (1.0 - w)
        + source.get([x - period, y]) * u * (1.0 - w)
        + source.get([x, y - period]) * (1.0 - u) * w
        + source.get([x - period, y - period]) * u * w
    } else {
      source.get([x, y])
    };
    let gray = ((v.clamp(-1.0, 1.0) + 1.0) * 0.5 * 255.0).round() as u8;
    Rgba([gray, gray, gray, 255])
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn grid() -> impl Iterator<Item = (f64, f64)> {
    (-40..40).flat_map(|i| (-40..40).map(move |j| (i as f64 * 0.173 + 0.01, j as f64 * 0.291 - 0.02)))
  }

  #[test]
  fn permutation_is_a_permutation() {
    let mut seen = [false; 256];
    for p in PERM {
      assert!(!seen[p as usize]);
      seen[p as usize] = true;
    }
  }

  #[test]
  fn kernels_stay_in_range() {
    for kind in [NoiseKind::Simplex, NoiseKind::Worley] {
      let field = NoiseField::new(kind);
      for (x, y) in grid() {
        let v = field.sample(x, y);
        assert!((-1.0..=1.0).contains(&v), "{kind:?} at ({x}, {y}) = {v}");
      }
    }
  }

  #[test]
  fn sampling_is_deterministic() {
    let a = NoiseField::new(NoiseKind::Simplex);
    let b = NoiseField::new(NoiseKind::Simplex);
    for (x, y) in grid() {
      assert_eq!(a.sample(x, y).to_bits(), b.sample(x, y).to_bits());
    }
    assert_eq!(worley(3.7, -1.2).to_bits(), worley(3.7, -1.2).to_bits());
  }

  #[test]
  fn simplex_is_continuous_across_lattice_lines() {
    let eps = 1e-4;
    for i in 0..8 {
      for y in [0.0, 0.37, 1.5, 2.25] {
        let x = i as f64;
        for (a, b) in [(x - eps, x), (x, x + eps)] {
          let d = (simplex(a, y) - simplex(b, y)).abs();
          assert!(d < 100.0 * eps, "jump of {d} near x = {x}");
        }
      }
    }
  }

  #[test]
  fn worley_is_continuous() {
    let eps = 1e-5;
    for (x, y) in grid() {
      let d = (worley(x, y) - worley(x + eps, y)).abs();
      // distance field is 1-Lipschitz before the 2/√2 remap
      assert!(d <= 2.0 / SQRT_2 * eps + 1e-12);
    }
  }

  #[test]
  fn simplex_vanishes_on_lattice_origin() {
    assert_eq!(simplex(0.0, 0.0), 0.0);
  }

  #[test]
  fn synthesized_texture_is_opaque_gray() {
    let img = synthesize(&NoiseField::new(NoiseKind::Simplex), 16, 0.125);
    assert_eq!(img.dimensions(), (16, 16));
    for p in img.pixels() {
      assert_eq!(p[0], p[1]);
      assert_eq!(p[1], p[2]);
      assert_eq!(p[3], 255);
    }
    // sample (0, 0) is exactly zero, which lands mid-gray
    assert_eq!(img.get_pixel(0, 0)[0], 128);
  }

  #[test]
  fn noise_kind_cycles() {
    assert_eq!(NoiseKind::Simplex.next(), NoiseKind::Worley);
    assert_eq!(NoiseKind::Worley.next().next(), NoiseKind::Worley);
    assert_ne!(NoiseKind::Simplex.as_uniform(), NoiseKind::Worley.as_uniform());
  }

  // mean gray difference between two columns, or two rows when `rows` is set
  fn mean_jump(img: &RgbaImage, a: u32, b: u32, rows: bool) -> f64 {
    let n = img.width();
    let total: f64 = (0..n)
      .map(|k| {
        let (p, q) = if rows {
          (img.get_pixel(k, a), img.get_pixel(k, b))
        } else {
          (img.get_pixel(a, k), img.get_pixel(b, k))
        };
        (p[0] as f64 - q[0] as f64).abs()
      })
      .sum();
    total / n as f64
  }

  #[test]
  fn synthesized_texture_tiles() {
    for kind in [NoiseKind::Simplex, NoiseKind::Worley] {
      let img = synthesize(&NoiseField::new(kind), 64, 0.125);
      let step = (0..63).map(|c| mean_jump(&img, c, c + 1, false)).sum::<f64>() / 63.0;
      let seam_x = mean_jump(&img, 63, 0, false);
      let seam_y = mean_jump(&img, 63, 0, true);
      assert!(seam_x <= 3.0 * step + 2.0, "{kind:?}: seam {seam_x} vs step {step}");
      assert!(seam_y <= 3.0 * step + 2.0, "{kind:?}: seam {seam_y} vs step {step}");
    }
  }

  #[test]
  fn zero_size_still_gives_a_texel() {
    let img = synthesize(&NoiseField::new(NoiseKind::Worley), 0, 0.125);
    assert_eq!(img.dimensions(), (1, 1));
  }
}
