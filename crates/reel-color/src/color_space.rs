//! Gamuts, RGB↔XYZ transforms and Y'CbCr matrices.
#![allow(clippy::excessive_precision)]

use reel_core::{ColorPrimaries, ColorRange, MatrixCoefficients};
use serde::{Deserialize, Serialize};

/// RGB gamuts a source can be mastered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gamut {
    Rec709,
    Rec2020,
    DciP3,
}

impl Gamut {
    /// Gamut for a primaries tag. BT.601 and unspecified content is
    /// handled as BT.709.
    pub fn for_primaries(primaries: ColorPrimaries) -> Self {
        match primaries {
            ColorPrimaries::Bt2020 => Self::Rec2020,
            ColorPrimaries::DisplayP3 => Self::DciP3,
            ColorPrimaries::Bt709 | ColorPrimaries::Bt601 | ColorPrimaries::Unspecified => {
                Self::Rec709
            }
        }
    }

    /// RGB-to-XYZ 3x3 matrix for this gamut.
    pub fn to_xyz_matrix(&self) -> [[f32; 3]; 3] {
        match self {
            Self::Rec709 => [
                [0.4124564, 0.3575761, 0.1804375],
                [0.2126729, 0.7151522, 0.0721750],
                [0.0193339, 0.1191920, 0.9503041],
            ],
            Self::Rec2020 => [
                [0.6369580, 0.1446169, 0.1688810],
                [0.2627002, 0.6779981, 0.0593017],
                [0.0000000, 0.0280727, 1.0609851],
            ],
            Self::DciP3 => [
                [0.4865709, 0.2656677, 0.1982173],
                [0.2289746, 0.6917385, 0.0792869],
                [0.0000000, 0.0451134, 1.0439444],
            ],
        }
    }

    /// XYZ-to-RGB 3x3 matrix for this gamut (inverse of to_xyz).
    pub fn from_xyz_matrix(&self) -> [[f32; 3]; 3] {
        match self {
            Self::Rec709 => [
                [3.2404542, -1.5371385, -0.4985314],
                [-0.9692660, 1.8760108, 0.0415560],
                [0.0556434, -0.2040259, 1.0572252],
            ],
            Self::Rec2020 => [
                [1.7166512, -0.3556708, -0.2533663],
                [-0.6666844, 1.6164812, 0.0157685],
                [0.0176399, -0.0427706, 0.9421031],
            ],
            Self::DciP3 => [
                [2.4934969, -0.9313836, -0.4027108],
                [-0.8294890, 1.7626641, 0.0236247],
                [0.0358458, -0.0761724, 0.9568845],
            ],
        }
    }

    /// Single matrix taking linear RGB in `self` to linear RGB in `to`.
    pub fn conversion_matrix(&self, to: Gamut) -> [[f32; 3]; 3] {
        if *self == to {
            return IDENTITY;
        }
        mat3_mat3(&to.from_xyz_matrix(), &self.to_xyz_matrix())
    }
}

pub(crate) const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Apply a 3x3 matrix to an RGB triplet.
#[inline]
pub(crate) fn mat3_mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn mat3_mat3(a: &[[f32; 3]; 3], b: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

/// Convert a linear RGB pixel from one gamut to another via XYZ.
pub fn convert_3x3(pixel: [f32; 3], from: Gamut, to: Gamut) -> [f32; 3] {
    if from == to {
        return pixel;
    }
    let xyz = mat3_mul(&from.to_xyz_matrix(), pixel);
    mat3_mul(&to.from_xyz_matrix(), xyz)
}

/// Y'CbCr ↔ R'G'B' conversion for one matrix, range and bit depth.
///
/// Samples are normalized code values (`code / 2^depth`), so the same
/// coefficients serve 8 and 10-bit content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YCbCrMatrix {
    kr: f32,
    kb: f32,
    luma_offset: f32,
    luma_scale: f32,
    chroma_scale: f32,
}

impl YCbCrMatrix {
    /// Build the conversion for `matrix` coefficients over `range`.
    pub fn new(matrix: MatrixCoefficients, range: ColorRange) -> Self {
        let (kr, kb) = matrix.luma_weights();
        let (luma_offset, luma_scale, chroma_scale) = if range.is_full() {
            (0.0, 1.0, 1.0)
        } else {
            (16.0 / 256.0, 219.0 / 256.0, 224.0 / 256.0)
        };
        Self {
            kr,
            kb,
            luma_offset,
            luma_scale,
            chroma_scale,
        }
    }

    /// BT.709 limited range, the output tagging of every rendition.
    pub fn bt709_limited() -> Self {
        Self::new(MatrixCoefficients::Bt709, ColorRange::Limited)
    }

    /// Normalized Y'CbCr to non-linear R'G'B' in `[0, 1]`.
    pub fn to_rgb(&self, y: f32, cb: f32, cr: f32) -> [f32; 3] {
        let y = (y - self.luma_offset) / self.luma_scale;
        let cb = (cb - 0.5) / self.chroma_scale;
        let cr = (cr - 0.5) / self.chroma_scale;
        let kg = 1.0 - self.kr - self.kb;

        let r = y + 2.0 * (1.0 - self.kr) * cr;
        let b = y + 2.0 * (1.0 - self.kb) * cb;
        let g = (y - self.kr * r - self.kb * b) / kg;
        [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]
    }

    /// Non-linear R'G'B' to normalized Y'CbCr.
    pub fn from_rgb(&self, rgb: [f32; 3]) -> [f32; 3] {
        let [r, g, b] = rgb;
        let kg = 1.0 - self.kr - self.kb;
        let y = self.kr * r + kg * g + self.kb * b;
        let cb = (b - y) / (2.0 * (1.0 - self.kb));
        let cr = (r - y) / (2.0 * (1.0 - self.kr));
        [
            self.luma_offset + y * self.luma_scale,
            0.5 + cb * self.chroma_scale,
            0.5 + cr * self.chroma_scale,
        ]
    }

    /// Normalized luma only, for the common gray path.
    #[inline]
    pub fn luma(&self, rgb: [f32; 3]) -> f32 {
        self.from_rgb(rgb)[0]
    }
}
