use crate::error::{Result, StitchError};
use ndarray::{Array2, Zip};
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

type Complex64 = Complex<f64>;

/// Translation between two images and the associated registration error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftEstimate {
    /// Shift `[rows, cols]` that registers the moving image onto the reference
    pub shift: [f64; 2],
    /// Translation-invariant normalized RMS error, 0 for a perfect match
    pub error: f64,
}

/// Frequency-domain phase cross-correlation with optional sub-pixel refinement
#[derive(Debug, Clone, Copy)]
pub struct PhaseCorrelation {
    /// Images are registered to within `1 / upsample_factor` of a pixel
    pub upsample_factor: usize,
}

impl Default for PhaseCorrelation {
    fn default() -> Self {
        Self { upsample_factor: 1 }
    }
}

impl PhaseCorrelation {
    pub fn new(upsample_factor: usize) -> Self {
        Self {
            upsample_factor: upsample_factor.max(1),
        }
    }

    /// Estimate the shift of `moving` relative to `reference`.
    ///
    /// The coarse peak comes from the inverse FFT of the cross-power spectrum;
    /// with `upsample_factor > 1` it is refined by a matrix-multiply DFT over a
    /// 1.5 pixel neighbourhood of the coarse peak.
    pub fn register(&self, reference: &Array2<f32>, moving: &Array2<f32>) -> Result<ShiftEstimate> {
        if reference.dim() != moving.dim() {
            return Err(StitchError::Registration(format!(
                "images must have the same shape, got {:?} and {:?}",
                reference.dim(),
                moving.dim()
            )));
        }
        let (height, width) = reference.dim();
        if height == 0 || width == 0 {
            return Err(StitchError::Registration("cannot register empty images".to_string()));
        }
        let size = (height * width) as f64;

        let mut planner = FftPlanner::new();
        let src_freq = compute_2d_fft(&image_to_complex(reference), &mut planner, false);
        let target_freq = compute_2d_fft(&image_to_complex(moving), &mut planner, false);

        let image_product = compute_cross_power_spectrum(&src_freq, &target_freq);
        let cross_correlation = compute_2d_fft(&image_product, &mut planner, true);

        let (peak_y, peak_x) = find_correlation_peak(&cross_correlation);
        let mut shift = [
            wrap_shift(peak_y, height),
            wrap_shift(peak_x, width),
        ];

        let mut src_amp = energy(&src_freq);
        let mut target_amp = energy(&target_freq);

        let cc_max = if self.upsample_factor == 1 {
            src_amp /= size;
            target_amp /= size;
            cross_correlation[[peak_y, peak_x]]
        } else {
            let upsample = self.upsample_factor as f64;
            for s in shift.iter_mut() {
                *s = (*s * upsample).round() / upsample;
            }
            let region = (upsample * 1.5).ceil() as usize;
            let dftshift = (region as f64 / 2.0).trunc();
            let offsets = [dftshift - shift[0] * upsample, dftshift - shift[1] * upsample];

            let conj_product = image_product.mapv(|c| c.conj());
            let upsampled = upsampled_dft(&conj_product, region, upsample, offsets).mapv(|c| c.conj());

            let (max_y, max_x) = find_correlation_peak(&upsampled);
            shift[0] += (max_y as f64 - dftshift) / upsample;
            shift[1] += (max_x as f64 - dftshift) / upsample;
            upsampled[[max_y, max_x]]
        };

        // A single row or column carries no shift information along that axis
        if height == 1 {
            shift[0] = 0.0;
        }
        if width == 1 {
            shift[1] = 0.0;
        }

        Ok(ShiftEstimate {
            shift,
            error: compute_error(cc_max, src_amp, target_amp),
        })
    }
}

fn image_to_complex(img: &Array2<f32>) -> Array2<Complex64> {
    img.mapv(|v| Complex64::new(v as f64, 0.0))
}

fn compute_2d_fft(
    input: &Array2<Complex64>,
    planner: &mut FftPlanner<f64>,
    inverse: bool,
) -> Array2<Complex64> {
    let (height, width) = input.dim();
    let mut result = input.clone();

    let fft_row = if inverse {
        planner.plan_fft_inverse(width)
    } else {
        planner.plan_fft_forward(width)
    };
    for mut row in result.rows_mut() {
        let mut row_data: Vec<Complex64> = row.to_vec();
        fft_row.process(&mut row_data);
        for (i, val) in row_data.iter().enumerate() {
            row[i] = *val;
        }
    }

    let fft_col = if inverse {
        planner.plan_fft_inverse(height)
    } else {
        planner.plan_fft_forward(height)
    };
    for mut col in result.columns_mut() {
        let mut col_data: Vec<Complex64> = col.to_vec();
        fft_col.process(&mut col_data);
        for (i, val) in col_data.iter().enumerate() {
            col[i] = *val;
        }
    }

    // rustfft leaves the inverse transform unnormalized
    if inverse {
        let scale = (height * width) as f64;
        result.mapv_inplace(|c| c / scale);
    }
    result
}

fn compute_cross_power_spectrum(
    fft1: &Array2<Complex64>,
    fft2: &Array2<Complex64>,
) -> Array2<Complex64> {
    Zip::from(fft1)
        .and(fft2)
        .map_collect(|f1, f2| *f1 * f2.conj())
}

fn find_correlation_peak(correlation: &Array2<Complex64>) -> (usize, usize) {
    let mut max_val = f64::NEG_INFINITY;
    let mut peak = (0, 0);

    for ((y, x), value) in correlation.indexed_iter() {
        let magnitude = value.norm();
        if magnitude > max_val {
            max_val = magnitude;
            peak = (y, x);
        }
    }
    peak
}

/// Peaks past the midpoint correspond to negative shifts
fn wrap_shift(peak: usize, n: usize) -> f64 {
    if peak > n / 2 {
        peak as f64 - n as f64
    } else {
        peak as f64
    }
}

fn energy(freq: &Array2<Complex64>) -> f64 {
    freq.iter().map(|c| c.norm_sqr()).sum()
}

fn compute_error(cc_max: Complex64, src_amp: f64, target_amp: f64) -> f64 {
    let denom = src_amp * target_amp;
    if denom <= f64::EPSILON {
        return 1.0;
    }
    let error = 1.0 - cc_max.norm_sqr() / denom;
    error.abs().sqrt()
}

/// Sample frequencies in cycles per unit of spacing `d`
fn fftfreq(n: usize, d: f64) -> Vec<f64> {
    let positive = (n - 1) / 2 + 1;
    (0..n)
        .map(|i| {
            let k = if i < positive {
                i as f64
            } else {
                i as f64 - n as f64
            };
            k / (n as f64 * d)
        })
        .collect()
}

fn dft_kernel(n_items: usize, region: usize, upsample: f64, offset: f64) -> Array2<Complex64> {
    let freqs = fftfreq(n_items, upsample);
    Array2::from_shape_fn((region, n_items), |(i, j)| {
        let phase = -2.0 * PI * (i as f64 - offset) * freqs[j];
        Complex64::new(0.0, phase).exp()
    })
}

/// DFT of `data` evaluated on a `region x region` grid upsampled by
/// `upsample`, starting at `offsets` (in upsampled pixels)
fn upsampled_dft(
    data: &Array2<Complex64>,
    region: usize,
    upsample: f64,
    offsets: [f64; 2],
) -> Array2<Complex64> {
    let (n_rows, n_cols) = data.dim();
    let row_kernel = dft_kernel(n_rows, region, upsample, offsets[0]);
    let col_kernel = dft_kernel(n_cols, region, upsample, offsets[1]);
    row_kernel.dot(data).dot(&col_kernel.t())
}
