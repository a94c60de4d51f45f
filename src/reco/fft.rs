//! 2D FFT helpers on row major `nx x ny` arrays (index `ix * ny + iy`).

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Caches the plans and scratch buffers of an unnormalized inverse 2D FFT.
pub struct Ifft2dWorkspace {
    nx: usize,
    ny: usize,
    ifft_x: Arc<dyn Fft<f64>>,
    ifft_y: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    column: Vec<Complex64>,
}

impl Ifft2dWorkspace {
    pub fn new(nx: usize, ny: usize) -> Self {
        let mut planner = FftPlanner::new();
        let ifft_x = planner.plan_fft(nx, FftDirection::Inverse);
        let ifft_y = planner.plan_fft(ny, FftDirection::Inverse);
        let scratch_len = ifft_x
            .get_inplace_scratch_len()
            .max(ifft_y.get_inplace_scratch_len());

        Self {
            nx,
            ny,
            ifft_x,
            ifft_y,
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            column: vec![Complex64::new(0.0, 0.0); nx],
        }
    }

    /// In-place `sum_k X[k] * exp(+2 pi i k n / N)` along both axes, without
    /// the `1 / N` normalization.
    pub fn process(&mut self, data: &mut [Complex64]) {
        let (nx, ny) = (self.nx, self.ny);
        assert_eq!(data.len(), nx * ny);

        // Rows are contiguous
        for row in data.chunks_mut(ny) {
            self.ifft_y.process_with_scratch(row, &mut self.scratch);
        }

        for iy in 0..ny {
            for ix in 0..nx {
                self.column[ix] = data[ix * ny + iy];
            }
            self.ifft_x
                .process_with_scratch(&mut self.column, &mut self.scratch);
            for ix in 0..nx {
                data[ix * ny + iy] = self.column[ix];
            }
        }
    }
}

/// Moves the zero frequency from index 0 to the center (`n / 2`) on both axes.
pub fn fftshift2(data: &[Complex64], nx: usize, ny: usize) -> Vec<Complex64> {
    roll2(data, nx, ny, nx / 2, ny / 2)
}

/// Inverse of `fftshift2`, also for odd sizes.
pub fn ifftshift2(data: &[Complex64], nx: usize, ny: usize) -> Vec<Complex64> {
    roll2(data, nx, ny, nx - nx / 2, ny - ny / 2)
}

/// `out[(ix + sx) % nx, (iy + sy) % ny] = data[ix, iy]`
fn roll2(data: &[Complex64], nx: usize, ny: usize, sx: usize, sy: usize) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); data.len()];
    for ix in 0..nx {
        let ox = (ix + sx) % nx;
        for iy in 0..ny {
            let oy = (iy + sy) % ny;
            out[ox * ny + oy] = data[ix * ny + iy];
        }
    }
    out
}
