//! Image reconstruction: the adjoint of the spatial encoding of the forward
//! model. Off-resonance and relaxation are not part of the encoding model.

use num_complex::Complex64;
use rayon::prelude::*;
use std::f64::consts::TAU;

use crate::error::{check_shape, Error, Result};
use crate::phantom::{grid_position, Phantom};
use crate::sequence::Sequence;
use crate::simulate::Signal;

mod fft;

pub use fft::{fftshift2, ifftshift2, Ifft2dWorkspace};

/// Moments closer than this to an integer count as on the Cartesian grid.
const GRID_TOLERANCE: f64 = 1e-6;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoMode {
    /// Exact backprojection of every sample, works for any trajectory.
    Adjoint,
    /// Inverse FFT, only for Cartesian trajectories.
    Fft,
    /// FFT if possible, adjoint otherwise.
    #[default]
    Auto,
}

/// Complex image, voxel `(ix, iy)` at index `ix * ny + iy` like the phantom.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    nx: usize,
    ny: usize,
    data: Vec<Complex64>,
}

impl Image {
    pub fn zeros(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            data: vec![Complex64::new(0.0, 0.0); nx * ny],
        }
    }

    /// Wraps voxel values given in voxel index order.
    pub fn from_data(nx: usize, ny: usize, data: Vec<Complex64>) -> Result<Self> {
        check_shape("image data", nx * ny, data.len())?;
        Ok(Self { nx, ny, data })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn get(&self, ix: usize, iy: usize) -> Complex64 {
        assert!(ix < self.nx && iy < self.ny);
        self.data[ix * self.ny + iy]
    }

    pub fn magnitude(&self) -> Vec<f64> {
        self.data.iter().map(|x| x.norm()).collect()
    }

    pub fn phase(&self) -> Vec<f64> {
        self.data.iter().map(|x| x.arg()).collect()
    }

    /// Position of the voxel with the largest magnitude.
    pub fn argmax(&self) -> (usize, usize) {
        let v = self
            .data
            .iter()
            .map(|x| x.norm_sqr())
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(0, |(v, _)| v);
        (v / self.ny, v % self.ny)
    }

    /// Normalized root mean square error relative to `reference`.
    pub fn nrmse(&self, reference: &Image) -> Result<f64> {
        check_shape("image size", reference.data.len(), self.data.len())?;
        let err: f64 = self
            .data
            .iter()
            .zip(&reference.data)
            .map(|(a, b)| (a - b).norm_sqr())
            .sum();
        let norm: f64 = reference.data.iter().map(|x| x.norm_sqr()).sum();
        Ok((err / norm).sqrt())
    }

    /// Root sum of squares coil combination. The result is real valued.
    pub fn rss(images: &[Image]) -> Result<Image> {
        let first = images.first().ok_or(Error::InvalidParameter {
            name: "images",
            reason: "nothing to combine".to_owned(),
        })?;
        let mut sum = vec![0.0; first.data.len()];
        for image in images {
            check_shape("coil image size", first.data.len(), image.data.len())?;
            for (s, x) in sum.iter_mut().zip(&image.data) {
                *s += x.norm_sqr();
            }
        }
        Ok(Image {
            nx: first.nx,
            ny: first.ny,
            data: sum.into_iter().map(|s| Complex64::new(s.sqrt(), 0.0)).collect(),
        })
    }
}

impl std::ops::AddAssign<&Image> for Image {
    fn add_assign(&mut self, rhs: &Image) {
        assert_eq!(self.data.len(), rhs.data.len());
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a += b;
        }
    }
}

/// One image per repetition, so that subsets of repetitions can be combined
/// later (e.g. separate echoes or contrasts).
#[derive(Debug, Clone)]
pub struct SeparableImage {
    reps: Vec<Image>,
}

impl SeparableImage {
    pub fn n_reps(&self) -> usize {
        self.reps.len()
    }

    pub fn repetition(&self, rep: usize) -> &Image {
        &self.reps[rep]
    }

    /// Sum of the images of the given repetitions.
    pub fn combine(&self, reps: &[usize]) -> Result<Image> {
        let Some(first) = self.reps.first() else {
            return Err(Error::EmptySequence);
        };
        let mut image = Image::zeros(first.nx, first.ny);
        for &rep in reps {
            let part = self.reps.get(rep).ok_or_else(|| Error::InvalidParameter {
                name: "repetition",
                reason: format!("{rep} is out of range, have {}", self.reps.len()),
            })?;
            image += part;
        }
        Ok(image)
    }

    pub fn total(&self) -> Image {
        let mut image = Image::zeros(self.reps[0].nx, self.reps[0].ny);
        for part in &self.reps {
            image += part;
        }
        image
    }
}

/// An ADC sample together with where it sits in k-space.
#[derive(Debug, Clone, Copy)]
struct KSample {
    k: [f64; 2],
    rep: usize,
    /// Offset of coil 0 in the signal
    offset: usize,
}

pub struct Reconstructor {
    nx: usize,
    ny: usize,
}

impl Reconstructor {
    pub fn new(nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(Error::InvalidParameter {
                name: "image size",
                reason: format!("grid must not be empty, got {nx}x{ny}"),
            });
        }
        Ok(Self { nx, ny })
    }

    /// Reconstruct on the grid of the simulated phantom.
    pub fn for_phantom(phantom: &Phantom) -> Self {
        Self {
            nx: phantom.nx(),
            ny: phantom.ny(),
        }
    }

    /// One image per receive coil.
    pub fn reconstruct(&self, signal: &Signal, seq: &Sequence, mode: RecoMode) -> Result<Vec<Image>> {
        match mode {
            RecoMode::Adjoint => self.direct_adjoint(signal, seq),
            RecoMode::Fft => self.fft(signal, seq),
            RecoMode::Auto => match self.fft(signal, seq) {
                Err(Error::NonCartesian(reason)) => {
                    tracing::warn!("Falling back to the direct adjoint: {reason}");
                    self.direct_adjoint(signal, seq)
                }
                result => result,
            },
        }
    }

    pub fn direct_adjoint(&self, signal: &Signal, seq: &Sequence) -> Result<Vec<Image>> {
        let samples = self.samples(signal, seq)?;
        tracing::debug!(
            "Direct adjoint of {} samples onto {}x{} voxels",
            samples.len(),
            self.nx,
            self.ny
        );
        Ok((0..signal.n_coils())
            .map(|coil| self.backproject(signal, &samples, coil))
            .collect())
    }

    /// Per repetition images, one `SeparableImage` per coil.
    pub fn adjoint_separable(&self, signal: &Signal, seq: &Sequence) -> Result<Vec<SeparableImage>> {
        let samples = self.samples(signal, seq)?;
        let by_rep: Vec<Vec<KSample>> = (0..seq.n_reps())
            .map(|rep| samples.iter().filter(|s| s.rep == rep).copied().collect())
            .collect();

        Ok((0..signal.n_coils())
            .map(|coil| SeparableImage {
                reps: by_rep
                    .iter()
                    .map(|rep_samples| self.backproject(signal, rep_samples, coil))
                    .collect(),
            })
            .collect())
    }

    /// Same result as `direct_adjoint`, but requires every sample to sit on a
    /// distinct point of the integer k-space grid.
    pub fn fft(&self, signal: &Signal, seq: &Sequence) -> Result<Vec<Image>> {
        let samples = self.samples(signal, seq)?;
        let cells = self.cartesian_cells(&samples)?;
        tracing::debug!(
            "FFT reconstruction of {} samples onto {}x{} voxels",
            samples.len(),
            self.nx,
            self.ny
        );

        let (nx, ny) = (self.nx, self.ny);
        let mut workspace = Ifft2dWorkspace::new(nx, ny);
        let mut images = Vec::with_capacity(signal.n_coils());
        for coil in 0..signal.n_coils() {
            // Centered k-space: k = 0 at (nx / 2, ny / 2)
            let mut kspace = vec![Complex64::new(0.0, 0.0); nx * ny];
            for (sample, &cell) in samples.iter().zip(&cells) {
                kspace[cell] = signal.data()[sample.offset + coil];
            }

            let mut data = ifftshift2(&kspace, nx, ny);
            workspace.process(&mut data);
            images.push(Image {
                nx,
                ny,
                data: fftshift2(&data, nx, ny),
            });
        }
        Ok(images)
    }

    pub fn is_cartesian(&self, seq: &Sequence) -> bool {
        let kspace = seq.kspace();
        let samples: Vec<KSample> = seq
            .repetitions()
            .flatten()
            .zip(kspace)
            .filter(|(event, _)| event.adc_active)
            .map(|(_, k)| KSample { k, rep: 0, offset: 0 })
            .collect();
        self.cartesian_cells(&samples).is_ok()
    }

    fn samples(&self, signal: &Signal, seq: &Sequence) -> Result<Vec<KSample>> {
        signal.check_matches(seq)?;
        let kspace = seq.kspace();
        Ok(seq
            .timeline()
            .zip(kspace)
            .filter(|(timed, _)| timed.event.adc_active)
            .map(|(timed, k)| KSample {
                k,
                rep: timed.rep,
                offset: signal.offset(timed.index, timed.rep),
            })
            .collect())
    }

    /// Index into the centered k-space matrix for every sample.
    fn cartesian_cells(&self, samples: &[KSample]) -> Result<Vec<usize>> {
        let mut occupied = vec![false; self.nx * self.ny];
        let mut cells = Vec::with_capacity(samples.len());

        for sample in samples {
            let [kx, ky] = sample.k;
            let (rx, ry) = (kx.round(), ky.round());
            if (kx - rx).abs() > GRID_TOLERANCE || (ky - ry).abs() > GRID_TOLERANCE {
                return Err(Error::NonCartesian(format!(
                    "sample at k = ({kx:.4}, {ky:.4}) is not on the integer grid"
                )));
            }
            let cx = (rx as i64 + (self.nx / 2) as i64).rem_euclid(self.nx as i64) as usize;
            let cy = (ry as i64 + (self.ny / 2) as i64).rem_euclid(self.ny as i64) as usize;
            let cell = cx * self.ny + cy;
            if occupied[cell] {
                return Err(Error::NonCartesian(format!(
                    "more than one sample at k = ({rx}, {ry})"
                )));
            }
            occupied[cell] = true;
            cells.push(cell);
        }

        Ok(cells)
    }

    /// `image(r) = sum_k s(k) * exp(+2 pi i k r)`, the conjugate of the
    /// forward gradient encoding.
    fn backproject(&self, signal: &Signal, samples: &[KSample], coil: usize) -> Image {
        let (nx, ny) = (self.nx, self.ny);
        let data = signal.data();
        let mut image = Image::zeros(nx, ny);

        image.data.par_iter_mut().enumerate().for_each(|(v, px)| {
            let (x, y) = grid_position(nx, ny, v);
            *px = samples
                .iter()
                .map(|s| {
                    let phase = TAU * (s.k[0] * x + s.k[1] * y);
                    data[s.offset + coil] * Complex64::from_polar(1.0, phase)
                })
                .sum();
        });

        image
    }
}
