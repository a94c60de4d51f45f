use crate::error::{check_shape, Error, Result};

/// Default scaling of the quantile grid, keeps the outermost isochromats at
/// finite frequencies.
pub const DEFAULT_CLIP: f64 = 0.99;

/// Static off-resonance of every isochromat, `n_spins` per voxel. The offset
/// of spin `s` in voxel `v` is stored at `s * n_voxels + v`.
#[derive(Debug, Clone)]
pub struct SpinEnsemble {
    n_spins: usize,
    n_voxels: usize,
    /// Unit: `rad / s`
    omega: Vec<f64>,
}

impl SpinEnsemble {
    /// Isochromats without any frequency spread.
    pub fn on_resonance(n_spins: usize, n_voxels: usize) -> Result<Self> {
        Self::from_offsets(n_spins, n_voxels, vec![0.0; n_spins * n_voxels])
    }

    /// Deterministic ensemble whose free decay approximates `exp(-r2dash * t)`.
    /// A uniform quantile grid is mapped through the inverse CDF of a Cauchy
    /// distribution with width `r2dash`; `clip` (< 1) scales the grid so the
    /// extreme quantiles stay finite.
    pub fn cauchy(n_spins: usize, n_voxels: usize, r2dash: f64, clip: f64) -> Result<Self> {
        if !r2dash.is_finite() || r2dash < 0.0 {
            return Err(Error::InvalidParameter {
                name: "r2dash",
                reason: format!("must be finite and >= 0, got {r2dash}"),
            });
        }
        if !(0.0..1.0).contains(&clip) {
            return Err(Error::InvalidParameter {
                name: "clip",
                reason: format!("must be in [0, 1), got {clip}"),
            });
        }
        if n_spins == 1 {
            return Self::on_resonance(n_spins, n_voxels);
        }

        let per_spin: Vec<f64> = (0..n_spins)
            .map(|s| {
                let q = s as f64 / (n_spins - 1) as f64 - 0.5;
                r2dash * (std::f64::consts::PI * q * clip).tan()
            })
            .collect();
        let omega = per_spin
            .iter()
            .flat_map(|&w| std::iter::repeat(w).take(n_voxels))
            .collect();

        Self::from_offsets(n_spins, n_voxels, omega)
    }

    pub fn from_offsets(n_spins: usize, n_voxels: usize, omega: Vec<f64>) -> Result<Self> {
        if n_spins == 0 {
            return Err(Error::InvalidParameter {
                name: "n_spins",
                reason: "an ensemble needs at least one isochromat".to_owned(),
            });
        }
        check_shape("spin offsets", n_spins * n_voxels, omega.len())?;
        Ok(Self {
            n_spins,
            n_voxels,
            omega,
        })
    }

    pub fn n_spins(&self) -> usize {
        self.n_spins
    }

    pub fn n_voxels(&self) -> usize {
        self.n_voxels
    }

    /// Unit: `rad / s`
    pub fn omega(&self, spin: usize, voxel: usize) -> f64 {
        self.omega[spin * self.n_voxels + voxel]
    }
}
