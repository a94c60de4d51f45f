use crate::error::{check_shape, Error, Result};

/// Tissue parameters of a single voxel.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct Voxel {
    /// Proton density, relative
    pub pd: f64,
    /// Unit: `s`
    pub t1: f64,
    /// Unit: `s`
    pub t2: f64,
    /// Off-resonance, unit: `Hz`
    pub db0: f64,
    /// Relative B1 field
    pub rb1: f64,
}

impl Voxel {
    pub fn new(pd: f64, t1: f64, t2: f64, db0: f64, rb1: f64) -> Self {
        Self {
            pd,
            t1,
            t2,
            db0,
            rb1,
        }
    }
}

/// A 2D grid of voxels. Voxel `(ix, iy)` is stored at index `ix * ny + iy`.
/// The phantom is read only during a simulation.
#[derive(Debug, Clone)]
pub struct Phantom {
    nx: usize,
    ny: usize,
    voxels: Vec<Voxel>,
}

impl Phantom {
    /// Empty phantom: every voxel has zero PD and does not contribute signal.
    pub fn new(nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(Error::InvalidParameter {
                name: "phantom size",
                reason: format!("grid must not be empty, got {nx}x{ny}"),
            });
        }
        Ok(Self {
            nx,
            ny,
            voxels: vec![Voxel::default(); nx * ny],
        })
    }

    /// Build a phantom from five parameter maps, each in voxel index order.
    pub fn from_maps(
        nx: usize,
        ny: usize,
        pd: &[f64],
        t1: &[f64],
        t2: &[f64],
        db0: &[f64],
        rb1: &[f64],
    ) -> Result<Self> {
        let mut phantom = Self::new(nx, ny)?;
        let n = phantom.voxel_count();
        check_shape("phantom PD map", n, pd.len())?;
        check_shape("phantom T1 map", n, t1.len())?;
        check_shape("phantom T2 map", n, t2.len())?;
        check_shape("phantom dB0 map", n, db0.len())?;
        check_shape("phantom rB1 map", n, rb1.len())?;

        for (v, voxel) in phantom.voxels.iter_mut().enumerate() {
            *voxel = Voxel::new(pd[v], t1[v], t2[v], db0[v], rb1[v]);
        }
        Ok(phantom)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn index(&self, ix: usize, iy: usize) -> usize {
        assert!(ix < self.nx && iy < self.ny);
        ix * self.ny + iy
    }

    pub fn get(&self, ix: usize, iy: usize) -> Voxel {
        self.voxels[self.index(ix, iy)]
    }

    pub fn set(&mut self, ix: usize, iy: usize, voxel: Voxel) {
        let v = self.index(ix, iy);
        self.voxels[v] = voxel;
    }

    /// Normalized position of voxel `v`: one unit spans the whole grid, the
    /// voxel at `(nx / 2, ny / 2)` sits at the origin.
    pub fn position(&self, v: usize) -> (f64, f64) {
        grid_position(self.nx, self.ny, v)
    }

    /// Copy with parameters that are safe to simulate: negative PD becomes 0,
    /// T1 and T2 below `cutoff` are clamped to it.
    pub fn sanitized(&self, cutoff: f64) -> Self {
        let voxels = self
            .voxels
            .iter()
            .map(|voxel| Voxel {
                pd: voxel.pd.max(0.0),
                t1: voxel.t1.max(cutoff),
                t2: voxel.t2.max(cutoff),
                ..*voxel
            })
            .collect();
        Self {
            nx: self.nx,
            ny: self.ny,
            voxels,
        }
    }
}

/// Shared by the forward and adjoint encoding so both see the same geometry.
pub(crate) fn grid_position(nx: usize, ny: usize, v: usize) -> (f64, f64) {
    let ix = v / ny;
    let iy = v % ny;
    (
        (ix as f64 - (nx / 2) as f64) / nx as f64,
        (iy as f64 - (ny / 2) as f64) / ny as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};

    #[test]
    fn positions_are_centered() {
        let phantom = Phantom::new(4, 8).unwrap();
        check!(phantom.position(phantom.index(2, 4)) == (0.0, 0.0));
        check!(phantom.position(0) == (-0.5, -0.5));
        check!(phantom.position(phantom.index(3, 7)) == (0.25, 0.375));
    }

    #[test]
    fn map_length_is_checked() {
        let ones = vec![1.0; 16];
        let short = vec![1.0; 15];
        check!(Phantom::from_maps(4, 4, &ones, &ones, &ones, &ones, &ones).is_ok());
        let_assert!(
            Err(Error::ShapeMismatch { expected, found, .. }) =
                Phantom::from_maps(4, 4, &ones, &ones, &short, &ones, &ones)
        );
        check!(expected == 16);
        check!(found == 15);
    }

    #[test]
    fn sanitize_clamps_parameters() {
        let mut phantom = Phantom::new(2, 2).unwrap();
        phantom.set(1, 0, Voxel::new(-0.5, 0.0, -1.0, 3.0, 1.0));
        let clean = phantom.sanitized(1e-12);
        let voxel = clean.get(1, 0);
        check!(voxel.pd == 0.0);
        check!(voxel.t1 == 1e-12);
        check!(voxel.t2 == 1e-12);
        check!(voxel.db0 == 3.0);
    }

    #[test]
    fn empty_grid_is_rejected() {
        check!(Phantom::new(0, 4).is_err());
    }
}
