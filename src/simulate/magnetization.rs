use num_complex::Complex64;

use crate::config::Precision;
use crate::util::Rotation;

/// Isochromat state of a group of voxels, stored as flat arrays. Spin `s` of
/// local voxel `v` is at `v * n_spins + s`.
#[derive(Debug, Clone)]
pub struct Magnetization {
    n_spins: usize,
    mx: Vec<f64>,
    my: Vec<f64>,
    mz: Vec<f64>,
}

impl Magnetization {
    /// Equilibrium state `(0, 0, PD)` for every spin.
    pub fn relaxed(pd: &[f64], n_spins: usize) -> Self {
        let n = pd.len() * n_spins;
        let mut state = Self {
            n_spins,
            mx: vec![0.0; n],
            my: vec![0.0; n],
            mz: vec![0.0; n],
        };
        state.reset(pd);
        state
    }

    pub fn reset(&mut self, pd: &[f64]) {
        self.mx.fill(0.0);
        self.my.fill(0.0);
        for (mz, &pd) in self.mz.chunks_mut(self.n_spins).zip(pd) {
            mz.fill(pd);
        }
    }

    pub fn n_spins(&self) -> usize {
        self.n_spins
    }

    fn range(&self, voxel: usize) -> std::ops::Range<usize> {
        voxel * self.n_spins..(voxel + 1) * self.n_spins
    }

    pub fn get(&self, voxel: usize, spin: usize) -> [f64; 3] {
        let i = voxel * self.n_spins + spin;
        [self.mx[i], self.my[i], self.mz[i]]
    }

    /// T1 recovery towards `pd` and T2 decay over `dt`. T1 and T2 must
    /// already be clamped to positive values.
    pub fn relax(&mut self, voxel: usize, dt: f64, t1: f64, t2: f64, pd: f64) {
        if dt == 0.0 {
            return;
        }
        let e1 = (-dt / t1).exp();
        let e2 = (-dt / t2).exp();
        let range = self.range(voxel);
        for mz in &mut self.mz[range.clone()] {
            *mz = *mz * e1 + pd * (1.0 - e1);
        }
        for mx in &mut self.mx[range.clone()] {
            *mx *= e2;
        }
        for my in &mut self.my[range] {
            *my *= e2;
        }
    }

    /// Rotates the transverse magnetization of every spin by
    /// `-(phase + omega[s] * dt)`, i.e. `Mxy <- Mxy * exp(-i * phi)`.
    /// `omega` holds the static offset of every spin of this voxel.
    pub fn precess(&mut self, voxel: usize, phase: f64, omega: &[f64], dt: f64) {
        debug_assert_eq!(omega.len(), self.n_spins);
        let range = self.range(voxel);
        let mx = &mut self.mx[range.clone()];
        let my = &mut self.my[range];

        for ((mx, my), &w) in mx.iter_mut().zip(my.iter_mut()).zip(omega) {
            let (s, c) = (phase + w * dt).sin_cos();
            let x = *mx;
            let y = *my;
            *mx = x * c + y * s;
            *my = y * c - x * s;
        }
    }

    pub fn excite(&mut self, voxel: usize, rotation: &Rotation) {
        for i in self.range(voxel) {
            let [x, y, z] = rotation.apply([self.mx[i], self.my[i], self.mz[i]]);
            self.mx[i] = x;
            self.my[i] = y;
            self.mz[i] = z;
        }
    }

    /// Transverse magnetization averaged over the isochromats of a voxel.
    pub fn transverse_mean(&self, voxel: usize) -> Complex64 {
        let range = self.range(voxel);
        let x: f64 = self.mx[range.clone()].iter().sum();
        let y: f64 = self.my[range].iter().sum();
        Complex64::new(x, y) / self.n_spins as f64
    }

    /// Perfect spoiling.
    pub fn spoil(&mut self) {
        self.mx.fill(0.0);
        self.my.fill(0.0);
    }

    pub fn round(&mut self, precision: Precision) {
        if precision == Precision::Double {
            return;
        }
        for x in self.mx.iter_mut().chain(&mut self.my).chain(&mut self.mz) {
            *x = precision.round(*x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn starts_at_equilibrium() {
        let state = Magnetization::relaxed(&[1.0, 0.5], 3);
        check!(state.get(0, 2) == [0.0, 0.0, 1.0]);
        check!(state.get(1, 0) == [0.0, 0.0, 0.5]);
        check!(state.transverse_mean(0) == Complex64::new(0.0, 0.0));
    }

    #[test]
    fn zero_duration_leaves_state_unchanged() {
        let mut state = Magnetization::relaxed(&[1.0], 2);
        state.excite(0, &Rotation::new(0.7, 0.2));
        let before = state.clone();

        state.relax(0, 0.0, 1.0, 0.1, 1.0);
        state.precess(0, 0.0, &[1000.0, -1000.0], 0.0);

        for s in 0..2 {
            check!(state.get(0, s) == before.get(0, s));
        }
    }

    #[test]
    fn relaxation() {
        let mut state = Magnetization::relaxed(&[1.0], 1);
        state.excite(0, &Rotation::new(FRAC_PI_2, FRAC_PI_2));
        check!(close(state.get(0, 0), [1.0, 0.0, 0.0]));

        state.relax(0, 0.1, 1.0, 0.1, 1.0);
        let m = state.get(0, 0);
        check!((m[0] - (-1.0_f64).exp()).abs() < 1e-12);
        check!((m[2] - (1.0 - (-0.1_f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn precession_sign() {
        let mut state = Magnetization::relaxed(&[1.0], 2);
        state.excite(0, &Rotation::new(FRAC_PI_2, FRAC_PI_2));
        // Gradient phase of pi/2, spin 1 additionally gets pi/2 from its offset
        state.precess(0, FRAC_PI_2, &[0.0, PI], 0.5);
        check!(close(state.get(0, 0), [0.0, -1.0, 0.0]));
        check!(close(state.get(0, 1), [-1.0, 0.0, 0.0]));
    }

    #[test]
    fn spoiling_keeps_longitudinal() {
        let mut state = Magnetization::relaxed(&[2.0], 1);
        state.excite(0, &Rotation::new(PI / 3.0, 0.0));
        state.spoil();
        let m = state.get(0, 0);
        check!(m[0] == 0.0);
        check!(m[1] == 0.0);
        check!((m[2] - 1.0).abs() < 1e-12);
    }
}
