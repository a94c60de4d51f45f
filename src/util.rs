use std::ops::MulAssign;

/// Rotation matrix of an RF pulse: rotates by `angle` around the transverse
/// axis `(cos(phase), sin(phase), 0)`.
#[derive(Debug, Clone, Copy)]
pub struct Rotation([[f64; 3]; 3]);

impl Rotation {
    pub fn new(angle: f64, phase: f64) -> Self {
        let (sa, ca) = angle.sin_cos();
        let (sp, cp) = phase.sin_cos();
        Self([
            [ca * sp * sp + cp * cp, (1.0 - ca) * sp * cp, sa * sp],
            [(1.0 - ca) * sp * cp, ca * cp * cp + sp * sp, -sa * cp],
            [-sa * sp, sa * cp, ca],
        ])
    }

    #[inline]
    pub fn apply(&self, m: [f64; 3]) -> [f64; 3] {
        let r = &self.0;
        [
            r[0][0] * m[0] + r[0][1] * m[1] + r[0][2] * m[2],
            r[1][0] * m[0] + r[1][1] * m[1] + r[1][2] * m[2],
            r[2][0] * m[0] + r[2][1] * m[1] + r[2][2] * m[2],
        ]
    }
}

/// Probe spin used to collapse a shaped RF pulse into a single rotation: it
/// starts relaxed, all pulse samples are applied, and the flip angle and
/// phase are read back.
pub struct Spin([f64; 3]);

impl Spin {
    pub fn relaxed() -> Self {
        Self([0.0, 0.0, 1.0])
    }

    pub fn angle(&self) -> f64 {
        // Normalize because error can build up during rotations
        (self.0[2] / self.norm()).clamp(-1.0, 1.0).acos()
    }

    pub fn phase(&self) -> f64 {
        // Phase of the applied rotation, not of the spin itself
        let tmp = f64::atan2(self.0[1], self.0[0]) + std::f64::consts::FRAC_PI_2;
        tmp.rem_euclid(std::f64::consts::TAU)
    }

    fn norm(&self) -> f64 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1] + self.0[2] * self.0[2]).sqrt()
    }
}

impl MulAssign<Rotation> for Spin {
    fn mul_assign(&mut self, rhs: Rotation) {
        self.0 = rhs.apply(self.0);
    }
}

/// Wrap a phase into `[-pi, pi)`.
pub fn wrap_phase(phase: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    (phase + PI).rem_euclid(TAU) - PI
}
