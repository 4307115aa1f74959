//! Matrix Fourier transforms
//!
//! Separable DFT between a square pupil of `n` samples across the pupil
//! diameter D and a square focal plane of `m` pixels sampled at `du` [λ/D].
//! Both grids are centered: pupil coordinates `(j - (n-1)/2) / n` [D],
//! focal coordinates `(k - (m-1)/2) du` [λ/D].
//! With the `du / n` normalization the transform pair conserves energy on an
//! unaliased field.

use std::f64::consts::PI;

use nalgebra::{Complex, DMatrix};

fn pupil_coordinate(j: usize, n: usize) -> f64 {
    (j as f64 - 0.5 * (n as f64 - 1.)) / n as f64
}
fn focal_coordinate(k: usize, m: usize, du: f64) -> f64 {
    (k as f64 - 0.5 * (m as f64 - 1.)) * du
}

/// Unit phasor `exp(iφ)`
fn phasor(phase: f64) -> Complex<f64> {
    let (s, c) = phase.sin_cos();
    Complex::new(c, s)
}

/// `m x n` kernel `exp(-2iπ u_k x_j)`
fn kernel(n: usize, m: usize, du: f64) -> DMatrix<Complex<f64>> {
    DMatrix::from_fn(m, n, |k, j| {
        phasor(-2. * PI * focal_coordinate(k, m, du) * pupil_coordinate(j, n))
    })
}

/// Pupil field to focal field
pub fn forward(pupil: &DMatrix<Complex<f64>>, m: usize, du: f64) -> DMatrix<Complex<f64>> {
    let n = pupil.nrows();
    let w = kernel(n, m, du);
    let norm = du / n as f64;
    (&w * pupil * w.transpose()).map(|c| c * norm)
}

/// Focal field to pupil field of `n` samples
pub fn inverse(focal: &DMatrix<Complex<f64>>, n: usize, du: f64) -> DMatrix<Complex<f64>> {
    let m = focal.nrows();
    let w = kernel(n, m, du);
    let norm = du / n as f64;
    (w.adjoint() * focal * w.conjugate()).map(|c| c * norm)
}

/// Pupil phase ramp moving the image by `(ou, ov)` [λ/D] along (x, y)
pub fn tilt(n: usize, (ou, ov): (f64, f64)) -> DMatrix<Complex<f64>> {
    DMatrix::from_fn(n, n, |i, j| {
        phasor(2. * PI * (pupil_coordinate(j, n) * ou + pupil_coordinate(i, n) * ov))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_pupil(n: usize) -> DMatrix<Complex<f64>> {
        let a = 1. / n as f64;
        DMatrix::from_element(n, n, Complex::new(a, 0.))
    }

    #[test]
    fn energy_conservation() {
        let n = 32;
        let pupil = square_pupil(n);
        // 1 λ/D sampling over the full period
        let focal = forward(&pupil, n, 1.);
        let energy: f64 = focal.iter().map(|c| c.norm_sqr()).sum();
        assert!((energy - 1.).abs() < 1e-9, "{energy}");
    }

    #[test]
    fn round_trip() {
        let n = 16;
        let pupil = DMatrix::from_fn(n, n, |i, j| Complex::new((i + 2 * j) as f64 / 100., 0.));
        let back = inverse(&forward(&pupil, n, 1.), n, 1.);
        let err = (back - &pupil)
            .iter()
            .map(|c| c.norm_sqr().sqrt())
            .fold(0f64, f64::max);
        assert!(err < 1e-9, "{err}");
    }

    #[test]
    fn tilt_moves_peak() {
        let n = 32;
        let m = 33;
        let pupil = square_pupil(n).component_mul(&tilt(n, (2., -3.)));
        let focal = forward(&pupil, m, 0.5).map(|c| c.norm_sqr());
        let (imax, _) = focal
            .iter()
            .enumerate()
            .fold((0, 0f64), |a, (i, &v)| if v > a.1 { (i, v) } else { a });
        // column-major storage, center at (16, 16)
        let (row, col) = (imax % m, imax / m);
        assert_eq!((col, row), (16 + 4, 16 - 6));
    }

    #[test]
    fn unit_phasors() {
        for phase in [0., 0.3, -1.2, PI, 7.5] {
            let p = phasor(phase);
            assert!((p.norm_sqr() - 1.).abs() < 1e-12);
            assert!((p.re - phase.cos()).abs() < 1e-12);
            assert!((p.im - phase.sin()).abs() < 1e-12);
        }
    }
}
