//! Per-trial shower parameter generation.
//!
//! A ground-particle dataset fixes the shower direction, energy and size;
//! what varies per trial is where the core lands relative to the array and
//! which azimuth the shower should appear to come from. The remaining
//! samplers (zenith, energy spectrum) serve simulation variants that do
//! not take those from a dataset.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::Rng;

use crate::particles::Species;

/// Parameters of one simulated shower; immutable once generated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowerParameters {
    /// Nominal nanosecond timestamp of the trial.
    pub ext_timestamp: u64,
    /// Core position relative to the cluster origin (m).
    pub core_pos: (f64, f64),
    /// Desired shower azimuth (radians).
    pub azimuth: f64,
    pub zenith: f64,
    /// Shower size (number of electrons at the observation level).
    pub size: f64,
    /// Primary energy (eV).
    pub energy: f64,
    pub particle: Species,
}

impl ShowerParameters {
    /// Distance of the core to the cluster origin.
    pub fn core_distance(&self) -> f64 {
        (self.core_pos.0.powi(2) + self.core_pos.1.powi(2)).sqrt()
    }
}

/// How trial core positions are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorePosition {
    /// Uniform over the disc of radius `r_max` around the cluster origin.
    UniformDisc { r_max: f64 },
    /// Uniform over the circle of radius `r` (fixed core distance).
    FixedDistance { r: f64 },
}

impl CorePosition {
    pub fn sample(&self, rng: &mut StdRng) -> (f64, f64) {
        match *self {
            CorePosition::UniformDisc { r_max } => {
                // area-uniform: radius from the sqrt of a uniform draw
                let r = rng.gen_range(0.0..=r_max * r_max).sqrt();
                let phi = rng.gen_range(-PI..PI);
                (r * phi.cos(), r * phi.sin())
            }
            CorePosition::FixedDistance { r } => {
                let phi = rng.gen_range(-PI..PI);
                (r * phi.cos(), r * phi.sin())
            }
        }
    }
}

/// Random shower azimuth, uniform over the full circle.
pub fn generate_azimuth(rng: &mut StdRng) -> f64 {
    rng.gen_range(-PI..PI)
}

/// Random zenith for an isotropic flux, between `min` and `max` radians.
///
/// Uniform on the sphere means uniform in cos(zenith), not in the angle.
pub fn generate_zenith(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    let p = rng.gen_range(max.cos()..=min.cos());
    p.acos()
}

/// Random zenith from the distribution expected at the ground, where the
/// extra atmospheric path length attenuates inclined showers.
pub fn generate_attenuated_zenith(rng: &mut StdRng) -> f64 {
    inverse_zenith_probability(rng.gen())
}

/// Inverse cumulative zenith distribution including attenuation.
pub fn inverse_zenith_probability(p: f64) -> f64 {
    (1.0 - p).powf(1.0 / 8.0).acos()
}

/// Random primary energy from the cosmic-ray spectrum between `e_min` and
/// `e_max` (eV): a power law of index -2.75 below the knee at 3e15 eV,
/// steepening to -3.1 above it.
pub fn generate_energy(rng: &mut StdRng, e_min: f64, e_max: f64) -> f64 {
    const E_KNEE: f64 = 3e15;
    const ALPHA: f64 = -2.75;
    const BETA: f64 = -3.1;

    let power_law = |rng: &mut StdRng, e_min: f64, e_max: f64, index: f64| {
        let x: f64 = rng.gen();
        let a = index + 1.0;
        (e_min.powf(a) + x * (e_max.powf(a) - e_min.powf(a))).powf(1.0 / a)
    };

    let energy = power_law(rng, e_min, e_max, ALPHA);
    if energy > E_KNEE {
        power_law(rng, E_KNEE.max(e_min), e_max, BETA)
    } else {
        energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_core_positions_stay_in_disc() {
        let mut rng = StdRng::seed_from_u64(10);
        let sampler = CorePosition::UniformDisc { r_max: 400.0 };
        for _ in 0..1000 {
            let (x, y) = sampler.sample(&mut rng);
            assert!((x * x + y * y).sqrt() <= 400.0 + 1e-9);
        }
    }

    #[test]
    fn test_fixed_distance_on_circle() {
        let mut rng = StdRng::seed_from_u64(11);
        let sampler = CorePosition::FixedDistance { r: 150.0 };
        for _ in 0..100 {
            let (x, y) = sampler.sample(&mut rng);
            assert!(((x * x + y * y).sqrt() - 150.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_azimuth_range() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..1000 {
            let azimuth = generate_azimuth(&mut rng);
            assert!((-PI..PI).contains(&azimuth));
        }
    }

    #[test]
    fn test_zenith_bounds() {
        let mut rng = StdRng::seed_from_u64(13);
        let max = 63.75_f64.to_radians();
        for _ in 0..1000 {
            let zenith = generate_zenith(&mut rng, 0.0, max);
            assert!((0.0..=max + 1e-9).contains(&zenith));
        }
    }

    #[test]
    fn test_inverse_zenith_probability() {
        assert!(inverse_zenith_probability(0.0).abs() < 1e-12);
        // higher cumulative probability means a more inclined shower
        assert!(inverse_zenith_probability(0.9) > inverse_zenith_probability(0.1));
    }

    #[test]
    fn test_energy_spectrum_bounds_and_slope() {
        let mut rng = StdRng::seed_from_u64(14);
        let (e_min, e_max) = (1e13, 1e18);
        let mut below_knee = 0usize;
        for _ in 0..2000 {
            let energy = generate_energy(&mut rng, e_min, e_max);
            assert!((e_min..=e_max).contains(&energy));
            if energy < 3e15 {
                below_knee += 1;
            }
        }
        // the spectrum is steeply falling: almost everything sits at the
        // low-energy end
        assert!(below_knee > 1900);
    }

    #[test]
    fn test_core_distance() {
        let parameters = ShowerParameters {
            ext_timestamp: 0,
            core_pos: (3.0, 4.0),
            azimuth: 0.0,
            zenith: 0.0,
            size: 1e4,
            energy: 1e15,
            particle: Species::Other(14),
        };
        assert!((parameters.core_distance() - 5.0).abs() < 1e-12);
    }
}
