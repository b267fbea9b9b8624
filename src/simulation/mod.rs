pub mod concurrency;
pub mod coupling;
pub mod dem;
pub mod integrator;
pub mod measurements;
pub mod neighborhood_search;
pub mod simulation;
pub mod simulation_parameters;
pub mod sph;
pub mod sph_kernels;
pub mod tank;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::PI;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::PI;
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V2 = SVector<FT, 2>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

/// Unit vector along `v`, or zero for degenerate lengths (< 1e-12).
pub fn normalized_or_zero(v: V2) -> V2 {
    let len = v.norm();
    if len < 1e-12 {
        V2::zeros()
    } else {
        v / len
    }
}

pub use simulation::*;
pub use simulation_parameters::*;

#[test]
fn normalized_or_zero_handles_degenerate_vectors() {
    assert_eq!(normalized_or_zero(V2::zeros()), V2::zeros());
    assert_eq!(normalized_or_zero(vec2f(0., 1e-14)), V2::zeros());

    let n = normalized_or_zero(vec2f(3., 4.));
    assert!((n.norm() - 1.).abs() < 1e-6);
    assert!((n.x - 0.6).abs() < 1e-6);
    assert!((n.y - 0.8).abs() < 1e-6);
}
