use crate::floating_type_mod::{FT, PI};

/**
 * Wendland C2 kernel in 2D (compact support radius 2h, C2-continuous).
 *
 * W(r, h) = alpha * (1 - q/2)^4 * (2q + 1)   with q = r / h in [0, 2)
 *
 * The normalization alpha = 7 / (4 pi h^2) makes the kernel integrate to
 * one over its circular support.
 */
fn alpha_2d(h: FT) -> FT {
    7. / (4. * PI * h * h)
}

pub fn wendland_w(r: FT, h: FT) -> FT {
    let q = r / h;
    if q >= 2. {
        return 0.;
    }

    let factor = 1. - 0.5 * q;
    alpha_2d(h) * factor * factor * factor * factor * (2. * q + 1.)
}

/**
 * Radial derivative dW/dr. The direction (sign of r) is applied by the
 * caller through the unit vector of the pair separation.
 *
 * Closed form: -alpha / h^3 * 5q * (1 - q/2)^3. Vanishes at the center
 * (guarded below 1e-12) and outside the support.
 */
pub fn wendland_grad_w(r: FT, h: FT) -> FT {
    if r < 1e-12 {
        return 0.;
    }

    let q = r / h;
    if q >= 2. {
        return 0.;
    }

    let factor = 1. - 0.5 * q;
    -alpha_2d(h) / h * 5. * q * factor * factor * factor
}

/// Second radial derivative, used by the Morris viscosity model.
pub fn wendland_laplacian_w(r: FT, h: FT) -> FT {
    let q = r / h;
    if q >= 2. {
        return 0.;
    }

    let factor = 1. - 0.5 * q;
    let term1 = 5. * factor * factor * factor;
    let term2 = -7.5 * q * factor * factor;
    alpha_2d(h) / (h * h) * (term1 + term2)
}

#[test]
fn wendland_kernel_value_at_key_points() {
    // at r=0 the kernel takes its maximum 7/(4 pi h^2)
    for h in [0.5 as FT, 1., 5.] {
        let expected = 7. / (4. * PI * h * h);
        assert!((wendland_w(0., h) - expected).abs() < expected * 1e-5);
    }

    // zero at and beyond the support radius 2h
    assert_eq!(wendland_w(2., 1.), 0.);
    assert_eq!(wendland_w(3.7, 1.), 0.);

    // strictly positive inside the support
    assert!(wendland_w(1., 1.) > 0.);
    assert!(wendland_w(1.99, 1.) > 0.);
}

#[test]
fn wendland_grad_zero_at_center_and_outside_support() {
    assert_eq!(wendland_grad_w(0., 1.), 0.);
    assert_eq!(wendland_grad_w(2., 1.), 0.);
    assert_eq!(wendland_grad_w(5., 1.), 0.);
    assert_eq!(wendland_laplacian_w(2., 1.), 0.);

    // inward pointing (negative radial derivative) inside the support
    assert!(wendland_grad_w(0.5, 1.) < 0.);
    assert!(wendland_grad_w(1.5, 1.) < 0.);
}

#[test]
fn wendland_kernel_integration_test() {
    // midpoint quadrature of W over its square bounding box must give 1
    for h in [0.5 as FT, 1., 5.] {
        let support_radius = 2. * h;
        let grid_size = 400;
        let square_len = 2. * support_radius / grid_size as FT;
        let square_area = square_len * square_len;

        let mut integral: FT = 0.;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let px = (x as FT + 0.5) * square_len - support_radius;
                let py = (y as FT + 0.5) * square_len - support_radius;
                let r = (px * px + py * py).sqrt();
                integral += wendland_w(r, h) * square_area;
            }
        }

        println!("integration of Wendland C2 kernel with h={:.2}: {}", h, integral);
        assert!((integral - 1.).abs() < 1e-3);
    }
}

#[test]
fn wendland_grad_matches_finite_differences() {
    let h: FT = 1.;
    let diff: FT = 1e-3;

    for i in 1..20 {
        let r = 0.1 * i as FT;
        let analytical = wendland_grad_w(r, h);
        let approx = (wendland_w(r + 0.5 * diff, h) - wendland_w(r - 0.5 * diff, h)) / diff;
        assert!(
            (analytical - approx).abs() < 0.01,
            "r={}: analytical={} approx={}",
            r,
            analytical,
            approx
        );
    }
}

#[test]
fn wendland_kernel_is_symmetric_in_r() {
    let h: FT = 1.;
    for i in 0..20 {
        let r = 0.1 * i as FT;
        assert!(wendland_w(r, h) >= 0.);
        assert_eq!(wendland_w(r, h), wendland_w(r.abs(), h));
    }
}
