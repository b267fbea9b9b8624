use crate::{
    floating_type_mod::{FT, PI},
    vec2f, V2,
};

/**
 * Rigid ballast tank cross-section with prescribed horizontal sway.
 *
 * The tank bounds are fixed in the local (tank-attached) frame; the rigid
 * body translates along x following x(t) = A sin(2 pi f t). Displacement,
 * velocity and acceleration are evaluated analytically from the elapsed
 * time, never integrated.
 */
pub struct TankGeometry {
    pub width: FT,
    pub height: FT,
    pub amplitude: FT,
    pub frequency: FT,

    displacement: FT,
    velocity: FT,
    acceleration: FT,
}

impl TankGeometry {
    pub fn new(width: FT, height: FT, amplitude: FT, frequency: FT) -> Self {
        TankGeometry {
            width,
            height,
            amplitude,
            frequency,
            displacement: 0.,
            velocity: 0.,
            acceleration: 0.,
        }
    }

    pub fn min_x(&self) -> FT {
        -self.width / 2.
    }

    pub fn max_x(&self) -> FT {
        self.width / 2.
    }

    pub fn min_y(&self) -> FT {
        0.
    }

    pub fn max_y(&self) -> FT {
        self.height
    }

    /// x(t) = A sin(2 pi f t), derivatives by direct differentiation.
    pub fn update_motion(&mut self, time: FT) {
        let omega = 2. * PI * self.frequency;
        let phase = omega * time;

        self.displacement = self.amplitude * phase.sin();
        self.velocity = self.amplitude * omega * phase.cos();
        self.acceleration = -self.amplitude * omega * omega * phase.sin();
    }

    pub fn displacement(&self) -> FT {
        self.displacement
    }

    pub fn velocity(&self) -> FT {
        self.velocity
    }

    pub fn acceleration(&self) -> FT {
        self.acceleration
    }

    pub fn local_to_global(&self, local: V2) -> V2 {
        vec2f(local.x + self.displacement, local.y)
    }

    pub fn global_to_local(&self, global: V2) -> V2 {
        vec2f(global.x - self.displacement, global.y)
    }

    pub fn is_inside(&self, local: V2) -> bool {
        local.x >= self.min_x() && local.x <= self.max_x() && local.y >= self.min_y() && local.y <= self.max_y()
    }
}

#[test]
fn tank_motion_matches_analytic_derivatives() {
    let amplitude: FT = 0.02;
    let frequency: FT = 0.6;
    let mut tank = TankGeometry::new(0.3, 0.4, amplitude, frequency);

    let omega = 2. * PI * frequency;
    for i in 0..50 {
        let t = 0.07 * i as FT;
        tank.update_motion(t);

        let expected_x = amplitude * (omega * t).sin();
        let expected_v = amplitude * omega * (omega * t).cos();
        let expected_a = -amplitude * omega * omega * (omega * t).sin();

        assert!((tank.displacement() - expected_x).abs() < 1e-6);
        assert!((tank.velocity() - expected_v).abs() < 1e-5);
        assert!((tank.acceleration() - expected_a).abs() < 1e-4);
    }
}

#[test]
fn tank_coordinate_transform_roundtrip() {
    let mut tank = TankGeometry::new(0.3, 0.4, 0.02, 0.6);
    tank.update_motion(0.33);

    let local = vec2f(0.1, 0.2);
    let global = tank.local_to_global(local);
    assert!((global.x - (local.x + tank.displacement())).abs() < 1e-7);
    assert_eq!(global.y, local.y);

    let back = tank.global_to_local(global);
    assert!((back - local).norm() < 1e-6);
}

#[test]
fn tank_inside_check_uses_local_bounds() {
    let tank = TankGeometry::new(0.3, 0.4, 0.02, 0.6);
    assert!(tank.is_inside(vec2f(0., 0.2)));
    assert!(tank.is_inside(vec2f(-0.15, 0.)));
    assert!(!tank.is_inside(vec2f(0.16, 0.2)));
    assert!(!tank.is_inside(vec2f(0., -0.01)));
    assert!(!tank.is_inside(vec2f(0., 0.41)));
}
