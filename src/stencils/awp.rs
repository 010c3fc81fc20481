//! Staggered grid elastic wave propagation (velocity/stress formulation)
//! with a free surface near the top of the `z` dimension.
//!
//! The surface sits two points below the last `z` index. Interior points
//! use the regular update, the surface layer uses a modified stress update
//! and the two layers above it are filled from mirrored values. The layer
//! conditions are disjoint, so each value is written exactly once per step.

use crate::{
    frontend::{Dim, Grid, Stencil, Value},
    point,
};

/// Fourth order staggered difference weights
const C1: f64 = 9.0 / 8.0;
const C2: f64 = -1.0 / 24.0;

struct Awp {
    t: Dim,
    x: Dim,
    y: Dim,
    z: Dim,
    vel_x: Grid,
    vel_y: Grid,
    vel_z: Grid,
    stress_xx: Grid,
    stress_yy: Grid,
    stress_zz: Grid,
    stress_xy: Grid,
    stress_xz: Grid,
    stress_yz: Grid,
    lambda: Grid,
    rho: Grid,
    mu: Grid,
    sponge_x: Grid,
    sponge_y: Grid,
    sponge_z: Grid,
    delta_t: Grid,
    h: Grid,
}

/// A spatial position, possibly shifted from the current point
type At = (Value, Value, Value);

fn diff(forward: Value, backward: Value, far_forward: Value, far_backward: Value) -> Value {
    C1 * (forward - backward) + C2 * (far_forward - far_backward)
}

impl Awp {
    fn declare(stencil: &mut Stencil) -> Self {
        let t = stencil.step_dim("t");
        let x = stencil.domain_dim("x");
        let y = stencil.domain_dim("y");
        let z = stencil.domain_dim("z");
        let space = [t, x, y, z];

        Self {
            t,
            x,
            y,
            z,
            vel_x: stencil.grid("vel_x", &space),
            vel_y: stencil.grid("vel_y", &space),
            vel_z: stencil.grid("vel_z", &space),
            stress_xx: stencil.grid("stress_xx", &space),
            stress_yy: stencil.grid("stress_yy", &space),
            stress_zz: stencil.grid("stress_zz", &space),
            stress_xy: stencil.grid("stress_xy", &space),
            stress_xz: stencil.grid("stress_xz", &space),
            stress_yz: stencil.grid("stress_yz", &space),
            lambda: stencil.grid("lambda", &space),
            rho: stencil.grid("rho", &space),
            mu: stencil.grid("mu", &space),
            sponge_x: stencil.grid("sponge_x", &[t, x]),
            sponge_y: stencil.grid("sponge_y", &[t, y]),
            sponge_z: stencil.grid("sponge_z", &[t, z]),
            delta_t: stencil.grid("delta_t", &[t]),
            h: stencil.grid("h", &[t]),
        }
    }

    fn here(&self) -> At {
        (self.x.value(), self.y.value(), self.z.value())
    }

    /// The surface `z` index
    fn surface(&self) -> Value {
        self.z.last_index() - 2
    }

    /// `g(t + step, x + dx, y + dy, z + dz)` relative to `at`
    fn read(&self, grid: &Grid, step: i64, at: &At, dx: i64, dy: i64, dz: i64) -> Value {
        point!(
            grid,
            self.t + step,
            at.0.clone() + dx,
            at.1.clone() + dy,
            at.2.clone() + dz
        )
    }

    fn constant(&self, grid: &Grid, at: &At, dx: i64, dy: i64, dz: i64) -> Value {
        self.read(grid, 0, at, dx, dy, dz)
    }

    fn damped(&self, value: Value, at: &At) -> Value {
        value
            * point!(self.sponge_x, self.t, at.0.clone())
            * point!(self.sponge_y, self.t, at.1.clone())
            * point!(self.sponge_z, self.t, at.2.clone())
    }

    fn dt_over_h(&self) -> Value {
        point!(self.delta_t, self.t) / point!(self.h, self.t)
    }

    fn next_vel_x(&self, at: &At) -> Value {
        let rho = (self.constant(&self.rho, at, 0, 0, 0)
            + self.constant(&self.rho, at, 0, -1, 0)
            + self.constant(&self.rho, at, 0, 0, -1)
            + self.constant(&self.rho, at, 0, -1, -1))
            * 0.25;

        let s = |grid: &Grid, dx, dy, dz| self.read(grid, 0, at, dx, dy, dz);
        let d = diff(
            s(&self.stress_xx, 0, 0, 0),
            s(&self.stress_xx, -1, 0, 0),
            s(&self.stress_xx, 1, 0, 0),
            s(&self.stress_xx, -2, 0, 0),
        ) + diff(
            s(&self.stress_xy, 0, 0, 0),
            s(&self.stress_xy, 0, -1, 0),
            s(&self.stress_xy, 0, 1, 0),
            s(&self.stress_xy, 0, -2, 0),
        ) + diff(
            s(&self.stress_xz, 0, 0, 0),
            s(&self.stress_xz, 0, 0, -1),
            s(&self.stress_xz, 0, 0, 1),
            s(&self.stress_xz, 0, 0, -2),
        );

        let next = self.read(&self.vel_x, 0, at, 0, 0, 0)
            + point!(self.delta_t, self.t) / (point!(self.h, self.t) * rho) * d;
        self.damped(next, at)
    }

    fn next_vel_y(&self, at: &At) -> Value {
        let rho = (self.constant(&self.rho, at, 0, 0, 0)
            + self.constant(&self.rho, at, 1, 0, 0)
            + self.constant(&self.rho, at, 0, 0, -1)
            + self.constant(&self.rho, at, 1, 0, -1))
            * 0.25;

        let s = |grid: &Grid, dx, dy, dz| self.read(grid, 0, at, dx, dy, dz);
        let d = diff(
            s(&self.stress_xy, 1, 0, 0),
            s(&self.stress_xy, 0, 0, 0),
            s(&self.stress_xy, 2, 0, 0),
            s(&self.stress_xy, -1, 0, 0),
        ) + diff(
            s(&self.stress_yy, 0, 1, 0),
            s(&self.stress_yy, 0, 0, 0),
            s(&self.stress_yy, 0, 2, 0),
            s(&self.stress_yy, 0, -1, 0),
        ) + diff(
            s(&self.stress_yz, 0, 0, 0),
            s(&self.stress_yz, 0, 0, -1),
            s(&self.stress_yz, 0, 0, 1),
            s(&self.stress_yz, 0, 0, -2),
        );

        let next = self.read(&self.vel_y, 0, at, 0, 0, 0)
            + point!(self.delta_t, self.t) / (point!(self.h, self.t) * rho) * d;
        self.damped(next, at)
    }

    fn next_vel_z(&self, at: &At) -> Value {
        let rho = (self.constant(&self.rho, at, 0, 0, 0)
            + self.constant(&self.rho, at, 1, 0, 0)
            + self.constant(&self.rho, at, 0, -1, 0)
            + self.constant(&self.rho, at, 1, -1, 0))
            * 0.25;

        let s = |grid: &Grid, dx, dy, dz| self.read(grid, 0, at, dx, dy, dz);
        let d = diff(
            s(&self.stress_xz, 1, 0, 0),
            s(&self.stress_xz, 0, 0, 0),
            s(&self.stress_xz, 2, 0, 0),
            s(&self.stress_xz, -1, 0, 0),
        ) + diff(
            s(&self.stress_yz, 0, 0, 0),
            s(&self.stress_yz, 0, -1, 0),
            s(&self.stress_yz, 0, 1, 0),
            s(&self.stress_yz, 0, -2, 0),
        ) + diff(
            s(&self.stress_zz, 0, 0, 1),
            s(&self.stress_zz, 0, 0, 0),
            s(&self.stress_zz, 0, 0, 2),
            s(&self.stress_zz, 0, 0, -1),
        );

        let next = self.read(&self.vel_z, 0, at, 0, 0, 0)
            + point!(self.delta_t, self.t) / (point!(self.h, self.t) * rho) * d;
        self.damped(next, at)
    }

    /// Harmonic mean of the 8 cells around a stress node
    fn average8(&self, grid: &Grid, at: &At) -> Value {
        let mut sum = self.constant(grid, at, 0, 0, 0);
        for (dx, dy, dz) in [
            (1, 0, 0),
            (0, -1, 0),
            (1, -1, 0),
            (0, 0, -1),
            (1, 0, -1),
            (0, -1, -1),
            (1, -1, -1),
        ] {
            sum += self.constant(grid, at, dx, dy, dz);
        }

        8.0 / sum
    }

    /// Velocity derivatives along each axis at `t + 1`
    fn d_x(&self, at: &At) -> Value {
        let v = |dx| self.read(&self.vel_x, 1, at, dx, 0, 0);
        diff(v(1), v(0), v(2), v(-1))
    }

    fn d_y(&self, at: &At) -> Value {
        let v = |dy| self.read(&self.vel_y, 1, at, 0, dy, 0);
        diff(v(0), v(-1), v(1), v(-2))
    }

    fn d_z(&self, at: &At) -> Value {
        let v = |dz| self.read(&self.vel_z, 1, at, 0, 0, dz);
        diff(v(0), v(-1), v(1), v(-2))
    }

    fn next_normal_stress(&self, grid: &Grid, along: Value, at: &At) -> Value {
        let divergence = self.d_x(at) + self.d_y(at) + self.d_z(at);
        let next = self.read(grid, 0, at, 0, 0, 0)
            + self.dt_over_h()
                * (2.0 * self.average8(&self.mu, at) * along
                    + self.average8(&self.lambda, at) * divergence);
        self.damped(next, at)
    }

    fn next_stress_xx(&self, at: &At) -> Value {
        self.next_normal_stress(&self.stress_xx, self.d_x(at), at)
    }

    fn next_stress_yy(&self, at: &At) -> Value {
        self.next_normal_stress(&self.stress_yy, self.d_y(at), at)
    }

    fn next_stress_zz(&self, at: &At) -> Value {
        self.next_normal_stress(&self.stress_zz, self.d_z(at), at)
    }

    /// Shear stress update from two velocity derivatives and the mean of
    /// two `mu` cells
    fn next_shear_stress(&self, grid: &Grid, mu_shift: (i64, i64, i64), derivatives: Value, at: &At) -> Value {
        let mu2 = 2.0
            / (self.constant(&self.mu, at, 0, 0, 0)
                + self.constant(&self.mu, at, mu_shift.0, mu_shift.1, mu_shift.2));
        let next = self.read(grid, 0, at, 0, 0, 0) + mu2 * self.dt_over_h() * derivatives;
        self.damped(next, at)
    }

    fn next_stress_xy(&self, at: &At) -> Value {
        let vx = |dy| self.read(&self.vel_x, 1, at, 0, dy, 0);
        let vy = |dx| self.read(&self.vel_y, 1, at, dx, 0, 0);
        let derivatives = diff(vx(1), vx(0), vx(2), vx(-1)) + diff(vy(0), vy(-1), vy(1), vy(-2));
        self.next_shear_stress(&self.stress_xy, (0, 0, -1), derivatives, at)
    }

    fn next_stress_xz(&self, at: &At) -> Value {
        let vx = |dz| self.read(&self.vel_x, 1, at, 0, 0, dz);
        let vz = |dx| self.read(&self.vel_z, 1, at, dx, 0, 0);
        let derivatives = diff(vx(1), vx(0), vx(2), vx(-1)) + diff(vz(0), vz(-1), vz(1), vz(-2));
        self.next_shear_stress(&self.stress_xz, (0, -1, 0), derivatives, at)
    }

    fn next_stress_yz(&self, at: &At) -> Value {
        let vy = |dz| self.read(&self.vel_y, 1, at, 0, 0, dz);
        let vz = |dy| self.read(&self.vel_z, 1, at, 0, dy, 0);
        let derivatives = diff(vy(1), vy(0), vy(2), vy(-1)) + diff(vz(1), vz(0), vz(2), vz(-1));
        self.next_shear_stress(&self.stress_yz, (1, 0, 0), derivatives, at)
    }

    fn write(&self, grid: &Grid) -> Value {
        point!(grid, self.t + 1, self.x, self.y, self.z)
    }

    fn define_velocity(&self, stencil: &mut Stencil) {
        let here = self.here();
        let at_or_below = self.z.less_equal(self.surface());

        stencil.define_if(self.write(&self.vel_x), self.next_vel_x(&here), at_or_below.clone());
        stencil.define_if(self.write(&self.vel_y), self.next_vel_y(&here), at_or_below.clone());
        stencil.define_if(self.write(&self.vel_z), self.next_vel_z(&here), at_or_below);

        // One layer above, the surface is at z - 1
        let surf: At = (self.x.value(), self.y.value(), self.z - 1);
        let shifted = |dx: i64, dy: i64| -> At { (self.x + dx, self.y + dy, self.z - 1) };
        let (vx, vy, vz) = (
            |at: &At| self.next_vel_x(at),
            |at: &At| self.next_vel_y(at),
            |at: &At| self.next_vel_z(at),
        );

        let d_x = vx(&shifted(1, 0)) - (vz(&shifted(1, 0)) - vz(&surf));
        let d_y = vy(&shifted(0, -1)) - (vz(&surf) - vz(&shifted(0, -1)));
        let plus1_x = vx(&surf) - (vz(&surf) - vz(&shifted(-1, 0)));
        let plus1_y = vy(&surf) - (vz(&shifted(0, 1)) - vz(&surf));
        let mu = self.constant(&self.mu, &surf, 0, 0, 0);
        let lambda = self.constant(&self.lambda, &surf, 0, 0, 0);
        let plus1_z = vz(&surf)
            - ((d_x - plus1_x.clone())
                + (vx(&shifted(1, 0)) - vx(&surf))
                + (plus1_y.clone() - d_y)
                + (vy(&surf) - vy(&shifted(0, -1))))
                / (mu.clone() * (2.0 / mu + 1.0 / lambda));

        let one_above = self.z.equal_to(self.surface() + 1);
        stencil.define_if(self.write(&self.vel_x), plus1_x, one_above.clone());
        stencil.define_if(self.write(&self.vel_y), plus1_y, one_above.clone());
        stencil.define_if(self.write(&self.vel_z), plus1_z, one_above);

        let two_above = self.z.equal_to(self.surface() + 2);
        for grid in [&self.vel_x, &self.vel_y, &self.vel_z] {
            stencil.define_if(self.write(grid), 0.0, two_above.clone());
        }
    }

    fn define_stress(&self, stencil: &mut Stencil) {
        let here = self.here();
        let below = self.z.less_than(self.surface());
        let at = self.z.equal_to(self.surface());

        stencil.define_if(self.write(&self.stress_xx), self.next_stress_xx(&here), below.clone());
        stencil.define_if(self.write(&self.stress_yy), self.next_stress_yy(&here), below.clone());
        stencil.define_if(self.write(&self.stress_xy), self.next_stress_xy(&here), below.clone());
        stencil.define_if(self.write(&self.stress_xz), self.next_stress_xz(&here), below.clone());
        stencil.define_if(self.write(&self.stress_yz), self.next_stress_yz(&here), below.clone());
        stencil.define_if(self.write(&self.stress_zz), self.next_stress_zz(&here), below);

        stencil.define_if(self.write(&self.stress_xx), self.next_stress_xx(&here), at.clone());
        stencil.define_if(self.write(&self.stress_yy), self.next_stress_yy(&here), at.clone());
        stencil.define_if(self.write(&self.stress_xy), self.next_stress_xy(&here), at.clone());
        stencil.define_if(self.write(&self.stress_xz), 0.0, at.clone());
        stencil.define_if(self.write(&self.stress_yz), 0.0, at.clone());
        stencil.define_if(self.write(&self.stress_zz), self.next_stress_zz(&here), at);

        // Mirrored about the surface
        for (above, surf) in [(1, self.z - 1), (2, self.z - 2)] {
            let condition = self.z.equal_to(self.surface() + above);
            let mirror = |depth: i64| -> At { (self.x.value(), self.y.value(), surf.clone() - depth) };

            stencil.define_if(
                self.write(&self.stress_zz),
                -self.next_stress_zz(&mirror(above - 1)),
                condition.clone(),
            );
            stencil.define_if(
                self.write(&self.stress_xz),
                -self.next_stress_xz(&mirror(above)),
                condition.clone(),
            );
            stencil.define_if(
                self.write(&self.stress_yz),
                -self.next_stress_yz(&mirror(above)),
                condition.clone(),
            );

            for grid in [&self.stress_xx, &self.stress_yy, &self.stress_xy] {
                stencil.define_if(self.write(grid), 0.0, condition.clone());
            }
        }
    }
}

pub fn awp(_radius: Option<u32>) -> Stencil {
    let mut stencil = Stencil::new("awp");
    let awp = Awp::declare(&mut stencil);

    awp.define_velocity(&mut stencil);
    awp.define_stress(&mut stencil);
    stencil.set_radius(2);
    stencil
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_layer_of_every_grid_is_defined() {
        let mut stencil = awp(None);
        stencil.validate().unwrap();

        // 3 velocity grids over 3 layers, 6 stress grids over 4 layers
        assert_eq!(stencil.equations().len(), 3 * 3 + 6 * 4);
        assert!(stencil.equations().iter().all(|eq| eq.condition().is_some()));
    }
}
