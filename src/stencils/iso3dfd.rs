//! Isotropic acoustic wave equation, second order in time, with a star
//! shaped spatial Laplacian of configurable radius.

use crate::{frontend::Stencil, point};

const DEFAULT_RADIUS: u32 = 8;

/// Central difference weights of the second derivative, `[c0, c1, ..]`
/// for a stencil reaching `radius` points each way
pub fn second_derivative_weights(radius: u32) -> Vec<f64> {
    let m = f64::from(radius);
    let mut weights = vec![0.0];

    // c_k = 2 (-1)^(k+1) (m!)^2 / (k^2 (m-k)! (m+k)!)
    for k in 1..=radius {
        let ratio: f64 = (1..=k)
            .map(f64::from)
            .map(|j| (m - j + 1.0) / (m + j))
            .product();

        let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
        let k = f64::from(k);
        weights.push(2.0 * sign * ratio / (k * k));
    }

    weights[0] = -2.0 * weights[1..].iter().sum::<f64>();
    weights
}

pub fn iso3dfd(radius: Option<u32>) -> Stencil {
    let radius = radius.unwrap_or(DEFAULT_RADIUS).max(1);

    let mut stencil = Stencil::new("iso3dfd");
    let t = stencil.step_dim("t");
    let x = stencil.domain_dim("x");
    let y = stencil.domain_dim("y");
    let z = stencil.domain_dim("z");
    let pressure = stencil.grid("pressure", &[t, x, y, z]);
    let vel = stencil.grid("vel", &[t, x, y, z]);

    let weights = second_derivative_weights(radius);
    let mut laplacian = weights[0] * 3.0 * point!(pressure, t, x, y, z);

    for (r, weight) in (1..).zip(&weights[1..]) {
        let star = point!(pressure, t, x - r, y, z)
            + point!(pressure, t, x + r, y, z)
            + point!(pressure, t, x, y - r, z)
            + point!(pressure, t, x, y + r, z)
            + point!(pressure, t, x, y, z - r)
            + point!(pressure, t, x, y, z + r);
        laplacian += *weight * star;
    }

    let next = 2.0 * point!(pressure, t, x, y, z) - point!(pressure, t - 1, x, y, z)
        + point!(vel, t, x, y, z) * laplacian;

    stencil.define(point!(pressure, t + 1, x, y, z), next);
    stencil.set_radius(radius);
    stencil
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frontend::ast::visit::Visitor, middle::counter::PointCounter};

    #[test]
    fn weights_sum_to_zero() {
        let weights = second_derivative_weights(2);

        assert!((weights[1] - 4.0 / 3.0).abs() < 1e-12);
        assert!((weights[2] + 1.0 / 12.0).abs() < 1e-12);
        assert!((weights[0] + 5.0 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn star_reads_every_axis() {
        let stencil = iso3dfd(Some(2));
        let mut counter = PointCounter::new();
        counter.visit_expression(&stencil.equation(0).expr);

        // centre, 2 * 3 * radius neighbours, previous step and velocity
        assert_eq!(counter.reads.len(), 1 + 12 + 1 + 1);
        assert_eq!(stencil.radius(), Some(2));
    }
}
