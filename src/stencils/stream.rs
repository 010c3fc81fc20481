//! Reads `radius` past steps of one grid at the same spatial point and
//! writes their sum. There is no spatial reuse, so it measures bandwidth.

use crate::{
    frontend::{Stencil, Value},
    point,
};

const DEFAULT_RADIUS: u32 = 8;

pub fn stream(radius: Option<u32>) -> Stencil {
    let radius = radius.unwrap_or(DEFAULT_RADIUS);

    let mut stencil = Stencil::new("stream");
    let t = stencil.step_dim("t");
    let x = stencil.domain_dim("x");
    let y = stencil.domain_dim("y");
    let z = stencil.domain_dim("z");
    let data = stencil.grid("data", &[t, x, y, z]);

    let mut sum = Value::constant(1.0);
    for r in 0..i64::from(radius) {
        sum += point!(data, t - r, x, y, z);
    }

    stencil.define(point!(data, t + 1, x, y, z), sum);
    stencil.set_radius(0);
    stencil
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::counter::OpCounter;

    #[test]
    fn one_add_over_every_step() {
        let stencil = stream(Some(3));

        assert_eq!(stencil.equations().len(), 1);
        // 1.0 + data(t) + data(t-1) + data(t-2)
        assert_eq!(OpCounter::count(stencil.equation(0).rhs()), 3);
    }
}
