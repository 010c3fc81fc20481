//! Stencils that ship with the compiler.

use std::sync::Once;

use log::error;

use crate::frontend::registry::{STENCIL_REGISTRY, StencilFactory};

pub mod awp;
pub mod iso3dfd;
pub mod stream;

const BUILTIN: [(&str, StencilFactory); 3] = [
    ("awp", awp::awp),
    ("iso3dfd", iso3dfd::iso3dfd),
    ("stream", stream::stream),
];

static REGISTER: Once = Once::new();

/// Adds the built-in stencils to the global registry. Safe to call more
/// than once.
pub fn register_all() {
    REGISTER.call_once(|| {
        for (name, factory) in BUILTIN {
            if let Err(e) = STENCIL_REGISTRY.register(name, factory) {
                error!("{e}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_stencils_are_well_formed() {
        register_all();
        register_all();

        for name in ["awp", "iso3dfd", "stream"] {
            let stencil = STENCIL_REGISTRY.build(name, None).unwrap();
            assert_eq!(stencil.name(), name);
            stencil.validate().unwrap();
        }
    }
}
