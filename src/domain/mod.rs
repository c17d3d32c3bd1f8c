// Domain layer: core models and ports (interfaces). No HTTP or runtime types here.

pub mod model;
pub mod ports;
