// Domain layer: models and ports (interfaces). No I/O here.

pub mod model;
pub mod ports;
pub mod rates;
