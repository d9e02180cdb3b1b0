// Domain layer: records, datasets, metric results and the ports the pipeline talks through.

pub mod metric;
pub mod model;
pub mod ports;
