pub mod artifacts;
pub mod boosting;
pub mod config;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod forest;
pub mod model;
pub mod neural;
pub mod pipeline;
pub mod scaler;
pub mod schema;
pub mod store;
pub mod tree;
pub mod util;
