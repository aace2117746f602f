mod predict;
mod signature;

pub use predict::{run_predict, PredictArgs};
pub use signature::run_signature;
