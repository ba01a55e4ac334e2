mod handler;
mod model;

pub use handler::locate;
pub use model::{GeoFeature, Provider, QuotaExhaustedResponse};
