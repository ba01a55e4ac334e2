mod handler;
mod model;

pub use handler::{forecast, weather_proxy};
pub use model::WeatherSummary;
