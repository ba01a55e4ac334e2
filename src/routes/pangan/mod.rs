mod handler;
mod model;

pub use handler::{cities, prices, provinces};
