pub mod health;
pub mod location;
pub mod nekolabs;
pub mod pangan;
pub mod weather;
