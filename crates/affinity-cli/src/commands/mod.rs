pub mod config;
pub mod normalize;
pub mod place;
