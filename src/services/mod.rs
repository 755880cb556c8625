pub mod classifiers;
pub mod encoder;
pub mod pipeline;
pub mod recommendations;

pub use recommendations::{Recommender, RecommenderSettings};
