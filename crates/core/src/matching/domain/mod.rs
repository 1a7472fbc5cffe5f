pub mod detection;
pub mod match_engine;
pub mod roster_builder;
