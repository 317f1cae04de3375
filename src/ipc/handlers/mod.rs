pub mod attainment;
pub mod core;
pub mod courses;
pub mod engine;
pub mod grades;
pub mod outcomes;
pub mod scores;
pub mod settings;
