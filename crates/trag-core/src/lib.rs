pub mod config;
pub mod errors;
pub mod metadata;
pub mod model;
pub mod suite;
pub mod vcs;

pub mod engine;
pub mod report;
pub mod storage;
