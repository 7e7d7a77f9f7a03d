pub mod analysis;
pub mod color;
pub mod config;
pub mod data;
pub mod figure;
pub mod report;
pub mod sample;
