// Order Storage Simulator Library

pub mod orders;
pub mod runner;
pub mod stats;
pub mod store;
