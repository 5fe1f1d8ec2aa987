//! Client-streaming water sample upload.

pub mod aggregator;
