//! Server-streaming water quality forecast.

pub mod producer;
