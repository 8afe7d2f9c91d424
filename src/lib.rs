pub mod catalog;
pub mod chunk;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod firms;
pub mod geofence;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod region;
