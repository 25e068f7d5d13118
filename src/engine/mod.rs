pub mod builder;
pub mod classify;
pub mod cochange;
pub mod fusion;
pub mod graph;
pub mod ingest;
pub mod ownership;
pub mod risk;
