pub mod api;
pub mod artifact_store;
pub mod assemble;
pub mod bootstrap;
pub mod builder;
pub mod freshness;
pub mod manuscript_store;
pub mod model;
pub mod queue;
pub mod routes;
pub mod runner;
pub mod sentinel;
pub mod synthesize;
