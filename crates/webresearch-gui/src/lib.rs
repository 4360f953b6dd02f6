//! Browser front-end for the web research agent: a JSON/SSE API over a shared
//! `ResearchAgent` plus static asset serving.

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;
