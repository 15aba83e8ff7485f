pub mod circuit_breaker;
pub mod config;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod reddit;
pub mod render;
pub mod retry;
pub mod telemetry;
pub mod tools;
