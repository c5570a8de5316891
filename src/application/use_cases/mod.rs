pub mod history_gateway;
pub mod normalizer;
pub mod relay_executor;
pub mod submit_relay;
