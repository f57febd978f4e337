//! Claims feature: upload + progress streaming

pub mod routes;

pub use routes::claims_routes;
