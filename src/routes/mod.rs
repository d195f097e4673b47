mod metrics;
pub mod usage;
pub mod user;

pub use metrics::metrics;
