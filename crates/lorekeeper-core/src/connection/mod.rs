//! Durable record of live client connections and the connect/disconnect
//! lifecycle around it.

pub mod lifecycle;
pub mod store;

pub use lifecycle::{ConnectionLifecycle, LifecycleError};
pub use store::ConnectionStore;
