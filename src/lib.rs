//! Strata: Layered Managed-Object Persistence
//!
//! A façade over a durable object store that lets callers read and mutate a
//! graph of persistent entities through short-lived, thread-confined units of
//! work ("contexts"), with all durable writes funnelled through a single
//! store coordinator.

pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod notify;
pub mod object;
pub mod stack;
pub mod store;
pub mod types;
