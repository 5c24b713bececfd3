//! Infrastructure layer: event store, command dispatch, workflows, read models, config.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod workers;
pub mod workflows;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{ConfigError, Settings};
pub use services::{Gescom, ServiceError, ServiceResult, SharedEventBus, SharedEventStore};
