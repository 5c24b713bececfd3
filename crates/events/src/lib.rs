//! Domain events and their transport.
//!
//! - [`Event`]: what aggregates emit
//! - [`EventEnvelope`]: a committed event plus stream metadata
//! - [`EventBus`]: publish/subscribe for committed envelopes

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::{EnvelopeMeta, EventEnvelope};
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
