//! Domain events and their distribution.
//!
//! Events are published only after the owning unit of work has been committed,
//! so consumers never observe stock or workflow changes that were rolled back.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
