//! The event hub and the adaptor contract.

pub mod adaptor;
pub mod dispatcher;
pub mod queue;

pub use adaptor::{Adaptor, ChatLine, ServerScope, SharedAdaptor};
pub use dispatcher::EventHub;
