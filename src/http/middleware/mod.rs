//! Request middleware.

pub mod trace_context;

pub use trace_context::{trace_context_middleware, PropagationState};
