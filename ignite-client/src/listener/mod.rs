//! Event types published by a session.

mod lifecycle;

pub use lifecycle::LifecycleEvent;
