mod backend;

pub use backend::{MockBackend, MockBehavior};
