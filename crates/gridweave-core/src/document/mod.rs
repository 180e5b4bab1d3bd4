//! Document session: a snapshot plus the dependency graph that tracks it.

mod io;
mod ops;
mod state;

pub use state::Document;
