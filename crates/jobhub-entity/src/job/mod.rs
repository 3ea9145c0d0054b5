//! Job entity: record model and state enumeration.

pub mod model;
pub mod state;

pub use model::Job;
pub use state::JobState;
