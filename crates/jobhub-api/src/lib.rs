//! # jobhub-api
//!
//! HTTP surface for JobHub: job submission and status for producers,
//! paginated job listing for operators, and health/readiness/liveness
//! probes for external orchestration.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
