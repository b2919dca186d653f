//! # render — the scroll scheduler
//!
//! | Module      | Purpose                                          |
//! |-------------|--------------------------------------------------|
//! | `state`     | Pure `Idle` / `Displaying` state machine          |
//! | `scheduler` | Async driver: handoff + continuation → frames     |
//! | `sink`      | `FrameSink` trait implemented by display drivers  |

pub mod scheduler;
pub mod sink;
pub mod state;

pub use scheduler::RenderScheduler;
pub use sink::FrameSink;
pub use state::{DisplayPhase, RenderEvent, RenderState};
