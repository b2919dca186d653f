//! # marquee-daemon — Scrolling Display Daemon
//!
//! Subscribes to a remote bitmap feed, prepares each message for the
//! serpentine LED strip, and scrolls it on the panel forever, switching
//! to the newest message as soon as it arrives.
//!
//! ## Sinks
//!
//! - **udp**: one datagram per frame to a panel controller.
//! - **log**: dry run, frames are traced and dropped.

pub mod config;
pub mod sink;
