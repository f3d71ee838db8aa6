//! Courier: the driver-side engine of a last-mile delivery app.
//!
//! [`session::DriverSessionStore`] is the entry point. It owns the driver's
//! route progress, delivery completion, modal overlays, and turn-by-turn
//! navigation, and talks to the outside world only through the traits in
//! [`backend`], [`directions`], [`location`], [`analytics`], and [`modal`].

pub mod actions;
pub mod analytics;
pub mod backend;
pub mod completion;
pub mod config;
pub mod directions;
pub mod geo;
pub mod location;
pub mod modal;
pub mod model;
pub mod navigation;
pub mod progress;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;
