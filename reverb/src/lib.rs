//! The reverb process: configuration, wiring and lifecycle.

pub mod controller;
