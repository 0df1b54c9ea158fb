// Public API - the runner module and the error type it returns
pub mod error;
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod db;
mod formats;
mod io;
mod load;
mod normalize;
mod telemetry;

#[cfg(test)]
mod integ_tests;
