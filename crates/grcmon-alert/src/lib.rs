//! Alert evaluation for failing compliance test results.
//!
//! [`matcher`] decides whether a tenant rule applies to a `(test, result)`
//! pair, [`template`] renders alert titles, and [`generator::AlertGenerator`]
//! walks a tenant's rules in priority order and raises at most one alert per
//! result.

pub mod generator;
pub mod matcher;
pub mod template;

#[cfg(test)]
mod tests;

pub use generator::AlertGenerator;
pub use matcher::matches;
pub use template::render_title;
