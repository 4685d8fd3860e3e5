//! Synthesis Controller
//!
//! Bounded generate → extract → execute retry loop with accumulating error
//! feedback.

pub mod controller;
pub mod error_classifier;

pub use controller::*;
pub use error_classifier::*;
