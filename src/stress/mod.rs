//! Command handlers for run, validate and preset.

pub mod logging;
pub mod run;

pub use logging::{mask_secret, mask_target};
pub use run::{run_preset, run_stress, run_validate};
