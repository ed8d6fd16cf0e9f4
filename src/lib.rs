//! Spectrum-based fault localization for an automated program repair loop.
//!
//! The repair engine builds a [`localizer::LocalizationTarget`], hands it to
//! [`localizer::FaultLocalizer::run`] together with a
//! [`runner::ProcessRunner`], and then asks the localizer which source
//! locations are most likely to hold the defect.

pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod localizer;
pub mod payload;
pub mod report;
pub mod runner;
pub mod spectrum;
