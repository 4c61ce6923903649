//! Command line front end over a [`crate::core::Session`]

pub mod allowance;
pub mod setup;
pub mod show;
pub mod ui;
