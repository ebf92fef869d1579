//! HTTP handlers

pub mod health;
pub mod home;
pub mod predict;
pub mod records;
