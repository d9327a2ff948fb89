// src/services/mod.rs

pub mod ai;
pub mod bank;
pub mod generator;
pub mod grading;
pub mod review;
pub mod session;
pub mod submission;
