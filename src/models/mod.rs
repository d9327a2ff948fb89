// src/models/mod.rs

pub mod question;
pub mod result;
pub mod session;
pub mod user;
