// src/lib.rs

pub mod eventbus;
pub mod platforms;
pub mod services;
pub mod tasks;

pub use cmdbridge_common::Error;
pub use cmdbridge_common::models;
pub use cmdbridge_common::traits;
