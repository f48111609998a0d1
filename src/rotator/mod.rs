pub mod rotator_impl;

pub use rotator_impl::{LogRotator, RotatorImpl};
