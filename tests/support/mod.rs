#![allow(dead_code)]

pub mod fixtures;
pub mod stroke_env;
