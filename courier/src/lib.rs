pub mod controller;
pub mod monitor;
