// Kernel services built on the process table
pub mod process_service;

mod exit;
mod fork;
mod wait;
