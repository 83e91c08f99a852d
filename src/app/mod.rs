pub mod adb;
pub mod aggregate;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod harness;
pub mod logging;
pub mod models;
pub mod mozperf;
pub mod network;
pub mod probe;
pub mod publish;
pub mod runner;
pub mod session;
pub mod version;
pub mod wait;

#[cfg(test)]
pub mod testing;
