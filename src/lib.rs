//! OAPE job server.
//!
//! Runs tool-using model conversations that generate OpenShift operator code
//! from enhancement proposals, tracks each run as a job, and streams the
//! transcript to any number of HTTP subscribers.

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod server;
pub mod tools;
