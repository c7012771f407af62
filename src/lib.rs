// ABOUTME: Library module for dump-migrator
// ABOUTME: Exports dump parsing, sources, destinations and the phased migration engine

pub mod commands;
pub mod config;
pub mod destination;
pub mod dump;
pub mod error;
pub mod migration;
pub mod postgres;
pub mod source;
pub mod utils;
