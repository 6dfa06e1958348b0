#![doc = "libget-ci-core: core logic for the homebrew app repository CI."]

//! Pipelines behind the CI commands: the manifest diff report posted on pull
//! requests, update announcements, commit scanning and package scaffolding.
//!
//! # Navigation
//! - Manifest report: [`comment::run_manifest_report`]
//! - Announcements: [`notify::notify_updates`], [`notify::NotifyService`]
//! - Commit scan: [`commit::write_packages_in_commit`]
//! - Scaffolding: [`stage::stage_package`]
//! - Network seams: [`contract`]

pub mod announce;
pub mod cdn;
pub mod comment;
pub mod commit;
pub mod contract;
pub mod diff;
pub mod manifest;
pub mod notify;
pub mod platform;
pub mod repo;
pub mod report;
pub mod stage;
