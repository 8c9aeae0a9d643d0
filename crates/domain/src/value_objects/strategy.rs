//! Migration strategy value objects
//!
//! `MigrationStrategy` is what the plan declares; `ExecutionMode` is what a
//! single stage actually runs. HYBRID plans resolve to one mode per stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;

/// Plan-level strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// One asynchronous bulk job per resource
    Bulk,
    /// Rate-limited batches of individual API calls
    Batch,
    /// Bulk for large stages, batch for the rest
    Hybrid,
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStrategy::Bulk => write!(f, "bulk"),
            MigrationStrategy::Batch => write!(f, "batch"),
            MigrationStrategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for MigrationStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bulk" => Ok(MigrationStrategy::Bulk),
            "batch" => Ok(MigrationStrategy::Batch),
            "hybrid" => Ok(MigrationStrategy::Hybrid),
            other => Err(DomainError::InvalidStrategy(other.to_string())),
        }
    }
}

/// User preference used for strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Speed,
    #[default]
    Balanced,
    Reliability,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Speed => write!(f, "speed"),
            Priority::Balanced => write!(f, "balanced"),
            Priority::Reliability => write!(f, "reliability"),
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "speed" => Ok(Priority::Speed),
            "balanced" => Ok(Priority::Balanced),
            "reliability" => Ok(Priority::Reliability),
            other => Err(DomainError::InvalidPriority(other.to_string())),
        }
    }
}

/// How a single stage is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Bulk,
    Batch,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Bulk => write!(f, "bulk"),
            ExecutionMode::Batch => write!(f, "batch"),
        }
    }
}
