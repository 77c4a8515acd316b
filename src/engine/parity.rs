//! Capability parity between the Direct and Remote backends.
//!
//! The Direct backend implements every facade operation. The Remote
//! backend consults this table before any network activity; operations
//! outside it fail with `Unsupported` without a round trip. The table is
//! the only place the gap is declared: it can be narrowed for services
//! that lack an endpoint, or widened for services that provide one.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Facade operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// Run a container health check.
    HealthCheckRun,
    /// Auto-update units.
    AutoUpdate,
    /// Subscribe to events.
    Events,
    /// Update network DNS.
    NetworkUpdate,
    /// Pull an artifact.
    ArtifactPull,
    /// Remove image tags.
    ImageUntag,
    /// Engine information.
    Info,
    /// Show trust policy.
    ShowTrust,
    /// Set trust policy.
    SetTrust,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Operation; 9] = [
        Self::HealthCheckRun,
        Self::AutoUpdate,
        Self::Events,
        Self::NetworkUpdate,
        Self::ArtifactPull,
        Self::ImageUntag,
        Self::Info,
        Self::ShowTrust,
        Self::SetTrust,
    ];

    /// Operation name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HealthCheckRun => "healthcheck run",
            Self::AutoUpdate => "auto-update",
            Self::Events => "events",
            Self::NetworkUpdate => "network update",
            Self::ArtifactPull => "artifact pull",
            Self::ImageUntag => "image untag",
            Self::Info => "info",
            Self::ShowTrust => "trust show",
            Self::SetTrust => "trust set",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operations a backend implements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    supported: BTreeSet<Operation>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::remote()
    }
}

impl CapabilityTable {
    /// All operations.
    pub fn all() -> Self {
        Self {
            supported: Operation::ALL.into_iter().collect(),
        }
    }

    /// Remote backend table: everything except auto-update and trust.
    pub fn remote() -> Self {
        Self::all()
            .without(Operation::AutoUpdate)
            .without(Operation::ShowTrust)
            .without(Operation::SetTrust)
    }

    /// Adds an operation, for services that expose its endpoint.
    #[must_use]
    pub fn with(mut self, op: Operation) -> Self {
        self.supported.insert(op);
        self
    }

    /// Removes an operation.
    #[must_use]
    pub fn without(mut self, op: Operation) -> Self {
        self.supported.remove(&op);
        self
    }

    /// Returns true if the operation is implemented.
    pub fn supports(&self, op: Operation) -> bool {
        self.supported.contains(&op)
    }

    /// Fails with `Unsupported` for operations outside the table.
    pub fn ensure(&self, op: Operation) -> Result<()> {
        if self.supports(op) {
            Ok(())
        } else {
            Err(Error::unsupported(op.name()))
        }
    }

    /// Operations outside the table.
    pub fn unsupported(&self) -> Vec<Operation> {
        Operation::ALL
            .into_iter()
            .filter(|op| !self.supports(*op))
            .collect()
    }
}
