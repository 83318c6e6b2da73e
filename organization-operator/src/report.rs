//! Status report of organizations and their namespaces
//!
//! Rendered either as TOML (`[summary]` plus one `[[organizations]]` table
//! per record) or as a short human readable listing.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use kube::ResourceExt;
use organization_core::Organization;
use organization_core::naming::namespace_name;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationRow {
    pub name: String,
    /// Namespace the status points at, empty until the first successful cycle
    pub status_namespace: String,
    pub namespace: String,
    pub namespace_exists: bool,
    pub finalized: bool,
    pub deleting: bool,
}

impl OrganizationRow {
    fn converged(&self) -> bool {
        self.namespace_exists && self.finalized && self.status_namespace == self.namespace
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub organizations: usize,
    pub deleting: usize,
    pub missing_namespaces: usize,
    pub forbidden: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub summary: Summary,
    pub organizations: Vec<OrganizationRow>,
}

impl StatusReport {
    /// `existing_namespaces` holds the names of every namespace in the cluster
    pub fn build(
        organizations: &[Organization],
        existing_namespaces: &BTreeSet<String>,
        finalizer: &str,
        is_forbidden: impl Fn(&str) -> bool,
    ) -> Self {
        let mut report = Self::default();
        for org in organizations {
            let name = org.name_any();
            if is_forbidden(&name) {
                report.summary.forbidden += 1;
                continue;
            }
            let namespace = namespace_name(&name);
            let row = OrganizationRow {
                status_namespace: org.status_namespace().to_string(),
                namespace_exists: existing_namespaces.contains(&namespace),
                finalized: org.has_finalizer(finalizer),
                deleting: org.is_deleting(),
                namespace,
                name,
            };
            report.summary.organizations += 1;
            if row.deleting {
                report.summary.deleting += 1;
            }
            if !row.namespace_exists && !row.deleting {
                report.summary.missing_namespaces += 1;
            }
            report.organizations.push(row);
        }
        report.organizations.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize status report")
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Organizations ({})", self.summary.organizations);
        for row in &self.organizations {
            let marker = if row.deleting {
                "🗑️"
            } else if row.converged() {
                "✅"
            } else {
                "⚠️"
            };
            let _ = write!(out, "  {marker} {} -> {}", row.name, row.namespace);
            if row.deleting {
                let _ = write!(out, " (deleting)");
            } else if !row.namespace_exists {
                let _ = write!(out, " (namespace missing)");
            } else if !row.finalized {
                let _ = write!(out, " (finalizer missing)");
            }
            out.push('\n');
        }
        if self.summary.forbidden > 0 {
            let _ = writeln!(out, "Ignored {} organization(s) with a forbidden name", self.summary.forbidden);
        }
        out
    }
}
