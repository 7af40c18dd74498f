//! Per-check assessment records produced by the verifier, retrievable even
//! when verification fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One verification checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckCategory {
    Parsing,
    TrustChain,
    IssuerSignature,
    ValueDigests,
    Validity,
    DeviceAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckStatus {
    #[default]
    Unchecked,
    Invalid,
    Valid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub category: CheckCategory,
    /// The `docType` the check applies to; None for envelope-level checks.
    pub document: Option<String>,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Metadata of a certificate seen in an `x5chain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    /// Unix timestamps of the validity bounds.
    pub not_before: i64,
    pub not_after: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentDiagnostics {
    pub doc_type: String,
    pub digest_algorithm: Option<String>,
    /// Number of digests committed in the MSO, per namespace.
    pub committed_digests: BTreeMap<String, usize>,
    /// Number of items actually disclosed, per namespace.
    pub disclosed_items: BTreeMap<String, usize>,
    /// Disclosed attributes rendered to JSON for display.
    pub disclosed_attributes: BTreeMap<String, serde_json::Value>,
    pub certificates: Vec<CertificateInfo>,
    /// "signature", "mac", or None for a bare issuer-signed document.
    pub device_auth_type: Option<String>,
}

/// Everything the verifier observed, pass or fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticInformation {
    pub checks: Vec<CheckRecord>,
    pub documents: Vec<DocumentDiagnostics>,
}

impl DiagnosticInformation {
    pub(crate) fn record(
        &mut self,
        category: CheckCategory,
        document: Option<&str>,
        status: CheckStatus,
        detail: Option<String>,
    ) {
        self.checks.push(CheckRecord {
            category,
            document: document.map(String::from),
            status,
            detail,
        });
    }

    pub fn is_success(&self) -> bool {
        self.checks
            .iter()
            .all(|check| check.status != CheckStatus::Invalid)
    }

    /// Human-readable summary of every failed check.
    pub fn failure_summary(&self) -> String {
        self.checks
            .iter()
            .filter(|check| check.status == CheckStatus::Invalid)
            .map(|check| {
                let detail = check.detail.as_deref().unwrap_or("failed");
                match &check.document {
                    Some(doc) => format!("{:?} [{doc}]: {detail}", check.category),
                    None => format!("{:?}: {detail}", check.category),
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
