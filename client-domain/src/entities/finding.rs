// Finding entity
// A single discovered issue reported by a scan job

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub capability: String,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub affected_assets: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub discovered_at: i64,
    #[serde(default)]
    pub risk_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_deserializes_with_sparse_payload() {
        let finding: Finding = serde_json::from_str(
            r#"{"id":"f1","capability":"dark_web","severity":"high","title":"Leaked credential","discovered_at":1700000000000}"#,
        )
        .expect("finding");
        assert_eq!(finding.severity, Severity::High);
        assert!(finding.evidence.is_empty());
        assert!(finding.affected_assets.is_empty());
        assert_eq!(finding.risk_score, 0.0);
    }
}
