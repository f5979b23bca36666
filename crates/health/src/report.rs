use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pac_bootctl_common::now_seconds;
use serde::Deserialize;

/// Categorical summary of a health snapshot (§3.3). Any value the collector
/// emits that we don't recognize parses to `Unknown` rather than failing the
/// whole report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Marginal,
    Critical,
    Unknown,
}

impl From<&str> for OverallStatus {
    fn from(s: &str) -> Self {
        match s {
            "healthy" => OverallStatus::Healthy,
            "degraded" => OverallStatus::Degraded,
            "marginal" => OverallStatus::Marginal,
            "critical" => OverallStatus::Critical,
            _ => OverallStatus::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHealthReport {
    overall_score: i64,
    overall_status: String,
    #[serde(default)]
    checks: HashMap<String, bool>,
    #[serde(default)]
    timestamp: u64,
    /// Not in the core schema (§3.3/§6.2); a well-known collector may still
    /// emit it, and §6.2 says unknown fields are ignored when absent. When
    /// present, feeds the disk/memory/IMA degradation guards.
    #[serde(default)]
    ima_violations: u32,
    #[serde(default = "default_var_free_bytes")]
    var_free_bytes: u64,
    #[serde(default = "default_mem_free_pct")]
    mem_free_pct: u8,
}

fn default_var_free_bytes() -> u64 {
    u64::MAX
}

fn default_mem_free_pct() -> u8 {
    100
}

/// A health snapshot consumed from a collector-written file. The core never
/// produces this — see the health oracle adapter's specification.
#[derive(Debug, Clone)]
pub struct HealthReport {
    score: u32,
    status: OverallStatus,
    checks: HashMap<String, bool>,
    timestamp: u64,
    available: bool,
    ima_violations: u32,
    var_free_bytes: u64,
    mem_free_pct: u8,
}

impl HealthReport {
    /// A report that fails every query — used when the source file is
    /// absent or malformed. Callers must treat "no report" as "fails all
    /// guards," never as "healthy."
    ///
    /// The disk/memory/IMA fields default to "safe" values rather than
    /// zero so that an absent report only drives degradation through
    /// `score() == 0`, not spuriously through unrelated guards.
    pub fn unavailable() -> Self {
        Self {
            score: 0,
            status: OverallStatus::Unknown,
            checks: HashMap::new(),
            timestamp: 0,
            available: false,
            ima_violations: 0,
            var_free_bytes: u64::MAX,
            mem_free_pct: 100,
        }
    }

    /// Load and parse a health report from `path`. Never fails: a missing or
    /// malformed file yields [`Self::unavailable`].
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "health report unreadable");
                return Self::unavailable();
            }
        };

        match serde_json::from_str::<RawHealthReport>(&content) {
            Ok(raw) => Self::from_raw(raw),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "health report malformed");
                Self::unavailable()
            }
        }
    }

    fn from_raw(raw: RawHealthReport) -> Self {
        Self {
            score: raw.overall_score.max(0) as u32,
            status: OverallStatus::from(raw.overall_status.as_str()),
            checks: raw.checks,
            timestamp: raw.timestamp,
            available: true,
            ima_violations: raw.ima_violations,
            var_free_bytes: raw.var_free_bytes,
            mem_free_pct: raw.mem_free_pct,
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn status(&self) -> OverallStatus {
        self.status
    }

    pub fn ima_violations(&self) -> u32 {
        self.ima_violations
    }

    pub fn var_free_bytes(&self) -> u64 {
        self.var_free_bytes
    }

    pub fn mem_free_pct(&self) -> u8 {
        self.mem_free_pct
    }

    /// False if the named check isn't present in the report.
    pub fn check(&self, name: &str) -> bool {
        self.checks.get(name).copied().unwrap_or(false)
    }

    /// True only if the report is available and was written within
    /// `max_age_seconds` of now.
    pub fn is_fresh(&self, max_age_seconds: u64) -> bool {
        if !self.available {
            return false;
        }
        now_seconds().saturating_sub(self.timestamp) <= max_age_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_is_unavailable_and_fails_all_guards() {
        let report = HealthReport::load(Path::new("/nonexistent/pac-health.json"));
        assert_eq!(report.score(), 0);
        assert!(!report.check("memory"));
        assert!(!report.is_fresh(u64::MAX));
    }

    #[test]
    fn malformed_json_is_unavailable() {
        let tmp = NamedTempFile::new().unwrap();
        fs::write(tmp.path(), "{not json").unwrap();
        let report = HealthReport::load(tmp.path());
        assert_eq!(report.score(), 0);
        assert!(!report.is_fresh(u64::MAX));
    }

    #[test]
    fn well_formed_report_parses_score_and_checks() {
        let tmp = NamedTempFile::new().unwrap();
        let now = now_seconds();
        fs::write(
            tmp.path(),
            format!(
                r#"{{"overall_score": 8, "overall_status": "healthy",
                    "checks": {{"memory": true, "storage": false}},
                    "timestamp": {now}}}"#
            ),
        )
        .unwrap();

        let report = HealthReport::load(tmp.path());
        assert_eq!(report.score(), 8);
        assert_eq!(report.status(), OverallStatus::Healthy);
        assert!(report.check("memory"));
        assert!(!report.check("storage"));
        assert!(!report.check("kernel")); // absent key -> false
        assert!(report.is_fresh(30));
    }

    #[test]
    fn stale_report_is_not_fresh() {
        let tmp = NamedTempFile::new().unwrap();
        fs::write(
            tmp.path(),
            r#"{"overall_score": 8, "overall_status": "healthy", "checks": {}, "timestamp": 1}"#,
        )
        .unwrap();

        let report = HealthReport::load(tmp.path());
        assert!(!report.is_fresh(30));
    }

    #[test]
    fn negative_score_clamps_to_zero() {
        let tmp = NamedTempFile::new().unwrap();
        fs::write(
            tmp.path(),
            r#"{"overall_score": -5, "overall_status": "critical", "checks": {}, "timestamp": 0}"#,
        )
        .unwrap();

        let report = HealthReport::load(tmp.path());
        assert_eq!(report.score(), 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let tmp = NamedTempFile::new().unwrap();
        fs::write(
            tmp.path(),
            r#"{"overall_score": 5, "overall_status": "marginal", "checks": {}, "timestamp": 0, "future_field": 123}"#,
        )
        .unwrap();

        let report = HealthReport::load(tmp.path());
        assert_eq!(report.score(), 5);
        assert_eq!(report.status(), OverallStatus::Marginal);
    }
}
