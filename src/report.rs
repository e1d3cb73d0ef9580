use std::path::PathBuf;

use serde::Serialize;

/// A wrapper appended to a gateway file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperEntry {
    pub name: String,
    /// RPC method literal as written in the wrapper, quotes included.
    pub full_method: String,
}

/// What a rewrite did to one gateway source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub roots_found: Vec<String>,
    pub roots_patched: Vec<String>,
    /// Wrapper names whose call site was rewritten in this run.
    pub call_sites_rewritten: Vec<String>,
    pub stale_wrappers_removed: Vec<String>,
    pub wrappers: Vec<WrapperEntry>,
    pub imports_added: Vec<String>,
    pub server_type: String,
    pub changed: bool,
}

/// Rewrite summary for one proto file's gateway output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub proto_file: String,
    pub gateway_path: PathBuf,
    #[serde(flatten)]
    pub summary: RewriteSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    /// Proto files that were passed over, with the reason.
    pub skipped: Vec<SkippedFile>,
    /// Proto files whose gateway output could not be rewritten.
    pub failed: Vec<SkippedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub proto_file: String,
    pub reason: String,
}

impl RunReport {
    pub fn changed_files(&self) -> usize {
        self.files.iter().filter(|f| f.summary.changed).count()
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys: serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Format a run as a text table, one row per gateway file.
pub fn format_table(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<48} {:>6} {:>6} {:>8} {:>8} {:>8}\n",
        "Gateway file", "Roots", "Sites", "Removed", "Wrappers", "Changed"
    ));
    out.push_str(&format!("{}\n", "-".repeat(89)));

    for file in &report.files {
        let s = &file.summary;
        out.push_str(&format!(
            "{:<48} {:>6} {:>6} {:>8} {:>8} {:>8}\n",
            truncate(&file.gateway_path.display().to_string(), 48),
            format!("{}/{}", s.roots_patched.len(), s.roots_found.len()),
            s.call_sites_rewritten.len(),
            s.stale_wrappers_removed.len(),
            s.wrappers.len(),
            if s.changed { "yes" } else { "no" },
        ));
    }
    for skipped in &report.skipped {
        out.push_str(&format!(
            "skipped {}: {}\n",
            skipped.proto_file, skipped.reason
        ));
    }
    for failed in &report.failed {
        out.push_str(&format!("failed {}: {}\n", failed.proto_file, failed.reason));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let tail: String = s
        .chars()
        .rev()
        .take(max.saturating_sub(3))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunReport {
        RunReport {
            files: vec![FileReport {
                proto_file: "greeter.proto".into(),
                gateway_path: PathBuf::from("gen/greeter.pb.gw.go"),
                summary: RewriteSummary {
                    roots_found: vec!["RegisterGreeterHandlerServer".into()],
                    roots_patched: vec!["RegisterGreeterHandlerServer".into()],
                    call_sites_rewritten: vec![
                        "interceptor_local_request_Greeter_SayHello_0".into(),
                    ],
                    wrappers: vec![WrapperEntry {
                        name: "interceptor_local_request_Greeter_SayHello_0".into(),
                        full_method: "\"/Greeter/SayHello\"".into(),
                    }],
                    server_type: "GreeterServer".into(),
                    changed: true,
                    ..Default::default()
                },
            }],
            skipped: vec![SkippedFile {
                proto_file: "empty.proto".into(),
                reason: "no services".into(),
            }],
            failed: vec![SkippedFile {
                proto_file: "broken.proto".into(),
                reason: "syntax error".into(),
            }],
        }
    }

    #[test]
    fn table_lists_files_and_skips() {
        let table = format_table(&sample());
        assert!(table.contains("gen/greeter.pb.gw.go"), "Got:\n{table}");
        assert!(table.contains("1/1"), "Got:\n{table}");
        assert!(table.contains("yes"), "Got:\n{table}");
        assert!(table.contains("skipped empty.proto: no services"), "Got:\n{table}");
        assert!(table.contains("failed broken.proto: syntax error"), "Got:\n{table}");
    }

    #[test]
    fn json_flattens_summary() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json()).unwrap();
        let file = &json["files"][0];
        assert_eq!(file["proto_file"], "greeter.proto");
        assert_eq!(file["server_type"], "GreeterServer");
        assert_eq!(file["wrappers"][0]["full_method"], "\"/Greeter/SayHello\"");
        assert_eq!(json["skipped"][0]["reason"], "no services");
    }

    #[test]
    fn counts_changed_files() {
        let mut report = sample();
        assert_eq!(report.changed_files(), 1);
        report.files[0].summary.changed = false;
        assert_eq!(report.changed_files(), 0);
    }

    #[test]
    fn truncate_keeps_the_tail() {
        assert_eq!(truncate("abcdefghij", 6), "...hij");
        assert_eq!(truncate("short", 6), "short");
    }
}
