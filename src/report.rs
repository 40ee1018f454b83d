//! Markdown summaries of a commit sequence, e.g. for a pull request

use crate::commit::CommitSequence;
use crate::update::Update;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Title used when a sequence holds more than one commit
pub const DEFAULT_TITLE: &str = "Update dependencies";

/// One-line title: the single commit message, or the default title
pub fn summary(sequence: &CommitSequence) -> String {
    match sequence.records() {
        [] => "No updates".to_string(),
        [record] => record.message.clone(),
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// Markdown body with one section per commit
pub fn report(sequence: &CommitSequence) -> String {
    let mut out = String::new();
    for record in sequence.records() {
        let _ = writeln!(out, "#### :package: {}", record.group);
        out.push('\n');

        for (name, (from, to)) in versions(&record.updates) {
            let _ = writeln!(out, "- {} {} → {}", name, from.join(", "), to);
        }
        out.push('\n');

        let _ = writeln!(out, "<details><summary>{} files</summary>", record.files.len());
        out.push('\n');
        for file in &record.files {
            let _ = writeln!(out, "- `{}`", file.display());
        }
        out.push('\n');
        out.push_str("</details>\n\n");
    }
    out.trim_end().to_string()
}

/// Prior versions and target per package, in name order
fn versions(updates: &[Update]) -> BTreeMap<&str, (Vec<&str>, &str)> {
    let mut versions: BTreeMap<&str, (Vec<&str>, &str)> = BTreeMap::new();
    for update in updates {
        let entry = versions
            .entry(update.name.as_str())
            .or_insert_with(|| (Vec::new(), update.version.to.as_str()));
        if let Some(from) = update.version.from.as_deref() {
            if !entry.0.contains(&from) {
                entry.0.push(from);
            }
        }
    }
    versions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{CommitOptions, compose};
    use crate::update::{Span, VersionFact};
    use std::path::PathBuf;

    fn update(name: &str, from: &str, to: &str, referrer: &str) -> Update {
        Update {
            name: name.to_string(),
            version: VersionFact {
                from: Some(from.to_string()),
                to: to.to_string(),
            },
            from: format!("npm:{}@{}", name, from),
            to: format!("npm:{}@{}", name, to),
            referrer: PathBuf::from(referrer),
            span: Span::new(0, 0),
            map: None,
        }
    }

    #[test]
    fn test_summary() {
        let single = compose(
            &[update("pkg", "1.0.0", "1.2.0", "a.ts")],
            CommitOptions::new().group_by_package(),
        )
        .unwrap();
        assert_eq!(summary(&single), "bump pkg from 1.0.0 to 1.2.0");

        let many = compose(
            &[
                update("pkg", "1.0.0", "1.2.0", "a.ts"),
                update("other", "2.0.0", "3.0.0", "a.ts"),
            ],
            CommitOptions::new().group_by_package(),
        )
        .unwrap();
        assert_eq!(summary(&many), DEFAULT_TITLE);

        let none = compose(&[], CommitOptions::new()).unwrap();
        assert_eq!(summary(&none), "No updates");
    }

    #[test]
    fn test_report_lists_versions_and_files() {
        let sequence = compose(
            &[
                update("pkg", "1.0.0", "1.2.0", "a.ts"),
                update("pkg", "1.1.0", "1.2.0", "b.ts"),
            ],
            CommitOptions::new(),
        )
        .unwrap();

        let report = report(&sequence);
        assert!(report.starts_with("#### :package: dependencies"));
        assert!(report.contains("- pkg 1.0.0, 1.1.0 → 1.2.0"));
        assert!(report.contains("<details><summary>2 files</summary>"));
        assert!(report.contains("- `a.ts`"));
        assert!(report.contains("- `b.ts`"));
        assert!(report.ends_with("</details>"));
    }
}
