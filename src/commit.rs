//! Commit Sequencer
//!
//! Groups updates into commits and applies them one group at a time:
//!
//! 1. `Write`: patch the group's files
//! 2. `PreCommit`: run the pre-commit hook, if any, against the patched tree
//! 3. `Stage`: stage exactly those files
//! 4. `Commit`: commit with the composed message
//! 5. `PostCommit`: run the post-commit hook, if any
//!
//! Any failure stops the sequence. Commits made before the failure stay.

use crate::update::{Span, Update, VersionFact, reconcile};
use crate::vcs::Vcs;
use crate::{Error, Result, patch};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Group key used when updates are not partitioned
pub const DEFAULT_GROUP: &str = "dependencies";

/// Maps an update to its commit group
pub type GroupBy = Box<dyn Fn(&Update) -> String + Send + Sync>;

/// Renders a commit message from a group key and its version fact
pub type ComposeMessage = Box<dyn Fn(&str, Option<&VersionFact>) -> String + Send + Sync>;

/// Trait for commit hooks (formatters, test runners, ...)
///
/// A failing hook stops the sequence.
#[async_trait]
pub trait CommitHook: Send + Sync {
    async fn run(&self, record: &CommitRecord) -> Result<()>;
}

/// Runs shell commands in a working directory
///
/// The group key and message are exported as `MOLT_GROUP` and
/// `MOLT_MESSAGE`.
pub struct ShellHook {
    commands: Vec<String>,
    cwd: PathBuf,
}

impl ShellHook {
    pub fn new(commands: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            commands,
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl CommitHook for ShellHook {
    async fn run(&self, record: &CommitRecord) -> Result<()> {
        for command in &self.commands {
            tracing::info!("Running `{}`", command);

            let mut cmd = if cfg!(windows) {
                let mut cmd = tokio::process::Command::new("cmd");
                cmd.arg("/C");
                cmd
            } else {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.arg("-c");
                cmd
            };
            let status = cmd
                .arg(command)
                .current_dir(&self.cwd)
                .env("MOLT_GROUP", &record.group)
                .env("MOLT_MESSAGE", &record.message)
                .status()
                .await
                .map_err(|e| Error::Hook {
                    command: command.clone(),
                    message: e.to_string(),
                })?;

            if !status.success() {
                return Err(Error::Hook {
                    command: command.clone(),
                    message: format!("exited with {}", status),
                });
            }
        }
        Ok(())
    }
}

/// How updates become commits
pub struct CommitOptions {
    pub group_by: GroupBy,
    pub compose_message: ComposeMessage,
    pub pre_commit: Option<Arc<dyn CommitHook>>,
    pub post_commit: Option<Arc<dyn CommitHook>>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            group_by: Box::new(|_: &Update| DEFAULT_GROUP.to_string()),
            compose_message: Box::new(|group: &str, version: Option<&VersionFact>| {
                default_message("", group, version)
            }),
            pre_commit: None,
            post_commit: None,
        }
    }
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// One commit per package
    pub fn group_by_package(self) -> Self {
        self.with_group_by(|update| update.name.clone())
    }

    pub fn with_group_by(
        mut self,
        group_by: impl Fn(&Update) -> String + Send + Sync + 'static,
    ) -> Self {
        self.group_by = Box::new(group_by);
        self
    }

    pub fn with_compose_message(
        mut self,
        compose: impl Fn(&str, Option<&VersionFact>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.compose_message = Box::new(compose);
        self
    }

    /// Default message format with a prefix such as `build(deps): `
    pub fn with_prefix(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.with_compose_message(move |group, version| default_message(&prefix, group, version))
    }

    pub fn with_pre_commit(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.pre_commit = Some(hook);
        self
    }

    pub fn with_post_commit(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.post_commit = Some(hook);
        self
    }
}

/// `bump <group>[ from <from>][ to <to>]`
pub fn default_message(prefix: &str, group: &str, version: Option<&VersionFact>) -> String {
    let mut message = format!("{}bump {}", prefix, group);
    if let Some(version) = version {
        if let Some(from) = &version.from {
            message.push_str(&format!(" from {}", from));
        }
        message.push_str(&format!(" to {}", version.to));
    }
    message
}

/// One planned commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    /// Position in the sequence, starting at 0
    pub position: usize,
    pub group: String,
    /// Absent when the group spans several packages
    pub version: Option<VersionFact>,
    pub message: String,
    /// Files touched by this commit, in first-touched order
    pub files: Vec<PathBuf>,
    pub updates: Vec<Update>,
}

/// Steps applied to each record, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Write,
    PreCommit,
    Stage,
    Commit,
    PostCommit,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Write,
        Step::PreCommit,
        Step::Stage,
        Step::Commit,
        Step::PostCommit,
    ];
}

/// Ordered commits ready to be executed
pub struct CommitSequence {
    pub records: Vec<CommitRecord>,
    pre_commit: Option<Arc<dyn CommitHook>>,
    post_commit: Option<Arc<dyn CommitHook>>,
}

impl CommitSequence {
    pub fn records(&self) -> &[CommitRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply and commit every record in order
    pub async fn exec(&self, vcs: &dyn Vcs) -> Result<()> {
        let mut shifts = Shifts::default();
        for record in &self.records {
            for step in Step::ALL {
                self.run_step(step, record, vcs, &mut shifts).await?;
                tracing::debug!("[{}] {:?} done: {}", record.position, step, record.group);
            }
            tracing::info!("Committed: {}", record.message);
        }
        Ok(())
    }

    async fn run_step(
        &self,
        step: Step,
        record: &CommitRecord,
        vcs: &dyn Vcs,
        shifts: &mut Shifts,
    ) -> Result<()> {
        match step {
            Step::PreCommit => match &self.pre_commit {
                Some(hook) => hook.run(record).await,
                None => Ok(()),
            },
            Step::Write => {
                let updates: Vec<Update> =
                    record.updates.iter().map(|u| shifts.rebase(u)).collect();
                patch::write(&updates)?;
                shifts.record(&record.updates);
                Ok(())
            }
            Step::Stage => vcs.stage(&record.files).await,
            Step::Commit => vcs.commit(&record.message).await,
            Step::PostCommit => match &self.post_commit {
                Some(hook) => hook.run(record).await,
                None => Ok(()),
            },
        }
    }
}

/// Length changes left in module files by earlier records
///
/// Spans are reported against the original text; a record written after
/// another one touched the same file needs them moved.
#[derive(Default)]
struct Shifts {
    edits: HashMap<PathBuf, Vec<(usize, isize)>>,
}

impl Shifts {
    fn rebase(&self, update: &Update) -> Update {
        let mut update = update.clone();
        if update.map.is_some() {
            return update;
        }
        if let Some(edits) = self.edits.get(&update.referrer) {
            let delta: isize = edits
                .iter()
                .filter(|(at, _)| *at < update.span.start)
                .map(|(_, delta)| delta)
                .sum();
            update.span = Span::new(
                update.span.start.saturating_add_signed(delta),
                update.span.end.saturating_add_signed(delta),
            );
        }
        update
    }

    fn record(&mut self, updates: &[Update]) {
        for update in updates.iter().filter(|u| u.map.is_none()) {
            let delta = update.to.len() as isize - update.from.len() as isize;
            let edits = self.edits.entry(update.referrer.clone()).or_default();
            if !edits.iter().any(|(at, _)| *at == update.span.start) {
                edits.push((update.span.start, delta));
            }
        }
    }
}

/// Partition updates into commit records
///
/// Groups keep the order in which their first update appears. Conflicting
/// targets within a group are an error.
pub fn compose(updates: &[Update], options: CommitOptions) -> Result<CommitSequence> {
    let mut groups: Vec<(String, Vec<Update>)> = Vec::new();
    for update in updates {
        let key = (options.group_by)(update);
        match groups.iter_mut().find(|(group, _)| *group == key) {
            Some((_, members)) => members.push(update.clone()),
            None => groups.push((key, vec![update.clone()])),
        }
    }

    let mut records = Vec::with_capacity(groups.len());
    for (position, (group, updates)) in groups.into_iter().enumerate() {
        let version = reconcile(&updates)?;
        let message = (options.compose_message)(&group, version.as_ref());

        let mut files: Vec<PathBuf> = Vec::new();
        for update in &updates {
            let target = update.target();
            if !files.iter().any(|f| f == target) {
                files.push(target.to_path_buf());
            }
        }

        records.push(CommitRecord {
            position,
            group,
            version,
            message,
            files,
            updates,
        });
    }

    Ok(CommitSequence {
        records,
        pre_commit: options.pre_commit,
        post_commit: options.post_commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingVcs {
        log: Log,
        fail_on_commit: Option<usize>,
    }

    #[async_trait]
    impl Vcs for RecordingVcs {
        async fn stage(&self, files: &[PathBuf]) -> Result<()> {
            let names: Vec<_> = files
                .iter()
                .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
                .collect();
            self.log.lock().unwrap().push(format!("stage {}", names.join(",")));
            Ok(())
        }

        async fn commit(&self, message: &str) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            let commits = log.iter().filter(|l| l.starts_with("commit")).count();
            if self.fail_on_commit == Some(commits) {
                return Err(Error::Vcs("commit rejected".to_string()));
            }
            log.push(format!("commit {}", message));
            Ok(())
        }
    }

    struct RecordingHook {
        name: &'static str,
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl CommitHook for RecordingHook {
        async fn run(&self, record: &CommitRecord) -> Result<()> {
            if self.fail {
                return Err(Error::Hook {
                    command: self.name.to_string(),
                    message: "tests failed".to_string(),
                });
            }
            self.log.lock().unwrap().push(format!("{} {}", self.name, record.group));
            Ok(())
        }
    }

    fn update(name: &str, from: &str, to: &str, referrer: &Path, text: &str) -> Update {
        let specifier = format!("npm:{}@{}", name, from);
        let start = text.find(&specifier).unwrap();
        Update {
            name: name.to_string(),
            version: VersionFact {
                from: Some(from.to_string()),
                to: to.to_string(),
            },
            from: specifier.clone(),
            to: format!("npm:{}@{}", name, to),
            referrer: referrer.to_path_buf(),
            span: Span::new(start, start + specifier.len()),
            map: None,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        a: PathBuf,
        b: PathBuf,
        updates: Vec<Update>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ts");
        let b = dir.path().join("b.ts");
        let a_text = "import \"npm:pkg@1.0.0\";\nimport \"npm:other@2.0.0\";\n";
        let b_text = "import \"npm:pkg@1.0.0\";\n";
        std::fs::write(&a, a_text).unwrap();
        std::fs::write(&b, b_text).unwrap();

        let updates = vec![
            update("pkg", "1.0.0", "1.2.0", &a, a_text),
            update("other", "2.0.0", "3.0.0", &a, a_text),
            update("pkg", "1.0.0", "1.2.0", &b, b_text),
        ];
        Fixture {
            _dir: dir,
            a,
            b,
            updates,
        }
    }

    #[test]
    fn test_compose_by_package() {
        let f = fixture();
        let sequence = compose(&f.updates, CommitOptions::new().group_by_package()).unwrap();

        assert_eq!(sequence.len(), 2);
        let pkg = &sequence.records()[0];
        assert_eq!(pkg.position, 0);
        assert_eq!(pkg.group, "pkg");
        assert_eq!(pkg.message, "bump pkg from 1.0.0 to 1.2.0");
        assert_eq!(pkg.files, vec![f.a.clone(), f.b.clone()]);
        assert_eq!(pkg.updates.len(), 2);

        let other = &sequence.records()[1];
        assert_eq!(other.position, 1);
        assert_eq!(other.files, vec![f.a.clone()]);
    }

    #[test]
    fn test_compose_single_group() {
        let f = fixture();
        let sequence = compose(&f.updates, CommitOptions::new().with_prefix("build(deps): ")).unwrap();

        assert_eq!(sequence.len(), 1);
        let record = &sequence.records()[0];
        assert_eq!(record.group, DEFAULT_GROUP);
        assert_eq!(record.version, None);
        assert_eq!(record.message, "build(deps): bump dependencies");
    }

    #[test]
    fn test_compose_rejects_conflicts() {
        let f = fixture();
        let mut updates = f.updates.clone();
        updates[2].version.to = "1.3.0".to_string();
        let result = compose(&updates, CommitOptions::new().group_by_package());
        assert!(matches!(result, Err(Error::ConflictingVersions { .. })));
    }

    #[test]
    fn test_default_message() {
        let fact = VersionFact {
            from: None,
            to: "0.202.0".to_string(),
        };
        assert_eq!(
            default_message("", "deno.land/std", Some(&fact)),
            "bump deno.land/std to 0.202.0"
        );
    }

    #[tokio::test]
    async fn test_exec_runs_stages_in_order() {
        let f = fixture();
        let log: Log = Arc::default();
        let options = CommitOptions::new()
            .group_by_package()
            .with_pre_commit(Arc::new(RecordingHook { name: "pre", log: log.clone(), fail: false }))
            .with_post_commit(Arc::new(RecordingHook { name: "post", log: log.clone(), fail: false }));
        let sequence = compose(&f.updates, options).unwrap();

        let vcs = RecordingVcs { log: log.clone(), fail_on_commit: None };
        sequence.exec(&vcs).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "pre pkg",
                "stage a.ts,b.ts",
                "commit bump pkg from 1.0.0 to 1.2.0",
                "post pkg",
                "pre other",
                "stage a.ts",
                "commit bump other from 2.0.0 to 3.0.0",
                "post other",
            ]
        );
        assert_eq!(
            std::fs::read_to_string(&f.a).unwrap(),
            "import \"npm:pkg@1.2.0\";\nimport \"npm:other@3.0.0\";\n"
        );
        assert_eq!(std::fs::read_to_string(&f.b).unwrap(), "import \"npm:pkg@1.2.0\";\n");
    }

    #[tokio::test]
    async fn test_commit_failure_stops_the_sequence() {
        let f = fixture();
        let log: Log = Arc::default();
        let sequence = compose(&f.updates, CommitOptions::new().group_by_package()).unwrap();

        let vcs = RecordingVcs { log: log.clone(), fail_on_commit: Some(1) };
        let result = sequence.exec(&vcs).await;

        assert!(matches!(result, Err(Error::Vcs(_))));
        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|l| l.starts_with("commit")).count(), 1);
        // The first commit stands
        assert!(std::fs::read_to_string(&f.b).unwrap().contains("pkg@1.2.0"));
    }

    #[tokio::test]
    async fn test_hook_failure_blocks_staging() {
        let f = fixture();
        let log: Log = Arc::default();
        let options = CommitOptions::new()
            .with_pre_commit(Arc::new(RecordingHook { name: "pre", log: log.clone(), fail: true }));
        let sequence = compose(&f.updates, options).unwrap();

        let vcs = RecordingVcs { log: log.clone(), fail_on_commit: None };
        assert!(matches!(sequence.exec(&vcs).await, Err(Error::Hook { .. })));
        let log = log.lock().unwrap();
        assert!(!log.iter().any(|l| l.starts_with("stage") || l.starts_with("commit")));

        // The failed record was written but stays uncommitted
        assert!(std::fs::read_to_string(&f.a).unwrap().contains("pkg@1.2.0"));
    }

    /// Logs the content of the record's files as the hook sees them
    struct SnapshotHook {
        log: Log,
    }

    #[async_trait]
    impl CommitHook for SnapshotHook {
        async fn run(&self, record: &CommitRecord) -> Result<()> {
            for file in &record.files {
                let content = std::fs::read_to_string(file)?;
                self.log.lock().unwrap().push(content);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pre_commit_sees_patched_files() {
        let f = fixture();
        let log: Log = Arc::default();
        let options = CommitOptions::new()
            .group_by_package()
            .with_pre_commit(Arc::new(SnapshotHook { log: log.clone() }));
        let sequence = compose(&f.updates, options).unwrap();

        let vcs = RecordingVcs { log: Arc::default(), fail_on_commit: None };
        sequence.exec(&vcs).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "import \"npm:pkg@1.2.0\";\nimport \"npm:other@2.0.0\";\n",
                "import \"npm:pkg@1.2.0\";\n",
                "import \"npm:pkg@1.2.0\";\nimport \"npm:other@3.0.0\";\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_later_commits_follow_length_changes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ts");
        let text = "import \"npm:pkg@1.0.0\";\nimport \"npm:other@2.0.0\";\n";
        std::fs::write(&a, text).unwrap();
        let updates = vec![
            update("pkg", "1.0.0", "1.10.0", &a, text),
            update("other", "2.0.0", "2.0.1", &a, text),
        ];

        let sequence = compose(&updates, CommitOptions::new().group_by_package()).unwrap();
        let vcs = RecordingVcs { log: Arc::default(), fail_on_commit: None };
        sequence.exec(&vcs).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&a).unwrap(),
            "import \"npm:pkg@1.10.0\";\nimport \"npm:other@2.0.1\";\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_hook_exit_status() {
        let f = fixture();
        let sequence = compose(&f.updates, CommitOptions::new()).unwrap();
        let record = &sequence.records()[0];
        let dir = tempfile::tempdir().unwrap();

        let ok = ShellHook::new(vec!["test \"$MOLT_GROUP\" = dependencies".to_string()], dir.path());
        assert!(ok.run(record).await.is_ok());

        let failing = ShellHook::new(vec!["true".to_string(), "exit 3".to_string()], dir.path());
        match failing.run(record).await {
            Err(Error::Hook { command, .. }) => assert_eq!(command, "exit 3"),
            other => panic!("expected hook failure, got {:?}", other),
        }
    }
}
