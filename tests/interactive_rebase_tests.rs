use patch_queue::config::initialize_repo;
use patch_queue::errors::Result;
use patch_queue::git::{GitCommitMutator, GitRepository};
use patch_queue::rebase::{
    CommitMutator, RebaseOptions, RebaseOrchestrator, RebaseOutcome, TodoEditor,
};
use patch_queue::stack::{Stack, StackStore};
use patch_queue::PatchQueueError;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Editor that rewrites the todo text with a closure and remembers what it was shown
struct FnEditor<F: Fn(&str) -> String> {
    rewrite: F,
    shown: RefCell<Option<String>>,
}

impl<F: Fn(&str) -> String> FnEditor<F> {
    fn new(rewrite: F) -> Self {
        Self {
            rewrite,
            shown: RefCell::new(None),
        }
    }
}

impl<F: Fn(&str) -> String> TodoEditor for FnEditor<F> {
    fn edit(&self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        fs::write(path, (self.rewrite)(&text))?;
        *self.shown.borrow_mut() = Some(text);
        Ok(())
    }
}

fn replace_with(text: &'static str) -> FnEditor<impl Fn(&str) -> String> {
    FnEditor::new(move |_: &str| text.to_string())
}

fn git(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    git(&repo_path, &["init", "-b", "main"]);
    git(&repo_path, &["config", "user.name", "Test"]);
    git(&repo_path, &["config", "user.email", "test@test.com"]);

    fs::write(repo_path.join("README.md"), "# Test\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "Initial commit"]);

    (temp_dir, repo_path)
}

fn commit_file(repo_path: &Path, file: &str, content: &str, message: &str) -> String {
    fs::write(repo_path.join(file), content).unwrap();
    git(repo_path, &["add", file]);
    git(repo_path, &["commit", "-m", message]);
    git(repo_path, &["rev-parse", "HEAD"])
}

/// Repository with one applied patch per name, each adding `<name>.txt`
struct Fixture {
    _temp_dir: TempDir,
    path: PathBuf,
    repo: GitRepository,
    store: StackStore,
}

impl Fixture {
    fn new(names: &[&str]) -> Self {
        Self::with_patches(
            &names
                .iter()
                .map(|name| (*name, format!("{name}.txt"), format!("{name}\n")))
                .collect::<Vec<_>>(),
        )
    }

    /// `(name, file, content)` per patch
    fn with_patches(patches: &[(&str, String, String)]) -> Self {
        let (temp_dir, path) = create_test_repo();
        initialize_repo(&path).unwrap();
        let base = git(&path, &["rev-parse", "HEAD"]);

        let repo = GitRepository::open(&path).unwrap();
        let store = StackStore::new(&path, "main").unwrap();
        {
            let lock = store.lock().unwrap();
            let mut stack = store.initialize(&lock, &base).unwrap();
            let commits = GitCommitMutator::new(&repo, "main", "refs/patches");

            for (name, file, content) in patches {
                let commit = commit_file(&path, file, content, &format!("Add {name}"));
                commits.record(name, &commit).unwrap();
                stack.push_applied(name.to_string(), commit, format!("Add {name}"));
            }
            store.replace(&lock, &stack, "setup").unwrap();
        }

        Self {
            _temp_dir: temp_dir,
            path,
            repo,
            store,
        }
    }

    fn rebase<E: TodoEditor>(&self, editor: E, options: &RebaseOptions) -> Result<RebaseOutcome> {
        let commits = GitCommitMutator::new(&self.repo, "main", "refs/patches");
        RebaseOrchestrator::new(&self.store, editor, commits).run(options)
    }

    fn interactive<E: TodoEditor>(&self, editor: E) -> Result<Stack> {
        let options = RebaseOptions {
            interactive: true,
            ..RebaseOptions::default()
        };
        match self.rebase(editor, &options)? {
            RebaseOutcome::Rebased(outcome) => Ok(outcome.stack),
            RebaseOutcome::NoOp => Ok(self.store.load().unwrap()),
        }
    }

    fn head(&self) -> String {
        git(&self.path, &["rev-parse", "HEAD"])
    }

    fn has_file(&self, name: &str) -> bool {
        self.path.join(name).exists()
    }

    fn patch_ref(&self, name: &str) -> Option<String> {
        self.repo
            .ref_target(&format!("refs/patches/main/{name}"))
            .unwrap()
    }
}

#[test]
fn test_editor_sees_rendered_stack() {
    let fx = Fixture::new(&["p0", "p1", "p2"]);
    let editor = FnEditor::new(|text: &str| text.to_string());

    let stack = fx.interactive(&editor).unwrap();

    let shown = editor.shown.borrow().clone().unwrap();
    assert!(shown.starts_with("keep p0  # Add p0\nkeep p1  # Add p1\nkeep p2  # Add p2\n# --- APPLY_LINE ---\n"));
    assert!(shown.contains("# Commands:"));
    assert_eq!(stack.patch_names(), vec!["p0", "p1", "p2"]);
    assert_eq!(stack.boundary(), 3);
    assert!(!fx.store.config_dir().join("REBASE_TODO").exists());
}

#[test]
fn test_moving_marker_unapplies_patches() {
    let fx = Fixture::new(&["p0", "p1", "p2", "p3"]);
    let p1 = fx.store.load().unwrap().get_patch("p1").unwrap().commit.clone();

    let stack = fx
        .interactive(replace_with(
            "keep p0\nkeep p1\n# --- APPLY_LINE ---\nkeep p2\nkeep p3\n",
        ))
        .unwrap();

    assert_eq!(stack.len(), 4);
    assert_eq!(stack.boundary(), 2);
    assert_eq!(fx.head(), p1);
    assert!(!fx.repo.is_dirty().unwrap());
    assert!(fx.has_file("p1.txt"));
    assert!(!fx.has_file("p2.txt"));
    // Unapplied patches stay reachable
    assert!(fx.patch_ref("p3").is_some());
}

#[test]
fn test_delete_patches() {
    let fx = Fixture::new(&["p0", "p1", "p2", "p3"]);

    let stack = fx
        .interactive(FnEditor::new(|text: &str| {
            text.replace("keep p0", "delete p0")
                .replace("keep p2", "delete p2")
        }))
        .unwrap();

    assert_eq!(stack.patch_names(), vec!["p1", "p3"]);
    assert_eq!(stack.boundary(), 2);
    assert_eq!(fx.head(), stack.head());
    assert!(!fx.has_file("p0.txt"));
    assert!(fx.has_file("p1.txt"));
    assert!(!fx.has_file("p2.txt"));
    assert!(fx.has_file("p3.txt"));
    assert!(fx.patch_ref("p0").is_none());
    assert_eq!(fx.patch_ref("p3"), Some(stack.head().to_string()));
}

#[test]
fn test_squash_pair() {
    let fx = Fixture::new(&["p0", "p1"]);

    let stack = fx
        .interactive(replace_with("keep p0\nsquash p1\n# --- APPLY_LINE ---\n"))
        .unwrap();

    assert_eq!(stack.patch_names(), vec!["p0"]);
    let commit = fx.repo.get_commit(stack.head()).unwrap();
    let message = commit.message().unwrap().to_string();
    assert!(message.contains("Add p0"));
    assert!(message.contains("Add p1"));
    assert_eq!(fx.repo.parent_of(stack.head()).unwrap(), stack.base);
    assert!(fx.has_file("p0.txt"));
    assert!(fx.has_file("p1.txt"));
    assert!(fx.patch_ref("p1").is_none());
}

#[test]
fn test_squash_chains() {
    let fx = Fixture::new(&["p0", "p1", "p2", "p3", "p4", "p5"]);

    let stack = fx
        .interactive(replace_with(
            "keep p0\nsquash p1\nsquash p2\nkeep p3\nsquash p4\nkeep p5\n",
        ))
        .unwrap();

    assert_eq!(stack.patch_names(), vec!["p0", "p3", "p5"]);
    assert_eq!(stack.boundary(), 3);
    for file in ["p0.txt", "p1.txt", "p2.txt", "p3.txt", "p4.txt", "p5.txt"] {
        assert!(fx.has_file(file), "{file} missing");
    }
    let log = git(&fx.path, &["log", "--format=%s", &format!("{}..HEAD", stack.base)]);
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["Add p5", "Add p3", "Add p0"]);
}

#[test]
fn test_reorder_and_apply_subset() {
    let fx = Fixture::new(&["p0", "p1", "p2"]);

    let stack = fx
        .interactive(replace_with("keep p2\n# --- APPLY_LINE ---\nkeep p0\nkeep p1\n"))
        .unwrap();

    assert_eq!(stack.patch_names(), vec!["p2", "p0", "p1"]);
    assert_eq!(stack.boundary(), 1);
    assert_eq!(fx.repo.parent_of(stack.head()).unwrap(), stack.base);
    assert!(fx.has_file("p2.txt"));
    assert!(!fx.has_file("p0.txt"));
}

#[test]
fn test_rejected_plans_leave_everything_unchanged() {
    let cases = [
        ("keep p0\n# --- APPLY_LINE --- extra\nkeep p1\n", "Bad APPLY_LINE"),
        ("keep\nkeep p1\n", "Bad todo line"),
        ("keep p0\nkeep p1\nkeep invalid_patch_name\n", "Bad patch name"),
        ("keep p0\ninvalid_instruction p1\n", "Unknown instruction"),
        ("keep p0\n", "Bad patch name 'p1'"),
    ];

    for (text, expected) in cases {
        let fx = Fixture::new(&["p0", "p1"]);
        let before = fs::read(fx.store.stack_file()).unwrap();
        let head = fx.head();

        let err = fx.interactive(replace_with(text)).unwrap_err();

        assert!(err.to_string().starts_with(expected), "{text:?} gave {err}");
        assert_eq!(fs::read(fx.store.stack_file()).unwrap(), before);
        assert_eq!(fx.head(), head);
    }
}

#[test]
fn test_conflicting_reorder_rolls_back() {
    let fx = Fixture::with_patches(&[
        ("create", "shared.txt".to_string(), "one\n".to_string()),
        ("change", "shared.txt".to_string(), "two\n".to_string()),
    ]);
    let before = fs::read(fx.store.stack_file()).unwrap();
    let head = fx.head();

    let err = fx
        .interactive(replace_with("keep change\nkeep create\n"))
        .unwrap_err();

    assert!(matches!(err, PatchQueueError::MergeConflict(ref m) if m.contains("change")));
    assert_eq!(fs::read(fx.store.stack_file()).unwrap(), before);
    assert_eq!(fx.head(), head);
    assert!(fx.patch_ref("create").is_some());
}

#[test]
fn test_dirty_working_tree_is_refused() {
    let fx = Fixture::new(&["p0"]);
    fs::write(fx.path.join("p0.txt"), "local edit\n").unwrap();

    let editor = FnEditor::new(|text: &str| text.to_string());
    let err = fx.interactive(&editor).unwrap_err();

    assert!(matches!(err, PatchQueueError::DirtyWorkingTree));
    assert!(editor.shown.borrow().is_none());
}

#[test]
fn test_empty_stack_is_noop() {
    let fx = Fixture::new(&[]);
    let editor = FnEditor::new(|_: &str| "keep ghost\n".to_string());
    let options = RebaseOptions {
        interactive: true,
        ..RebaseOptions::default()
    };

    let outcome = fx.rebase(&editor, &options).unwrap();

    assert!(matches!(outcome, RebaseOutcome::NoOp));
    assert!(fx.store.load().unwrap().is_empty());
}

#[test]
fn test_rebase_onto_new_base() {
    let fx = Fixture::new(&["p0", "p1"]);
    let old_base = fx.store.load().unwrap().base;

    // Upstream work on a side branch from the old base
    git(&fx.path, &["checkout", "-q", "-b", "upstream", &old_base]);
    let upstream = commit_file(&fx.path, "upstream.txt", "up\n", "Upstream change");
    git(&fx.path, &["checkout", "-q", "main"]);

    let options = RebaseOptions {
        new_base: Some(upstream.clone()),
        ..RebaseOptions::default()
    };
    let outcome = fx.rebase(replace_with(""), &options).unwrap();

    let RebaseOutcome::Rebased(outcome) = outcome else {
        panic!("expected a rebase");
    };
    assert_eq!(outcome.stack.base, upstream);
    assert_eq!(outcome.stack.boundary(), 2);
    assert!(fx.has_file("upstream.txt"));
    assert!(fx.has_file("p1.txt"));
    let log = git(&fx.path, &["log", "--format=%s", &format!("{upstream}..HEAD")]);
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["Add p1", "Add p0"]);
}

#[test]
fn test_stack_log_records_rebase() {
    let fx = Fixture::new(&["p0", "p1"]);

    fx.interactive(replace_with("keep p1\n# --- APPLY_LINE ---\ndelete p0\n"))
        .unwrap();

    let log = fx.store.log().unwrap();
    let last = log.last().unwrap();
    assert_eq!(last.message, "rebase --interactive");
    assert_eq!(last.applied, vec!["p1"]);
    assert!(last.unapplied.is_empty());
}

#[test]
fn test_untracked_file_in_the_way_is_refused() {
    let fx = Fixture::new(&["p0", "p1"]);
    let p0 = fx.store.load().unwrap().get_patch("p0").unwrap().commit.clone();
    let p1 = fx.store.load().unwrap().get_patch("p1").unwrap().commit.clone();

    fx.interactive(replace_with("keep p0\n# --- APPLY_LINE ---\nkeep p1\n"))
        .unwrap();
    fs::write(fx.path.join("p1.txt"), "precious user data\n").unwrap();
    let before = fs::read(fx.store.stack_file()).unwrap();

    let err = fx
        .interactive(replace_with("keep p0\nkeep p1\n# --- APPLY_LINE ---\n"))
        .unwrap_err();

    assert!(matches!(err, PatchQueueError::DirtyWorkingTree));
    assert_eq!(
        fs::read_to_string(fx.path.join("p1.txt")).unwrap(),
        "precious user data\n"
    );
    assert_eq!(fs::read(fx.store.stack_file()).unwrap(), before);
    assert_eq!(fx.head(), p0);
    assert_eq!(fx.patch_ref("p1"), Some(p1));
}

#[test]
fn test_merged_patches_are_reported() {
    let fx = Fixture::new(&["p0", "p1"]);
    let old_base = fx.store.load().unwrap().base;

    // Upstream picked up p0's change on its own
    git(&fx.path, &["checkout", "-q", "-b", "upstream", &old_base]);
    let upstream = commit_file(&fx.path, "p0.txt", "p0\n", "Upstream p0");
    git(&fx.path, &["checkout", "-q", "main"]);

    let options = RebaseOptions {
        new_base: Some(upstream.clone()),
        merged: true,
        ..RebaseOptions::default()
    };
    let RebaseOutcome::Rebased(outcome) = fx.rebase(replace_with(""), &options).unwrap() else {
        panic!("expected a rebase");
    };

    assert_eq!(outcome.merged, vec!["p0"]);
    assert_eq!(outcome.stack.patch_names(), vec!["p0", "p1"]);
    let p0 = &outcome.stack.get_patch("p0").unwrap().commit;
    assert!(fx.repo.is_empty_commit(p0).unwrap());
    assert!(!fx.repo.is_empty_commit(outcome.stack.head()).unwrap());
    assert_eq!(fx.head(), outcome.stack.head());
    assert_eq!(
        fx.store.log().unwrap().last().unwrap().message,
        format!("rebase --merged {upstream}")
    );
}

#[test]
fn test_refs_follow_rewritten_commits() {
    let fx = Fixture::new(&["p0", "p1", "p2"]);

    let stack = fx
        .interactive(replace_with("keep p2\nsquash p1\n# --- APPLY_LINE ---\nkeep p0\n"))
        .unwrap();

    for patch in stack.patches() {
        assert_eq!(fx.patch_ref(&patch.name).as_ref(), Some(&patch.commit));
    }
    assert_eq!(fx.patch_ref("p1"), None);
    assert_eq!(fx.head(), stack.head());
}
