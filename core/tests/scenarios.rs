//! End-to-end behaviour of the engine against temporary project trees.

use llmprep_core::chunking::{self, ChunkCandidate};
use llmprep_core::collect::{self, FileSelection};
use llmprep_core::config::{self, CONFIG_FILENAME, CORRUPT_BACKUP_FILENAME, PatternUpdate, UpdateAction};
use llmprep_core::ops::{self, ChunkRequest, GenerateRequest};
use llmprep_core::{EngineLimits, ItemError, PatternMatcher, matches, prepare_root, render, strip_line_numbers};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = prepare_root(dir.path(), &EngineLimits::default()).unwrap();
        Self { _dir: dir, root }
    }

    fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    fn path(&self) -> &Path {
        &self.root
    }
}

fn numbered_lines(n: usize) -> String {
    (1..=n).map(|i| format!("x_{} = {}\n", i, i)).collect()
}

fn update(root: &Path, action: UpdateAction, patterns: &[&str], reason: Option<&str>) -> config::UpdateOutcome {
    config::update(
        root,
        &PatternUpdate {
            action,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            reason: reason.map(String::from),
        },
    )
    .unwrap()
}

#[test]
fn oversized_file_is_split_into_its_own_chunk() {
    let project = Project::new();
    project
        .write("a.py", &numbered_lines(50))
        .write("b.py", &numbered_lines(80))
        .write("a.pyc", "compiled");

    let report = ops::chunk_directory(
        project.path(),
        &ChunkRequest {
            path: ".".to_string(),
            line_limit: Some(60),
            ignore: vec!["*.pyc".to_string()],
            dry_run: true,
            ..ChunkRequest::default()
        },
        &EngineLimits::default(),
    )
    .unwrap();

    assert_eq!(report.chunks.len(), 2);
    assert_eq!(report.chunks[0].files, vec!["a.py"]);
    assert_eq!(report.chunks[0].line_count, 50);
    assert!(!report.chunks[0].oversized);
    assert_eq!(report.chunks[1].files, vec!["b.py"]);
    assert_eq!(report.chunks[1].line_count, 80);
    assert!(report.chunks[1].oversized);
}

#[test]
fn chunks_cover_every_file_exactly_once() {
    let sizes = [12, 0, 7, 99, 30, 30, 1, 45, 250, 3, 60, 59];
    let candidates: Vec<ChunkCandidate> = sizes
        .iter()
        .enumerate()
        .map(|(i, &line_count)| ChunkCandidate {
            path: format!("f{:02}.rs", i),
            line_count,
        })
        .collect();
    let limit = 60;
    let chunks = chunking::pack_chunks(candidates.clone(), limit).unwrap();

    let flattened: Vec<String> = chunks.iter().flat_map(|c| c.files.clone()).collect();
    let expected: Vec<String> = candidates.iter().map(|c| c.path.clone()).collect();
    assert_eq!(flattened, expected);
    for chunk in &chunks {
        if chunk.oversized {
            assert_eq!(chunk.files.len(), 1);
            assert!(chunk.line_count > limit);
        } else {
            assert!(chunk.line_count <= limit);
        }
    }
}

#[test]
fn adding_a_pattern_with_a_reason_records_one_history_entry() {
    let project = Project::new();
    let before = config::load(project.path()).unwrap().history.len();

    let outcome = update(project.path(), UpdateAction::Add, &["dist"], Some("js build output"));
    assert!(outcome.config.ignore_patterns.contains("dist"));
    assert_eq!(outcome.added, vec!["dist"]);
    assert_eq!(outcome.config.history.len(), before + 1);
    let entry = outcome.config.history.last().unwrap();
    assert_eq!(entry.action, UpdateAction::Add);
    assert_eq!(entry.reason, "js build output");
    assert!(entry.patterns.ends_with("|dist"));

    let reloaded = config::load(project.path()).unwrap();
    assert_eq!(reloaded.history.len(), before + 1);
}

#[test]
fn add_then_remove_restores_the_pattern_set() {
    let project = Project::new();
    let original = config::load(project.path()).unwrap().patterns();
    update(project.path(), UpdateAction::Add, &["coverage", "tmp"], None);
    let restored = update(project.path(), UpdateAction::Remove, &["coverage", "tmp"], None);
    assert_eq!(restored.config.patterns(), original);
    assert_eq!(restored.config.history.len(), 2);
}

#[test]
fn auto_then_set_empty_clears_patterns_but_keeps_history() {
    let project = Project::new();
    project.write("Cargo.toml", "[package]\nname = \"demo\"\n");

    let auto = update(project.path(), UpdateAction::Auto, &[], Some("detect"));
    assert!(auto.config.ignore_patterns.contains("target"));
    let cleared = update(project.path(), UpdateAction::Set, &[], None);
    assert!(cleared.config.ignore_patterns.is_empty());

    let actions: Vec<UpdateAction> = cleared.config.history.iter().map(|h| h.action).collect();
    assert_eq!(actions, vec![UpdateAction::Auto, UpdateAction::Set]);
    assert_eq!(cleared.config.history[1].patterns, "");
}

#[test]
fn escaping_selection_fails_alone() {
    let project = Project::new();
    project.write("src/app.py", "print('hi')\n").write("notes.txt", "ok\n");

    let report = ops::generate_document(
        project.path(),
        &GenerateRequest {
            files: vec![
                FileSelection::new("src/app.py"),
                FileSelection::new("../outside.txt"),
                FileSelection::new("notes.txt"),
            ],
            dry_run: true,
            ..GenerateRequest::default()
        },
        &EngineLimits::default(),
    )
    .unwrap();

    assert_eq!(report.files, vec!["src/app.py", "notes.txt"]);
    assert_eq!(
        report.errors,
        vec![ItemError::PathEscape {
            path: "../outside.txt".to_string()
        }]
    );
}

#[test]
fn tree_and_file_sections_are_idempotent() {
    let project = Project::new();
    project
        .write("src/lib.rs", "pub fn a() {}\n")
        .write("src/bin/main.rs", "fn main() {}\n")
        .write("target/debug/out", "bin")
        .write("README.md", "# demo\n");
    let patterns = ["target"];

    let first = render(project.path(), 3, &patterns).unwrap();
    let second = render(project.path(), 3, &patterns).unwrap();
    assert_eq!(first, second);
    assert!(!first.contains("target"));
    assert!(first.contains("README.md"));

    let selections = vec![FileSelection::new("src/lib.rs"), FileSelection::new("README.md")];
    let limits = EngineLimits::default();
    let a = collect::collect(project.path(), &selections, &limits);
    let b = collect::collect(project.path(), &selections, &limits);
    assert_eq!(a, b);
}

#[test]
fn stripping_line_numbers_restores_original_bytes() {
    let project = Project::new();
    let content = "first\r\n\r\n  indented\tline\nno newline at end";
    project.write("mixed.txt", content);

    let out = collect::collect(project.path(), &[FileSelection::new("mixed.txt")], &EngineLimits::default());
    let section = &out.items[0];
    assert_eq!(section.line_count, 4);
    assert_eq!(strip_line_numbers(&section.numbered_content), content);
}

#[test]
fn protected_names_are_never_ignored() {
    assert!(!matches(Path::new("README.md"), &["*.md"]).unwrap());
    assert!(!matches(Path::new("pkg/package.json"), &["*.json", "pkg/*"]).unwrap());
    assert!(matches(Path::new("pkg/index.json"), &["*.json"]).unwrap());
    assert!(!matches(Path::new("anything"), &[] as &[&str]).unwrap());

    let matcher = PatternMatcher::new(&["build/"]).unwrap();
    assert!(matcher.matches(Path::new("build/out.o")));
    assert!(!matcher.matches(Path::new("src/builder.rs")));
}

#[test]
fn generated_document_lands_in_recent_list() {
    let project = Project::new();
    project.write("main.go", "package main\n").write("go.mod", "module demo\n");

    let report = ops::generate_document(
        project.path(),
        &GenerateRequest {
            files: vec![FileSelection::with_note("main.go", "entry point")],
            notes: vec!["consider the build tags".to_string()],
            output_name: Some("review.md".to_string()),
            ..GenerateRequest::default()
        },
        &EngineLimits::default(),
    )
    .unwrap();
    let document = report.document.unwrap();
    let text = fs::read_to_string(&document.path).unwrap();
    assert!(text.starts_with("# LLM Context Document\n"));
    assert!(text.contains("| `main.go` | entry point |"));
    assert!(text.contains("1|package main\n"));
    assert!(text.contains("consider the build tags"));

    let listing = ops::list_recent(project.path(), 10).unwrap();
    assert!(listing.warnings.is_empty());
    let recent = listing.documents;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].path, "context_reports/review.md");
    assert_eq!(recent[0].size, document.stats.bytes);
}

fn structure_of(text: &str) -> String {
    let after = text.split("## Project Structure").nth(1).unwrap();
    after.split("\n## ").next().unwrap().to_string()
}

#[test]
fn generating_twice_renders_the_same_structure() {
    let project = Project::new();
    project.write("main.go", "package main\n").write("pkg/util.go", "package pkg\n");
    ops::create_note(project.path(), "findings", "slow start", None).unwrap();

    let mut structures = Vec::new();
    for name in ["first.md", "second.md"] {
        let report = ops::generate_document(
            project.path(),
            &GenerateRequest {
                output_name: Some(name.to_string()),
                ..GenerateRequest::default()
            },
            &EngineLimits::default(),
        )
        .unwrap();
        let text = fs::read_to_string(report.document.unwrap().path).unwrap();
        structures.push(structure_of(&text));
    }
    assert_eq!(structures[0], structures[1]);
    assert!(structures[1].contains("util.go"));
    for hidden in ["context_reports", CONFIG_FILENAME, ".llm_prep_notes", ".lock"] {
        assert!(!structures[1].contains(hidden), "{} leaked into the tree", hidden);
    }
}

#[test]
fn crowded_root_is_summarized() {
    let project = Project::new();
    for i in 0..205 {
        project.write(&format!("f{:03}.txt", i), "x\n");
    }
    let shown = ops::project_tree(project.path(), &[], None).unwrap();
    assert!(shown.tree.contains("f000.txt"));
    assert!(!shown.tree.contains("f204.txt"));
    assert!(shown.tree.contains("... [5 more entries, "));
}

#[test]
fn corrupt_config_is_reported_by_every_operation() {
    let project = Project::new();
    project.write("app.py", "print(1)\n").write(CONFIG_FILENAME, "{\"patterns\": [");

    let outcome = update(project.path(), UpdateAction::Add, &["vendor"], None);
    assert!(outcome.warnings[0].starts_with("Corrupt configuration at"));
    assert!(outcome.warnings.iter().any(|w| w.contains(CORRUPT_BACKUP_FILENAME)));
    assert!(project.path().join(CORRUPT_BACKUP_FILENAME).is_file());

    // The update rewrote a valid config; break it again for the readers.
    project.write(CONFIG_FILENAME, "not json");
    let chunked = ops::chunk_directory(
        project.path(),
        &ChunkRequest {
            path: ".".to_string(),
            dry_run: true,
            ..ChunkRequest::default()
        },
        &EngineLimits::default(),
    )
    .unwrap();
    assert!(chunked.warnings[0].starts_with("Corrupt configuration at"));
    let listing = ops::list_recent(project.path(), 5).unwrap();
    assert!(listing.warnings[0].starts_with("Corrupt configuration at"));
}

#[test]
fn chunking_reports_every_skipped_file() {
    let project = Project::new();
    project
        .write("svc/a.py", &numbered_lines(3))
        .write("svc/logo.png", "png")
        .write("svc/huge.py", &numbered_lines(200));
    let limits = EngineLimits {
        max_file_size: 512,
        ..EngineLimits::default()
    };
    let report = ops::chunk_directory(
        project.path(),
        &ChunkRequest {
            path: "svc".to_string(),
            dry_run: true,
            ..ChunkRequest::default()
        },
        &limits,
    )
    .unwrap();
    assert_eq!(report.chunks.len(), 1);
    assert_eq!(report.chunks[0].files, vec!["svc/a.py"]);
    let mut kinds: Vec<&str> = report.errors.iter().map(|e| e.kind()).collect();
    kinds.sort();
    assert_eq!(kinds, vec!["disallowed_type", "oversize_file"]);
}

#[test]
fn untouched_defaults_raise_no_source_root_warning() {
    let project = Project::new();
    let quiet = update(project.path(), UpdateAction::Add, &["vendor"], None);
    assert!(quiet.warnings.is_empty(), "{:?}", quiet.warnings);

    let loud = update(project.path(), UpdateAction::Add, &["src"], None);
    assert!(loud.warnings.iter().any(|w| w.contains("'src'")));
}
