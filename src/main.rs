//! devtwin — autonomous software-engineering agent
//!
//! Usage:
//!   devtwin run --repo <path> --title "..." [--body "..."]
//!   devtwin run --title "..."                       (clones REPO_URL)
//!   devtwin run --repo <path> --issue-file issue.json --multi-agent
//!
//! The driver wires settings, config, and the artifacts directory into a
//! run state, invokes the workflow, and writes summary.json. The workspace
//! lives under WORKDIR as <owner__repo>/{repo,artifacts}; without --repo
//! the repository is cloned from REPO_URL (GITHUB_TOKEN injected for
//! private repos). Everything inside the loop is recoverable; a
//! driver-level failure writes run_error.txt and exits non-zero.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use devtwin_agent::{RunState, Workflow};
use devtwin_core::{DevtwinConfig, Issue, Settings, Summary};
use devtwin_llm::make_provider;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "devtwin",
    about = "Autonomous software-engineering agent: issue in, patch out",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent against a repository working tree
    Run {
        /// Path to a writable repository working tree
        /// (default: clone REPO_URL into WORKDIR)
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Issue title (ignored when --issue-file is given)
        #[arg(long)]
        title: Option<String>,

        /// Issue body
        #[arg(long, default_value = "")]
        body: String,

        /// JSON file with {number, title, body, labels}
        #[arg(long)]
        issue_file: Option<PathBuf>,

        /// Artifacts directory (default: WORKDIR/<repo>/artifacts)
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Use the multi-agent workflow instead of the unified agent
        #[arg(long, default_value_t = false)]
        multi_agent: bool,

        /// Hard ceiling on coder iterations in the multi-agent workflow
        #[arg(long, default_value_t = 10)]
        max_loops: usize,

        /// Path to a custom configuration file
        #[arg(long)]
        config_file: Option<PathBuf>,

        /// Configuration overrides as dotted key=value pairs
        /// (e.g. --config agents.unified.max_steps=300)
        #[arg(long = "config")]
        config_overrides: Vec<String>,
    },
}

/// Normalize a repository reference into an https URL. Accepts
/// `git@github.com:owner/repo(.git)`, `https://...`, and bare
/// `owner/repo(.git)` (assumed GitHub).
fn to_https_url(repo_url: &str) -> String {
    if let Some(path) = repo_url.strip_prefix("git@github.com:") {
        let path = if path.ends_with(".git") {
            path.to_string()
        } else {
            format!("{path}.git")
        };
        return format!("https://github.com/{path}");
    }
    if repo_url.starts_with("http://") || repo_url.starts_with("https://") {
        return repo_url.to_string();
    }
    let is_owner_repo = {
        let mut parts = repo_url.split('/');
        matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        ) && repo_url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'))
    };
    if is_owner_repo {
        let path = if repo_url.ends_with(".git") {
            repo_url.to_string()
        } else {
            format!("{repo_url}.git")
        };
        return format!("https://github.com/{path}");
    }
    repo_url.to_string()
}

/// Inject a token into an https URL that carries no userinfo yet.
fn with_token(url: &str, token: Option<&str>) -> String {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return url.to_string();
    };
    if url.starts_with("https://") && !url.contains('@') {
        return url.replacen("https://", &format!("https://{token}@"), 1);
    }
    url.to_string()
}

/// `owner__repo` directory name for the workspace layout.
fn repo_slug(repo_url: &str) -> String {
    let url = to_https_url(repo_url);
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let mut segments = trimmed.rsplit('/');
    let name = segments.next().unwrap_or("repo");
    match segments.next().filter(|s| !s.is_empty() && !s.contains(':')) {
        Some(owner) => format!("{owner}__{name}"),
        None => name.to_string(),
    }
}

/// Fresh clone with system git; non-interactive, token-authenticated.
/// On failure a clone_error.txt marker (without the token) lands in the
/// artifacts directory.
async fn clone_repo(settings: &Settings, dest_dir: &Path, artifacts_dir: &Path) -> Result<()> {
    let repo_url = settings
        .repo_url
        .as_deref()
        .context("either --repo or REPO_URL is required")?;
    // Existing (even empty) targets would make the clone a no-op
    if dest_dir.exists() {
        std::fs::remove_dir_all(dest_dir)?;
    }
    if let Some(parent) = dest_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let public_url = to_https_url(repo_url);
    let url = with_token(&public_url, settings.github_token.as_deref());
    info!("cloning {} into {}", public_url, dest_dir.display());

    let output = tokio::process::Command::new("git")
        .arg("clone")
        .arg(&url)
        .arg(dest_dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_ASKPASS", "echo")
        .output()
        .await
        .context("failed to run git clone")?;

    if !output.status.success() || !dest_dir.join(".git").exists() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = std::fs::write(
            artifacts_dir.join("clone_error.txt"),
            format!("{stderr}\nURL={public_url}"),
        );
        bail!("git clone failed: {}", stderr.trim());
    }
    Ok(())
}

fn load_issue(issue_file: Option<&Path>, title: Option<String>, body: String) -> Result<Issue> {
    if let Some(path) = issue_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read issue file {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("invalid issue JSON in {}", path.display()));
    }
    let title = title.context("either --title or --issue-file is required")?;
    Ok(Issue {
        number: None,
        title,
        body,
        labels: vec!["dev-twin".into()],
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    repo: Option<PathBuf>,
    title: Option<String>,
    body: String,
    issue_file: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    multi_agent: bool,
    max_loops: usize,
    config_file: Option<PathBuf>,
    config_overrides: Vec<String>,
) -> Result<()> {
    let settings = Settings::from_env()?;
    let config = DevtwinConfig::load_or_default(config_file.as_deref(), &config_overrides)?;
    let issue = load_issue(issue_file.as_deref(), title, body)?;

    // Workspace layout under WORKDIR: <owner__repo>/{repo,artifacts}
    let local_tree = repo.is_some();
    let (repo_dir, workspace) = match repo {
        Some(path) => {
            let repo_dir = path
                .canonicalize()
                .with_context(|| format!("repo dir not found: {}", path.display()))?;
            let name = repo_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "repo".into());
            let workspace = settings.workdir.join(name);
            (repo_dir, workspace)
        }
        None => {
            let slug = repo_slug(
                settings
                    .repo_url
                    .as_deref()
                    .context("either --repo or REPO_URL is required")?,
            );
            let workspace = settings.workdir.join(slug);
            (workspace.join("repo"), workspace)
        }
    };
    let artifacts_dir = artifacts.unwrap_or_else(|| workspace.join("artifacts"));
    std::fs::create_dir_all(&artifacts_dir)?;

    if !local_tree {
        clone_repo(&settings, &repo_dir, &artifacts_dir).await?;
    }

    // Issue statement goes into the artifacts as early as possible
    let issue_md = format!("# Issue\n\n**Title**: {}\n\n{}\n", issue.title, issue.body);
    let _ = std::fs::write(artifacts_dir.join("issue.md"), issue_md);

    let provider = make_provider(&settings, &config);
    let mut state = RunState::new(settings, config, issue, &repo_dir, &artifacts_dir);

    info!(
        "run: repo={} artifacts={} mode={}",
        repo_dir.display(),
        artifacts_dir.display(),
        if multi_agent { "multi" } else { "unified" }
    );

    let workflow = Workflow::new(max_loops);
    let run_result = if multi_agent {
        workflow.run_multi(&mut state, provider.as_ref()).await
    } else {
        workflow.run_unified(&mut state, provider.as_ref()).await
    };
    if let Err(e) = run_result {
        let _ = std::fs::write(artifacts_dir.join("run_error.txt"), e.to_string());
        return Err(e.into());
    }

    // Persist the remaining artifacts the nodes did not already write
    if let Some(analysis) = &state.analysis {
        let _ = std::fs::write(
            artifacts_dir.join("analysis.json"),
            serde_json::to_string_pretty(analysis)?,
        );
    }
    let _ = std::fs::write(
        artifacts_dir.join("transcript.json"),
        serde_json::to_string_pretty(&state.transcript)?,
    );

    let iteration = state.iteration.clone().unwrap_or_default();
    let mut summary = Summary::new(iteration.done, &iteration.commit_message);
    if let Some(last_test) = &state.last_test {
        summary
            .extra
            .insert("test_exit_code".into(), json!(last_test.exit_code));
        summary
            .extra
            .insert("tests".into(), json!(last_test.command.clone()));
    }
    std::fs::write(
        artifacts_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary)?,
    )?;

    if iteration.done {
        info!("run complete: {}", iteration.commit_message);
    } else {
        info!("run ended incomplete; review the transcript for progress");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            repo,
            title,
            body,
            issue_file,
            artifacts,
            multi_agent,
            max_loops,
            config_file,
            config_overrides,
        } => {
            run_command(
                repo,
                title,
                body,
                issue_file,
                artifacts,
                multi_agent,
                max_loops,
                config_file,
                config_overrides,
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization_accepts_common_forms() {
        assert_eq!(
            to_https_url("git@github.com:owner/repo.git"),
            "https://github.com/owner/repo.git"
        );
        assert_eq!(
            to_https_url("git@github.com:owner/repo"),
            "https://github.com/owner/repo.git"
        );
        assert_eq!(
            to_https_url("owner/repo"),
            "https://github.com/owner/repo.git"
        );
        assert_eq!(
            to_https_url("https://github.com/owner/repo"),
            "https://github.com/owner/repo"
        );
        // Not an owner/repo slug: left untouched
        assert_eq!(to_https_url("not a url"), "not a url");
    }

    #[test]
    fn token_injection_only_on_bare_https() {
        assert_eq!(
            with_token("https://github.com/o/r.git", Some("tok")),
            "https://tok@github.com/o/r.git"
        );
        assert_eq!(
            with_token("https://user@github.com/o/r.git", Some("tok")),
            "https://user@github.com/o/r.git"
        );
        assert_eq!(with_token("https://github.com/o/r.git", None), "https://github.com/o/r.git");
    }

    #[test]
    fn slug_is_owner_and_repo() {
        assert_eq!(repo_slug("https://github.com/owner/repo.git"), "owner__repo");
        assert_eq!(repo_slug("owner/repo"), "owner__repo");
        assert_eq!(repo_slug("git@github.com:owner/repo.git"), "owner__repo");
    }
}
