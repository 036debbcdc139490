use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use ayes_profile::ProfileTable;
use ayes_supervisor::{Supervisor, SupervisorOptions};
use cli::{Cli, merge_prompt, split_prompt_words, tool_from_argv0};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("agent-yes: {e:#}");
            1
        }
    };
    ayes_supervisor::run_cleanups();
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let argv: Vec<String> = std::env::args().collect();
    let (left, prompt_words) = split_prompt_words(&argv);
    let cli = Cli::parse_from(&left);

    let verbose = cli.verbose || std::env::var_os("VERBOSE").is_some();
    let _log_guard = init_tracing(verbose);

    if cli.use_skills {
        tracing::warn!("--use-skills is accepted but ignored by this build");
    }

    let table = ProfileTable::load();

    // Script-name alias wins over the first positional.
    let argv0_tool = argv
        .first()
        .and_then(|a| tool_from_argv0(a))
        .filter(|t| table.get(t).is_some());

    let (tool, tool_args) = match argv0_tool {
        Some(tool) => (tool, cli.rest.clone()),
        None => {
            let mut rest = cli.rest.clone().into_iter();
            let tool = rest.next().ok_or_else(|| {
                anyhow::anyhow!(
                    "no tool given; known tools: {}",
                    table.tools().join(", ")
                )
            })?;
            (tool, rest.collect())
        }
    };

    let prompt = merge_prompt(cli.prompt.clone(), prompt_words);

    let opts = SupervisorOptions {
        tool,
        tool_args,
        prompt,
        robust: cli.effective_robust(),
        queue: cli.effective_queue(),
        install: cli.install,
        resume: cli.resume,
        idle: cli.idle,
        log_file: cli.log_file.clone(),
        fifo: cli.fifo,
    };

    let outcome = Supervisor::run(opts).await?;
    tracing::debug!(
        exit_code = outcome.exit_code,
        log = %outcome.log_path.display(),
        "supervision finished"
    );
    Ok(outcome.exit_code)
}

/// Stderr logging always; a per-pid debug trace file under
/// `.agent-yes/logs/` when verbose. The returned guard must live until
/// exit so the non-blocking writer flushes.
fn init_tracing(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    if verbose {
        if let Some((writer, guard)) = debug_log_writer() {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(file_layer)
                .init();
            return Some(guard);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    None
}

fn debug_log_writer() -> Option<(
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
)> {
    let cwd = std::env::current_dir().ok()?;
    let log_dir = cwd.join(ayes_registry::STATE_DIR_NAME).join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;

    let file_name = format!("{}.debug.log", std::process::id());
    let appender = tracing_appender::rolling::never(&log_dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}
