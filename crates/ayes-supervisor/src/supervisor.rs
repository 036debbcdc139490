//! Lifecycle orchestration: spawn, resume, crash-restart, idle-exit, and
//! graceful shutdown of one supervised assistant.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ayes_core::{ExitReason, ProcStatus, SupervisorError, SupervisorOutcome};
use ayes_lock::QueueLock;
use ayes_profile::{CompiledProfile, LinePolicy, ProfileTable, PromptMode, ResumeStyle, ToolProfile};
use ayes_registry::PidRegistry;
use ayes_session::{SessionStore, is_uuid, latest_session_file_id, resolve_session_dir};

use crate::bridge::{
    BridgeEvent, OutputEvent, PtyChild, host_pty_size, spawn_child, spawn_stdin_reader,
    stdin_channel, stdin_pump,
};
use crate::cleanup;
use crate::control::ControlResponder;
use crate::fifo::FifoChannel;
use crate::raw_mode::RawModeGuard;
use crate::respond::{AutoResponder, ResponderEvent, SessionCapture};
use crate::shared::{Shared, send_message};
use crate::strip::StreamStripper;

/// If no ready pattern fires within this window, force the latch open so
/// user input is never wedged behind a pattern that no longer matches.
const READY_FALLBACK: Duration = Duration::from_secs(10);
/// Grace period between the last exit command and the hard kill.
const KILL_TIMEOUT: Duration = Duration::from_secs(5);
/// Substrings in the rendered screen that mean the assistant is still
/// working even though the stream is quiet.
const WORKING_INDICATORS: &[&str] = &["esc to interrupt", "to run in background"];

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub tool: String,
    pub tool_args: Vec<String>,
    pub prompt: Option<String>,
    pub robust: bool,
    pub queue: bool,
    pub install: bool,
    pub resume: bool,
    pub idle: Option<Duration>,
    pub log_file: Option<PathBuf>,
    pub fifo: bool,
}

impl SupervisorOptions {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            tool_args: Vec::new(),
            prompt: None,
            robust: true,
            queue: true,
            install: false,
            resume: false,
            idle: None,
            log_file: None,
            fifo: false,
        }
    }
}

pub struct Supervisor;

impl Supervisor {
    /// Drive one assistant to completion. Returns the child's final exit
    /// code and the log locations.
    pub async fn run(opts: SupervisorOptions) -> Result<SupervisorOutcome> {
        let cwd = std::env::current_dir().context("cannot resolve working directory")?;
        let table = ProfileTable::load();
        Self::run_in(&table, &cwd, opts).await
    }

    pub async fn run_in(
        table: &ProfileTable,
        cwd: &Path,
        opts: SupervisorOptions,
    ) -> Result<SupervisorOutcome> {
        // 1. Tool validation.
        let profile = table
            .get(&opts.tool)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownTool(opts.tool.clone()))?;
        let profile = Arc::new(CompiledProfile::compile(profile)?);

        if std::env::var_os("CLAUDE_PPID").is_some() {
            debug!("running in sub-agent mode (CLAUDE_PPID is set)");
        }

        // 2. Queue lock.
        let queue_lock = if opts.queue {
            match ayes_lock::default_lock_path() {
                Some(lock_path) => {
                    let task = opts.prompt.clone().unwrap_or_else(|| opts.tool.clone());
                    let lock = QueueLock::acquire(&lock_path, cwd, &task).await?;
                    let pid = lock.pid();
                    let path_for_cleanup = lock_path.clone();
                    cleanup::on_exit(move || {
                        let _ = ayes_lock::release_pid(&path_for_cleanup, pid);
                    });
                    Some(lock)
                }
                None => {
                    warn!("no user config directory; queueing disabled for this run");
                    None
                }
            }
        } else {
            None
        };

        // 3. Registry and log paths (named after this supervisor pid, so
        // one invocation keeps one transcript across restarts).
        let registry = PidRegistry::open(cwd)?;
        let my_pid = std::process::id();
        let log_path = registry.log_path(my_pid);
        let raw_log_path = registry.raw_log_path(my_pid);

        // 4. Default args prefix.
        let mut cli_args = profile.profile.default_args.clone();
        cli_args.extend(opts.tool_args.iter().cloned());

        // 5. Resume argument.
        let session_store = Arc::new(Mutex::new(
            SessionStore::open_default().unwrap_or_else(|e| {
                warn!("session store unavailable: {e:#}");
                SessionStore::open(std::env::temp_dir().join("agent-yes-sessions.json"))
            }),
        ));
        if opts.resume {
            if profile.profile.resume.is_some() {
                let stored = current_session_id(&profile.profile, cwd, &session_store);
                match profile.profile.resume_args(stored.as_deref()) {
                    Some(resume_args) => {
                        debug!(?resume_args, "resuming prior session");
                        let mut prefixed = resume_args;
                        prefixed.extend(cli_args);
                        cli_args = prefixed;
                    }
                    None => {
                        return Err(SupervisorError::NoSessionToResume {
                            tool: opts.tool.clone(),
                        }
                        .into());
                    }
                }
            } else {
                warn!(tool = %opts.tool, "--continue ignored: tool does not support resumption");
            }
        }

        // 6. Prompt-as-argument transport.
        let mut runtime_prompt = opts.prompt.clone();
        match &profile.profile.prompt_mode {
            PromptMode::FirstPositional => {
                if let Some(p) = runtime_prompt.take() {
                    cli_args.insert(0, p);
                }
            }
            PromptMode::LastPositional => {
                if let Some(p) = runtime_prompt.take() {
                    cli_args.push(p);
                }
            }
            PromptMode::NamedFlag { flag } => {
                if let Some(p) = runtime_prompt.take() {
                    cli_args.push(flag.clone());
                    cli_args.push(p);
                }
            }
            PromptMode::StdinOnly => {}
        }

        // Binary lookup, with the install helper as the one retry.
        let binary = profile.profile.binary().to_string();
        if which::which(&binary).is_err() {
            let hint = profile.profile.install.clone();
            let installed = if opts.install {
                if let Some(cmd) = &hint {
                    info!(%cmd, "installing {}", opts.tool);
                    run_install(cmd).await
                } else {
                    false
                }
            } else {
                false
            };
            if !installed || which::which(&binary).is_err() {
                if let Some(cmd) = &hint {
                    eprintln!("'{binary}' is not installed. Install it with:\n  {cmd}");
                }
                return Err(SupervisorError::ChildNotFound {
                    tool: opts.tool.clone(),
                    install_hint: hint,
                }
                .into());
            }
        }

        let stdin_tty = host_stdin_is_tty();
        let stdout_tty = host_stdout_is_tty();
        let size = host_pty_size(stdout_tty);

        let shared = Arc::new(Shared::new());
        let (responder_tx, mut responder_events) = mpsc::unbounded_channel::<ResponderEvent>();
        let (bridge_tx, mut bridge_events) = mpsc::unbounded_channel::<BridgeEvent>();
        let (idle_tx, mut idle_events) = mpsc::unbounded_channel::<()>();

        // Host stdin: raw-mode passthrough when interactive.
        let raw_guard = if stdin_tty { RawModeGuard::enter() } else { None };
        #[cfg(unix)]
        if let Some(guard) = &raw_guard {
            let saved = guard.saved();
            cleanup::on_exit(move || crate::raw_mode::restore(&saved));
        }

        let (stdin_tx, stdin_rx) = stdin_channel();
        spawn_stdin_reader(stdin_tx.clone());
        tokio::spawn(stdin_pump(
            Arc::clone(&shared),
            stdin_rx,
            bridge_tx.clone(),
        ));

        // Append-prompt channel.
        let fifo = if opts.fifo {
            match FifoChannel::create(&registry.fifo_path(my_pid), stdin_tx.clone()) {
                Ok(f) => {
                    let fifo_path = f.path().to_path_buf();
                    cleanup::on_exit(move || {
                        let _ = std::fs::remove_file(&fifo_path);
                    });
                    Some(f)
                }
                Err(e) => {
                    warn!("append-prompt channel disabled: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        cleanup::install_signal_handlers();

        // 7. First spawn.
        let mut current = wire_child(&shared, &profile, &binary, &cli_args, cwd, size)
            .map_err(|e| spawn_failure(&opts.tool, e))?;
        let mut child_pid = current.pid;
        if let Some(pid) = child_pid {
            registry.register(pid, &opts.tool, &cli_args, runtime_prompt.as_deref())?;
        }
        {
            // On abnormal exits the child row may still read active; the
            // normal path has already marked it exited by the time this runs.
            let cwd_for_cleanup = cwd.to_path_buf();
            cleanup::on_exit(move || {
                if let Ok(reg) = PidRegistry::open(&cwd_for_cleanup) {
                    for row in reg.list().unwrap_or_default() {
                        if row.status != ProcStatus::Exited && !ayes_registry::pid_alive(row.pid) {
                            let _ = reg.update_status(
                                row.pid,
                                ProcStatus::Exited,
                                Some(ExitReason::StaleCleanup),
                                None,
                            );
                        }
                    }
                }
            });
        }

        // Renderer, logs, responder, control replies.
        let mut parser = vt100::Parser::new(size.rows, size.cols, 0);
        let mut raw_log = std::fs::File::create(&raw_log_path)
            .with_context(|| format!("failed creating {}", raw_log_path.display()))?;
        let mut responder = AutoResponder::new(
            Arc::clone(&profile),
            Arc::clone(&shared),
            responder_tx.clone(),
            session_capture(&profile.profile, cwd, &session_store),
        );
        let mut control = ControlResponder::new(!stdin_tty);
        let mut stdout_stripper = StreamStripper::new();

        // 9. Idle-exit arming.
        if let Some(window) = opts.idle {
            spawn_idle_wait(&shared, window, &idle_tx);
        }

        // 10. Initial prompt over the send-message protocol, once the
        // first ready fires.
        if let Some(prompt) = runtime_prompt.clone() {
            let shared_for_prompt = Arc::clone(&shared);
            tokio::spawn(async move {
                shared_for_prompt.first_ready.wait().await;
                info!("assistant ready, sending prompt");
                send_message(&shared_for_prompt, &prompt, true).await;
            });
        }

        #[cfg(unix)]
        let mut winch = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
            .ok()
            .filter(|_| stdout_tty);

        let mut robust_enabled = opts.robust;
        let mut exit_started = false;
        let mut forced_code: Option<i32> = None;
        let mut registry_status = ProcStatus::Active;
        let mut output_done = false;

        let final_code = loop {
            #[cfg(unix)]
            let winch_recv = async {
                match winch.as_mut() {
                    Some(w) => {
                        w.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            #[cfg(not(unix))]
            let winch_recv = std::future::pending::<()>();

            tokio::select! {
                event = current.output_rx.recv(), if !output_done => match event {
                    Some(OutputEvent::Data(bytes)) => {
                        process_output_chunk(
                            &bytes,
                            &shared,
                            &mut parser,
                            &mut raw_log,
                            &mut control,
                            &mut responder,
                            &mut stdout_stripper,
                            stdout_tty,
                        );

                        if registry_status != ProcStatus::Active {
                            registry_status = ProcStatus::Active;
                            if let Some(pid) = child_pid {
                                let _ = registry.update_status(pid, ProcStatus::Active, None, None);
                            }
                        }
                    }
                    Some(OutputEvent::Eof) | None => {
                        // Stream closed; the exit code arrives via exit_rx.
                        output_done = true;
                    }
                },

                code = &mut current.exit_rx => {
                    let code = code.unwrap_or(1);
                    debug!(code, "child exited");

                    // Drain the stream to EOF so the renderer and the
                    // transcript see everything the child wrote before
                    // dying. The reader thread delivers EOF shortly after
                    // the exit code; the timeout is a stuck-pipe guard.
                    loop {
                        match tokio::time::timeout(
                            Duration::from_secs(2),
                            current.output_rx.recv(),
                        )
                        .await
                        {
                            Ok(Some(OutputEvent::Data(bytes))) => process_output_chunk(
                                &bytes,
                                &shared,
                                &mut parser,
                                &mut raw_log,
                                &mut control,
                                &mut responder,
                                &mut stdout_stripper,
                                stdout_tty,
                            ),
                            Ok(Some(OutputEvent::Eof)) | Ok(None) | Err(_) => break,
                        }
                    }

                    if shared.restart_without_continue.swap(false, Ordering::SeqCst) {
                        // The resume attempt itself failed; relaunch clean.
                        shared.is_fatal.store(false, Ordering::SeqCst);
                        mark_exited(&registry, child_pid, ExitReason::Restarted, Some(code));
                        cli_args = strip_resume_args(&cli_args, &profile.profile);
                        info!(?cli_args, "restarting without resume arguments");

                        current = wire_child(&shared, &profile, &binary, &cli_args, cwd, size)
                            .map_err(|e| spawn_failure(&opts.tool, e))?;
                        child_pid = current.pid;
                        if let Some(pid) = child_pid {
                            registry.register(pid, &opts.tool, &cli_args, None)?;
                        }
                        responder = AutoResponder::new(
                            Arc::clone(&profile),
                            Arc::clone(&shared),
                            responder_tx.clone(),
                            session_capture(&profile.profile, cwd, &session_store),
                        );
                        registry_status = ProcStatus::Active;
                        output_done = false;
                        continue;
                    }

                    let is_fatal = shared.is_fatal.load(Ordering::SeqCst);
                    if code != 0
                        && robust_enabled
                        && profile.profile.restore_args.is_some()
                        && !is_fatal
                    {
                        // Crash: respawn so the assistant resumes its work.
                        mark_exited(&registry, child_pid, ExitReason::Restarted, Some(code));
                        let restore = restore_args_for(&profile.profile, cwd, &session_store);
                        let base = strip_resume_args(&cli_args, &profile.profile);
                        cli_args = restore;
                        cli_args.extend(base);
                        info!(?cli_args, "child crashed, restarting");

                        current = wire_child(&shared, &profile, &binary, &cli_args, cwd, size)
                            .map_err(|e| spawn_failure(&opts.tool, e))?;
                        child_pid = current.pid;
                        if let Some(pid) = child_pid {
                            registry.register(pid, &opts.tool, &cli_args, None)?;
                        }
                        responder = AutoResponder::new(
                            Arc::clone(&profile),
                            Arc::clone(&shared),
                            responder_tx.clone(),
                            session_capture(&profile.profile, cwd, &session_store),
                        );
                        registry_status = ProcStatus::Active;
                        output_done = false;
                        continue;
                    }

                    let reason = if is_fatal {
                        ExitReason::Fatal
                    } else if code == 0 {
                        ExitReason::Normal
                    } else {
                        ExitReason::Crash
                    };
                    mark_exited(&registry, child_pid, reason, Some(code));
                    break code;
                },

                Some(ResponderEvent::ExitRequested) = responder_events.recv() => {
                    if !exit_started {
                        exit_started = true;
                        robust_enabled = false;
                        spawn_exit_task(&shared, &profile.profile, &current);
                    }
                },

                Some(BridgeEvent::PreReadyInterrupt) = bridge_events.recv() => {
                    info!("interrupt before ready, aborting");
                    robust_enabled = false;
                    forced_code = Some(130);
                    signal_child(child_pid);
                },

                Some(()) = idle_events.recv() => {
                    let window = opts.idle.unwrap_or(Duration::ZERO);
                    if still_working(&parser.screen().contents()) {
                        debug!("idle window elapsed but assistant is still working");
                        if registry_status != ProcStatus::Idle {
                            registry_status = ProcStatus::Idle;
                            if let Some(pid) = child_pid {
                                let _ = registry.update_status(pid, ProcStatus::Idle, None, None);
                            }
                        }
                        shared.idle.ping();
                        spawn_idle_wait(&shared, window, &idle_tx);
                    } else if !exit_started {
                        info!(window_ms = window.as_millis() as u64, "idle, exiting");
                        exit_started = true;
                        robust_enabled = false;
                        if let Some(pid) = child_pid {
                            let _ = registry.update_status(pid, ProcStatus::Idle, None, None);
                        }
                        registry_status = ProcStatus::Idle;
                        spawn_exit_task(&shared, &profile.profile, &current);
                    }
                },

                _ = winch_recv => {
                    let new_size = host_pty_size(stdout_tty);
                    if let Err(e) = current.master.resize(new_size) {
                        warn!("PTY resize failed: {e}");
                    }
                    parser.set_size(new_size.rows, new_size.cols);
                },
            }
        };

        // Shutdown ordering: transcript, registry, lock, legacy log.
        shared.clear_writer();
        drop(fifo);

        let transcript = parser.screen().contents();
        if let Err(e) = std::fs::write(&log_path, &transcript) {
            warn!(path = %log_path.display(), "failed saving transcript: {e}");
        }
        registry.close();
        if let Some(mut lock) = queue_lock {
            if let Err(e) = lock.release() {
                warn!("queue lock release failed: {e:#}");
            }
        }
        if let Some(legacy) = &opts.log_file {
            if let Err(e) = std::fs::write(legacy, &transcript) {
                warn!(path = %legacy.display(), "failed writing legacy log file: {e}");
            }
        }
        drop(raw_guard);

        Ok(SupervisorOutcome {
            exit_code: forced_code.unwrap_or(final_code),
            log_path,
            raw_log_path,
        })
    }
}

/// One output chunk through the fan-out, in its fixed order: renderer,
/// raw log, control replies, auto-responder, host stdout, latches. The
/// renderer always sees the bytes before any derived reaction fires.
#[allow(clippy::too_many_arguments)]
fn process_output_chunk(
    bytes: &[u8],
    shared: &Arc<Shared>,
    parser: &mut vt100::Parser,
    raw_log: &mut std::fs::File,
    control: &mut ControlResponder,
    responder: &mut AutoResponder,
    stdout_stripper: &mut StreamStripper,
    stdout_tty: bool,
) {
    parser.process(bytes);
    if let Err(e) = raw_log.write_all(bytes) {
        warn!("raw log write failed: {e}");
    }

    let (row, col) = parser.screen().cursor_position();
    for reply in control.scan(bytes, (row + 1, col + 1)) {
        shared.write_to_child(&reply);
    }

    let text = String::from_utf8_lossy(bytes);
    responder.on_output(&text);

    write_host_stdout(bytes, stdout_tty, stdout_stripper);

    shared.idle.ping();
    shared.next_stdout.notify();
}

/// Spawn a child and wire it to the shared context: latch reset, writer
/// swap, ready fallback, and the no-split CPR nudge.
fn wire_child(
    shared: &Arc<Shared>,
    profile: &CompiledProfile,
    binary: &str,
    args: &[String],
    cwd: &Path,
    size: portable_pty::PtySize,
) -> Result<PtyChild> {
    // Nothing typed may race the child's boot sequence.
    shared.ready.unready();

    let child = spawn_child(binary, args, cwd, size)?;
    let writer = child
        .master
        .take_writer()
        .map_err(|e| anyhow::anyhow!("failed taking PTY writer: {e}"))?;
    shared.set_writer(writer);

    if profile.profile.line_policy == LinePolicy::NoSplit {
        shared.write_to_child(&ControlResponder::initial_cursor_reply());
    }

    let shared_for_fallback = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(READY_FALLBACK).await;
        if !shared_for_fallback.ready.is_ready() {
            warn!("no ready pattern within 10s, forcing the latch open");
        }
        shared_for_fallback.ready.ready();
        // The prompt must flow even when no ready pattern ever matches.
        shared_for_fallback.first_ready.fire();
    });

    Ok(child)
}

fn spawn_idle_wait(shared: &Arc<Shared>, window: Duration, tx: &mpsc::UnboundedSender<()>) {
    let shared = Arc::clone(shared);
    let tx = tx.clone();
    tokio::spawn(async move {
        shared.idle.wait(window).await;
        let _ = tx.send(());
    });
}

/// Graceful exit: send each exit command over the send-message protocol,
/// then hard-kill if the child outlives the grace period.
fn spawn_exit_task(shared: &Arc<Shared>, profile: &ToolProfile, current: &PtyChild) {
    let shared = Arc::clone(shared);
    let exit_commands = profile.exit_commands.clone();
    let mut killer = current.killer.clone_killer();
    tokio::spawn(async move {
        for cmd in &exit_commands {
            debug!(%cmd, "sending exit command");
            send_message(&shared, cmd, false).await;
        }
        tokio::time::sleep(KILL_TIMEOUT).await;
        debug!("kill timeout elapsed, terminating child");
        let _ = killer.kill();
    });
}

fn still_working(screen: &str) -> bool {
    WORKING_INDICATORS.iter().any(|w| screen.contains(w))
}

fn mark_exited(
    registry: &PidRegistry,
    child_pid: Option<u32>,
    reason: ExitReason,
    code: Option<i32>,
) {
    if let Some(pid) = child_pid {
        if let Err(e) = registry.update_status(pid, ProcStatus::Exited, Some(reason), code) {
            warn!("failed marking pid {pid} exited: {e:#}");
        }
    }
}

/// Authoritative session id: the assistant's own newest session file wins
/// over our store.
fn current_session_id(
    profile: &ToolProfile,
    cwd: &Path,
    store: &Arc<Mutex<SessionStore>>,
) -> Option<String> {
    if let Some(template) = &profile.session_dir {
        if let Some(dir) = resolve_session_dir(template, cwd) {
            if let Some(id) = latest_session_file_id(&dir) {
                return Some(id);
            }
        }
    }
    store.lock().unwrap().lookup(cwd).map(str::to_string)
}

fn session_capture(
    profile: &ToolProfile,
    cwd: &Path,
    store: &Arc<Mutex<SessionStore>>,
) -> Option<SessionCapture> {
    profile.resume.is_some().then(|| SessionCapture {
        store: Arc::clone(store),
        cwd: cwd.to_path_buf(),
    })
}

/// Arguments for a crash respawn: `resume <id>`-style when a session id is
/// known, else the profile's plain restore args.
fn restore_args_for(
    profile: &ToolProfile,
    cwd: &Path,
    store: &Arc<Mutex<SessionStore>>,
) -> Vec<String> {
    if profile.resume.is_some() {
        if let Some(id) = current_session_id(profile, cwd, store) {
            if let Some(args) = profile.resume_args(Some(&id)) {
                return args;
            }
        }
    }
    profile.restore_args.clone().unwrap_or_default()
}

/// Drop every resume-shaped argument: `--continue`, `--resume [<id>]`, and
/// the subcommand form (`resume <id>`) at the front.
fn strip_resume_args(args: &[String], profile: &ToolProfile) -> Vec<String> {
    let mut rest: &[String] = args;
    if let Some(ResumeStyle::Subcommand { prefix }) = &profile.resume {
        if rest.first() == Some(prefix) && rest.get(1).is_some_and(|a| is_uuid(a)) {
            rest = &rest[2..];
        }
    }

    let mut out = Vec::with_capacity(rest.len());
    let mut iter = rest.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--continue" {
            continue;
        }
        if arg == "--resume" {
            if iter.peek().is_some_and(|next| is_uuid(next)) {
                iter.next();
            }
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn signal_child(child_pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = child_pid {
        if let Ok(raw) = i32::try_from(pid) {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(raw),
                nix::sys::signal::Signal::SIGINT,
            );
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child_pid;
    }
}

async fn run_install(cmd: &str) -> bool {
    match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("install command failed to start: {e}");
            false
        }
    }
}

fn spawn_failure(tool: &str, err: anyhow::Error) -> anyhow::Error {
    SupervisorError::SpawnFailure {
        tool: tool.to_string(),
        message: format!("{err:#}"),
    }
    .into()
}

fn write_host_stdout(bytes: &[u8], stdout_tty: bool, stripper: &mut StreamStripper) {
    let mut stdout = std::io::stdout().lock();
    let result = if stdout_tty {
        stdout.write_all(bytes)
    } else {
        let text = String::from_utf8_lossy(bytes);
        stdout.write_all(stripper.push(&text).as_bytes())
    };
    if result.and_then(|()| stdout.flush()).is_err() {
        // Host stdout gone (e.g. pipe closed); keep supervising.
    }
}

fn host_stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: isatty only inspects the fd.
        unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn host_stdout_is_tty() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: isatty only inspects the fd.
        unsafe { libc::isatty(libc::STDOUT_FILENO) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
