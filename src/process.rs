//! Process supervision for dev-runner
//!
//! The `Supervisor` owns every child process it launches. One mutex guards
//! the config store, the live process map, the per-port log buffers and the
//! event bus, so a mutation and the events it causes are always observed
//! together and in order.
//!
//! Lifecycle per port: `Free → Running → Free`. An assignment is recorded only
//! after a confirmed spawn, and removed when the child exits, when it is
//! unassigned, or when its app or port is deleted.

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::events::{BusEvent, EventBus};
use crate::ports::{
    force_kill_group_members, force_kill_process_group, is_group_alive, is_process_running,
    terminate_group_members, terminate_process_group,
};
use crate::store::ConfigStore;
use crate::types::{
    default_app_icon, default_app_type, AggregateState, AppDef, AppInput, AssignmentStatus,
    AssignmentView, PortCategory, PORT_PLACEHOLDER,
};

/// Lines kept per port
pub const LOG_BUFFER_CAPACITY: usize = 200;

/// Longest single log entry; longer output is split across entries
pub const MAX_LOG_ENTRY_BYTES: usize = 4096;

/// Bytes requested per read from a child's stdout or stderr
const READ_CHUNK_SIZE: usize = 8192;

/// How long the exit watcher waits for the output pipes to drain
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const APP_ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const VITE_CONFIG_FILES: &[&str] = &[
    "vite.config.js",
    "vite.config.ts",
    "vite.config.mjs",
    "svelte.config.js",
    "svelte.config.ts",
];

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Spawn(String),
    #[error("Failed to persist state: {0}")]
    Persist(String),
}

impl SupervisorError {
    /// HTTP status the API layer reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SupervisorError::Validation(_) => 400,
            SupervisorError::NotFound(_) => 404,
            SupervisorError::Conflict(_) => 409,
            SupervisorError::Spawn(_) | SupervisorError::Persist(_) => 500,
        }
    }
}

// ============================================================================
// STATE TYPES
// ============================================================================

/// Bounded FIFO of output lines for one port
#[derive(Debug, Default, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
}

impl LogBuffer {
    pub fn push(&mut self, line: String) {
        if self.lines.len() >= LOG_BUFFER_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A live child bound to a port
struct RunningProcess {
    /// Distinguishes this child from earlier ones on the same port
    generation: u64,
    pid: u32,
    app_id: String,
    stop_tx: oneshot::Sender<()>,
}

struct SupervisorInner {
    store: ConfigStore,
    running: HashMap<u16, RunningProcess>,
    logs: HashMap<u16, LogBuffer>,
    bus: EventBus,
    next_generation: u64,
}

/// Cloneable handle to the shared supervisor state
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Mutex<SupervisorInner>>,
    kill_grace: Duration,
}

// ============================================================================
// COMMAND RENDERING
// ============================================================================

/// A fully resolved command ready to spawn
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment needed by the framework (on top of `PORT`)
    pub env: BTreeMap<String, String>,
}

impl LaunchPlan {
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        shell_words::join(parts)
    }
}

pub fn command_basename(command: &str) -> String {
    Path::new(command)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(command)
        .to_lowercase()
}

pub fn is_package_manager_command(command: &str) -> bool {
    matches!(
        command_basename(command).as_str(),
        "pnpm" | "npm" | "yarn" | "bun"
    )
}

fn mentions(argv: &[String], needle: &str) -> bool {
    argv.iter().any(|arg| arg.contains(needle))
}

fn has_port_flag(argv: &[String]) -> bool {
    argv.iter().any(|arg| arg == "--port" || arg.starts_with("--port="))
}

fn ends_with_port_number(arg: Option<&String>) -> bool {
    let Some(arg) = arg else {
        return false;
    };
    static TRAILING_PORT: OnceLock<Option<regex::Regex>> = OnceLock::new();
    TRAILING_PORT
        .get_or_init(|| regex::Regex::new(r"\d{4,5}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(arg))
}

/// Split a stored command into argv and bind it to `port`.
///
/// `{PORT}` tokens are substituted. Commands without a token get the port
/// injected the way their framework expects it.
pub fn render_launch(command: &str, cwd: &Path, port: u16) -> Result<LaunchPlan, String> {
    let argv =
        shell_words::split(command).map_err(|e| format!("Failed to parse command: {}", e))?;
    render_argv(argv, cwd, port)
}

/// Bind an already split argv to `port`
pub fn render_argv(mut argv: Vec<String>, cwd: &Path, port: u16) -> Result<LaunchPlan, String> {
    if argv.is_empty() {
        return Err("Command is empty".to_string());
    }

    let port_str = port.to_string();
    let mut env = BTreeMap::new();

    if mentions(&argv, PORT_PLACEHOLDER) {
        for arg in argv.iter_mut() {
            *arg = arg.replace(PORT_PLACEHOLDER, &port_str);
        }
        if mentions(&argv, "flask") {
            env.insert("FLASK_RUN_PORT".to_string(), port_str);
        }
    } else {
        inject_port(&mut argv, &mut env, cwd, &port_str);
    }

    let program = argv.remove(0);
    Ok(LaunchPlan {
        program,
        args: argv,
        env,
    })
}

fn inject_port(argv: &mut Vec<String>, env: &mut BTreeMap<String, String>, cwd: &Path, port: &str) {
    let has_vite_config = VITE_CONFIG_FILES.iter().any(|f| cwd.join(f).exists());

    if has_vite_config && !has_port_flag(argv) {
        // Vite ignores PORT; the flag must reach the script, not the package manager
        let needs_separator = argv
            .first()
            .is_some_and(|program| is_package_manager_command(program))
            && !argv.iter().any(|arg| arg == "--");
        if needs_separator {
            argv.push("--".to_string());
        }
        argv.push("--port".to_string());
        argv.push(port.to_string());
    } else if mentions(argv, "manage.py")
        && mentions(argv, "runserver")
        && !ends_with_port_number(argv.last())
    {
        argv.push(port.to_string());
    } else if mentions(argv, "uvicorn") && !has_port_flag(argv) {
        argv.push("--port".to_string());
        argv.push(port.to_string());
    } else if mentions(argv, "flask") && !has_port_flag(argv) {
        argv.push("--port".to_string());
        argv.push(port.to_string());
        env.insert("FLASK_RUN_PORT".to_string(), port.to_string());
    }
}

// ============================================================================
// OUTPUT CAPTURE
// ============================================================================

/// Append `bytes` to `carry` and return everything that decodes, keeping an
/// incomplete trailing UTF-8 sequence in `carry` for the next read.
fn decode_output(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    let incomplete = match std::str::from_utf8(carry) {
        Err(e) if e.error_len().is_none() => carry.len() - e.valid_up_to(),
        _ => 0,
    };
    let tail = carry.split_off(carry.len() - incomplete);
    let text = String::from_utf8_lossy(carry).into_owned();
    *carry = tail;
    text
}

/// Turn one read of output into log entries: one per line, the trailing
/// partial line as its own entry, none longer than `MAX_LOG_ENTRY_BYTES`.
fn output_entries(text: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for line in text.split_terminator('\n') {
        let mut rest = line.trim_end_matches('\r');
        while rest.len() > MAX_LOG_ENTRY_BYTES {
            let mut cut = MAX_LOG_ENTRY_BYTES;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            entries.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        entries.push(rest.to_string());
    }
    entries
}

fn resolve_cwd(cwd: &str) -> Result<PathBuf, String> {
    if cwd.is_empty() {
        std::env::current_dir().map_err(|e| format!("Failed to resolve working directory: {}", e))
    } else {
        Ok(PathBuf::from(cwd))
    }
}

fn generate_app_id() -> String {
    nanoid::nanoid!(10, &APP_ID_ALPHABET)
}

fn describe_exit(status: &std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => match status.code() {
            Some(code) => code.to_string(),
            None => describe_signal(status),
        },
        Err(e) => format!("unknown ({})", e),
    }
}

#[cfg(unix)]
fn describe_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("null (signal {})", signal),
        None => "null".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: &ExitStatus) -> String {
    "null".to_string()
}

fn validate_required(field: &str, value: Option<&str>) -> Result<(), SupervisorError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(SupervisorError::Validation(format!("{} is required", field))),
    }
}

// ============================================================================
// INNER STATE OPERATIONS
// ============================================================================

impl SupervisorInner {
    fn push_log(&mut self, port: u16, line: String) {
        self.logs.entry(port).or_default().push(line.clone());
        self.bus.publish(BusEvent::Log { port, line });
    }

    fn publish_state(&mut self) {
        let state = self.aggregate();
        self.bus.publish(BusEvent::State(state));
    }

    fn persist(&self) -> Result<(), SupervisorError> {
        self.store.save().map_err(SupervisorError::Persist)
    }

    fn aggregate(&self) -> AggregateState {
        let assignments = self
            .store
            .snapshot()
            .assignments
            .iter()
            .map(|(port, app_id)| {
                let running = self
                    .running
                    .get(port)
                    .is_some_and(|p| &p.app_id == app_id);
                let view = AssignmentView {
                    app_id: app_id.clone(),
                    status: if running {
                        AssignmentStatus::Running
                    } else {
                        AssignmentStatus::Assigned
                    },
                    app: self.store.find_app(app_id).cloned(),
                };
                (*port, view)
            })
            .collect();

        AggregateState {
            apps: self.store.apps().to_vec(),
            ports: self.store.ports().clone(),
            assignments,
        }
    }

    /// Signal the process on `port`, if any, and forget it. Never blocks:
    /// the exit watcher handles escalation and reaping.
    fn stop_process(&mut self, port: u16) -> Option<u32> {
        let process = self.running.remove(&port)?;
        info!(
            "Stopping process on port {} (pid {}, app {})",
            port, process.pid, process.app_id
        );
        terminate_process_group(process.pid);
        let _ = process.stop_tx.send(());
        self.push_log(port, "[Process stopped]".to_string());
        Some(process.pid)
    }

    /// Tear down whatever occupies `port`. Returns true if anything changed.
    fn release_port(&mut self, port: u16) -> bool {
        let stopped = self.stop_process(port).is_some();
        let unassigned = self.store.remove_assignment(port).is_some();
        stopped || unassigned
    }

    fn fail_spawn(&mut self, port: u16, message: String) -> SupervisorError {
        error!("Failed to start process on port {}: {}", port, message);
        self.push_log(port, format!("[Error: {}]", message));
        if self.store.remove_assignment(port).is_some() {
            if let Err(e) = self.store.save() {
                warn!("Failed to persist after spawn error: {}", e);
            }
        }
        self.publish_state();
        SupervisorError::Spawn(message)
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

impl Supervisor {
    pub fn new(store: ConfigStore, kill_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SupervisorInner {
                store,
                running: HashMap::new(),
                logs: HashMap::new(),
                bus: EventBus::new(),
                next_generation: 1,
            })),
            kill_grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Supervisor lock poisoned, recovering state");
            poisoned.into_inner()
        })
    }

    // ==================== PROCESS LIFECYCLE ====================

    /// Launch `app_id` on `port`, replacing whatever runs there.
    ///
    /// Must be called from within a tokio runtime. Returns the child's pid.
    pub fn assign(&self, app_id: &str, port: u16) -> Result<u32, SupervisorError> {
        if port == 0 {
            return Err(SupervisorError::Validation(
                "port must be between 1 and 65535".to_string(),
            ));
        }

        let mut inner = self.lock();
        let app = inner
            .store
            .find_app(app_id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(format!("app not found: {}", app_id)))?;

        inner.stop_process(port);
        inner.logs.insert(port, LogBuffer::default());

        let launch = resolve_cwd(&app.cwd)
            .and_then(|cwd| render_launch(&app.command, &cwd, port).map(|plan| (cwd, plan)));
        let (cwd, plan) = match launch {
            Ok(resolved) => resolved,
            Err(message) => return Err(inner.fail_spawn(port, message)),
        };

        inner.push_log(
            port,
            format!("[Starting process: {} in {}]", plan.display(), cwd.display()),
        );

        let mut command = Command::new(&plan.program);
        command
            .args(&plan.args)
            .current_dir(&cwd)
            .envs(&app.env)
            .envs(&plan.env)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Leader of its own group so the whole tree can be signalled
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to spawn '{}': {}", plan.program, e);
                return Err(inner.fail_spawn(port, message));
            }
        };

        let pid = child.id().unwrap_or_default();
        let generation = inner.next_generation;
        inner.next_generation += 1;
        let (stop_tx, stop_rx) = oneshot::channel();

        inner.running.insert(
            port,
            RunningProcess {
                generation,
                pid,
                app_id: app.id.clone(),
                stop_tx,
            },
        );
        inner.store.set_assignment(port, &app.id);
        let persisted = inner.persist();
        inner.publish_state();

        info!(
            "Started {} on port {} (pid {}): {}",
            app.name,
            port,
            pid,
            plan.display()
        );

        let readers: Vec<JoinHandle<()>> = [
            child
                .stdout
                .take()
                .map(|out| self.spawn_output_reader(port, generation, out)),
            child
                .stderr
                .take()
                .map(|err| self.spawn_output_reader(port, generation, err)),
        ]
        .into_iter()
        .flatten()
        .collect();
        self.spawn_exit_watcher(port, generation, pid, child, stop_rx, readers);

        persisted?;
        Ok(pid)
    }

    /// Stop whatever runs on `port` and drop its assignment. No-op when idle.
    pub fn unassign(&self, port: u16) -> Result<(), SupervisorError> {
        let mut inner = self.lock();
        if !inner.release_port(port) {
            return Ok(());
        }
        let persisted = inner.persist();
        inner.publish_state();
        persisted
    }

    /// Current log buffer for `port` (empty if none)
    pub fn logs_for(&self, port: u16) -> Vec<String> {
        self.lock()
            .logs
            .get(&port)
            .map(LogBuffer::lines)
            .unwrap_or_default()
    }

    /// SIGTERM every supervised process group, wait up to the grace period,
    /// then SIGKILL the survivors. Assignments are cleared.
    pub async fn shutdown_all(&self) {
        let pids: Vec<u32> = {
            let mut inner = self.lock();
            let ports: Vec<u16> = inner.running.keys().copied().collect();
            let pids = ports
                .into_iter()
                .filter_map(|port| inner.stop_process(port))
                .collect();
            inner.store.clear_assignments();
            if let Err(e) = inner.store.save() {
                warn!("Failed to persist during shutdown: {}", e);
            }
            inner.publish_state();
            pids
        };

        if pids.is_empty() {
            return;
        }
        info!("Waiting for {} process group(s) to exit", pids.len());

        let deadline = tokio::time::Instant::now() + self.kill_grace;
        while tokio::time::Instant::now() < deadline {
            if !pids.iter().any(|pid| is_process_running(*pid)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for pid in pids.iter().filter(|pid| is_process_running(**pid)) {
            warn!("Process group {} still alive after shutdown grace, killing", pid);
            force_kill_process_group(*pid);
        }
    }

    // ==================== APPS ====================

    pub fn apps(&self) -> Vec<AppDef> {
        self.lock().store.apps().to_vec()
    }

    pub fn create_app(&self, input: AppInput) -> Result<AppDef, SupervisorError> {
        validate_required("name", input.name.as_deref())?;
        validate_required("command", input.command.as_deref())?;

        let mut inner = self.lock();
        let mut id = generate_app_id();
        while inner.store.find_app(&id).is_some() {
            id = generate_app_id();
        }

        let mut app = AppDef {
            id,
            name: String::new(),
            app_type: default_app_type(),
            icon: default_app_icon(),
            command: String::new(),
            cwd: String::new(),
            env: BTreeMap::new(),
            framework: String::new(),
        };
        input.apply_to(&mut app);

        inner.store.insert_app(app.clone());
        let persisted = inner.persist();
        inner.publish_state();
        persisted?;

        info!("Created app {} ({})", app.name, app.id);
        Ok(app)
    }

    /// Patch the fields present in `input`. A running process keeps its
    /// original command until it is reassigned.
    pub fn update_app(&self, id: &str, input: AppInput) -> Result<AppDef, SupervisorError> {
        if input.name.is_some() {
            validate_required("name", input.name.as_deref())?;
        }
        if input.command.is_some() {
            validate_required("command", input.command.as_deref())?;
        }

        let mut inner = self.lock();
        let app = inner
            .store
            .find_app_mut(id)
            .ok_or_else(|| SupervisorError::NotFound(format!("app not found: {}", id)))?;
        input.apply_to(app);
        let updated = app.clone();

        let persisted = inner.persist();
        inner.publish_state();
        persisted?;
        Ok(updated)
    }

    /// Delete an app, tearing down every port it occupies first.
    /// Unknown ids are not an error.
    pub fn delete_app(&self, id: &str) -> Result<(), SupervisorError> {
        let mut inner = self.lock();

        let mut ports = inner.store.ports_assigned_to(id);
        ports.extend(
            inner
                .running
                .iter()
                .filter(|(_, p)| p.app_id == id)
                .map(|(port, _)| *port),
        );
        ports.sort_unstable();
        ports.dedup();

        let mut changed = false;
        for port in ports {
            changed |= inner.release_port(port);
        }
        changed |= inner.store.remove_app(id).is_some();

        if !changed {
            return Ok(());
        }
        info!("Deleted app {}", id);
        let persisted = inner.persist();
        inner.publish_state();
        persisted
    }

    // ==================== PORTS ====================

    pub fn add_port(&self, port: u16, category: PortCategory) -> Result<(), SupervisorError> {
        if port == 0 {
            return Err(SupervisorError::Validation(
                "port must be between 1 and 65535".to_string(),
            ));
        }

        let mut inner = self.lock();
        if !inner.store.ports_mut().insert(category, port) {
            return Err(SupervisorError::Conflict(format!(
                "port already exists: {}",
                port
            )));
        }
        let persisted = inner.persist();
        inner.publish_state();
        persisted
    }

    /// Remove a port record, stopping its process first
    pub fn remove_port(&self, port: u16) -> Result<(), SupervisorError> {
        let mut inner = self.lock();
        let released = inner.release_port(port);
        let removed = inner.store.ports_mut().remove(port);
        inner.logs.remove(&port);
        if !released && !removed {
            return Ok(());
        }
        let persisted = inner.persist();
        inner.publish_state();
        persisted
    }

    // ==================== OBSERVATION ====================

    pub fn state(&self) -> AggregateState {
        self.lock().aggregate()
    }

    /// Register an observer. The first event it receives is the full state.
    pub fn subscribe(&self) -> mpsc::Receiver<BusEvent> {
        let mut inner = self.lock();
        let initial = BusEvent::State(inner.aggregate());
        inner.bus.subscribe(initial)
    }

    /// Disconnect every observer so long-lived streams can finish
    pub fn close_observers(&self) {
        self.lock().bus.close_all();
    }

    /// Pid of the process running on `port`, if any
    pub fn running_pid(&self, port: u16) -> Option<u32> {
        self.lock().running.get(&port).map(|p| p.pid)
    }

    // ==================== BACKGROUND TASKS ====================

    fn spawn_output_reader<R>(&self, port: u16, generation: u64, stream: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let mut carry = Vec::new();
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = decode_output(&mut carry, &buf[..n]);
                        supervisor.record_output(port, generation, output_entries(&text));
                    }
                    Err(e) => {
                        debug!("Output stream for port {} closed: {}", port, e);
                        break;
                    }
                }
            }
            if !carry.is_empty() {
                let text = String::from_utf8_lossy(&carry).into_owned();
                supervisor.record_output(port, generation, output_entries(&text));
            }
        })
    }

    fn record_output(&self, port: u16, generation: u64, entries: Vec<String>) {
        if entries.is_empty() {
            return;
        }
        let mut inner = self.lock();
        let is_current = inner
            .running
            .get(&port)
            .is_some_and(|p| p.generation == generation);
        if is_current {
            for entry in entries {
                inner.push_log(port, entry);
            }
        }
    }

    fn spawn_exit_watcher(
        &self,
        port: u16,
        generation: u64,
        pid: u32,
        mut child: Child,
        mut stop_rx: oneshot::Receiver<()>,
        readers: Vec<JoinHandle<()>>,
    ) {
        let supervisor = self.clone();
        let grace = self.kill_grace;
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = &mut stop_rx => None,
            };
            let status = match exited {
                Some(status) => status,
                None => wait_after_stop(&mut child, pid, grace).await,
            };
            // Descendants left behind by the leader would keep the port busy
            stop_leftover_group(port, pid, grace).await;

            let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, join_all(readers))
                .await
                .is_err()
            {
                debug!("Output for port {} still open after exit", port);
                for abort in aborts {
                    abort.abort();
                }
            }
            supervisor.handle_exit(port, generation, status);
        });
    }

    fn handle_exit(&self, port: u16, generation: u64, status: std::io::Result<ExitStatus>) {
        let mut inner = self.lock();
        let is_current = inner
            .running
            .get(&port)
            .is_some_and(|p| p.generation == generation);
        if !is_current {
            debug!("Stopped or replaced process on port {} exited", port);
            return;
        }
        let Some(process) = inner.running.remove(&port) else {
            return;
        };

        let code = describe_exit(&status);
        info!(
            "Process on port {} (pid {}) exited with code {}",
            port, process.pid, code
        );

        if inner.store.assignment(port) == Some(process.app_id.as_str()) {
            inner.store.remove_assignment(port);
        }
        if let Err(e) = inner.persist() {
            warn!("{}", e);
        }
        inner.push_log(port, format!("[Process exited with code {}]", code));
        inner.publish_state();
    }
}

#[cfg(unix)]
async fn wait_after_stop(
    child: &mut Child,
    pid: u32,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    if grace.is_zero() {
        return child.wait().await;
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                "Process group {} ignored SIGTERM for {:?}, sending SIGKILL",
                pid, grace
            );
            force_kill_process_group(pid);
            child.wait().await
        }
    }
}

/// SIGTERM whatever remains of the group after its leader is gone, then
/// SIGKILL it once `grace` runs out. A zero grace only sends SIGTERM.
async fn stop_leftover_group(port: u16, pid: u32, grace: Duration) {
    if !terminate_group_members(pid) {
        return;
    }
    debug!("Stopping leftover processes of group {} (port {})", pid, port);
    if grace.is_zero() {
        return;
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !is_group_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if force_kill_group_members(pid) {
        warn!(
            "Process group {} outlived its leader on port {}, sent SIGKILL",
            pid, port
        );
    }
}

#[cfg(not(unix))]
async fn wait_after_stop(
    child: &mut Child,
    _pid: u32,
    _grace: Duration,
) -> std::io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        debug!("Failed to kill child: {}", e);
    }
    child.wait().await
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ==================== COMMAND RENDERING ====================

    fn argv_of(plan: &LaunchPlan) -> Vec<String> {
        let mut argv = vec![plan.program.clone()];
        argv.extend(plan.args.iter().cloned());
        argv
    }

    #[test]
    fn test_command_basename_with_full_path() {
        assert_eq!(command_basename("/opt/homebrew/bin/pnpm"), "pnpm");
        assert_eq!(command_basename("/usr/bin/PNPM"), "pnpm");
        assert_eq!(command_basename("npm"), "npm");
    }

    #[test]
    fn test_is_package_manager_command() {
        assert!(is_package_manager_command("pnpm"));
        assert!(is_package_manager_command("/usr/local/bin/yarn"));
        assert!(is_package_manager_command("bun"));
        assert!(!is_package_manager_command("node"));
        assert!(!is_package_manager_command("python"));
    }

    #[test]
    fn test_render_substitutes_placeholder() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("python manage.py runserver {PORT}", temp.path(), 8123).unwrap();
        assert_eq!(argv_of(&plan), vec!["python", "manage.py", "runserver", "8123"]);
        assert!(plan.env.is_empty());
    }

    #[test]
    fn test_render_substitutes_placeholder_inside_argument() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("manage.py runserver 0.0.0.0:{PORT}", temp.path(), 9000).unwrap();
        assert_eq!(plan.args, vec!["runserver", "0.0.0.0:9000"]);
    }

    #[test]
    fn test_render_respects_quoting() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch(r#"sh -c "echo 'hello world'""#, temp.path(), 3000).unwrap();
        assert_eq!(plan.args, vec!["-c", "echo 'hello world'"]);
    }

    #[test]
    fn test_render_rejects_empty_and_unbalanced() {
        let temp = TempDir::new().unwrap();
        assert!(render_launch("   ", temp.path(), 3000).is_err());
        assert!(render_launch("echo \"unterminated", temp.path(), 3000).is_err());
    }

    #[test]
    fn test_render_vite_package_manager_gets_separator() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("vite.config.ts"), "").unwrap();

        let plan = render_launch("pnpm run dev", temp.path(), 5174).unwrap();
        assert_eq!(argv_of(&plan), vec!["pnpm", "run", "dev", "--", "--port", "5174"]);

        let plan = render_launch("npx vite", temp.path(), 5174).unwrap();
        assert_eq!(argv_of(&plan), vec!["npx", "vite", "--port", "5174"]);

        let plan = render_launch("pnpm run dev -- --port 4000", temp.path(), 5174).unwrap();
        assert_eq!(plan.args.last().map(String::as_str), Some("4000"));
    }

    #[test]
    fn test_render_vite_without_config_is_unchanged() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("pnpm run dev", temp.path(), 5174).unwrap();
        assert_eq!(argv_of(&plan), vec!["pnpm", "run", "dev"]);
    }

    #[test]
    fn test_render_django_appends_port_once() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("python manage.py runserver", temp.path(), 8001).unwrap();
        assert_eq!(plan.args, vec!["manage.py", "runserver", "8001"]);

        let plan = render_launch("python manage.py runserver 8000", temp.path(), 8001).unwrap();
        assert_eq!(plan.args, vec!["manage.py", "runserver", "8000"]);
    }

    #[test]
    fn test_render_uvicorn_and_flask() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("uvicorn main:app --reload", temp.path(), 8002).unwrap();
        assert_eq!(plan.args, vec!["main:app", "--reload", "--port", "8002"]);

        let plan = render_launch("python -m flask run", temp.path(), 8003).unwrap();
        assert_eq!(plan.args, vec!["-m", "flask", "run", "--port", "8003"]);
        assert_eq!(plan.env.get("FLASK_RUN_PORT").map(String::as_str), Some("8003"));
    }

    #[test]
    fn test_render_flask_placeholder_sets_env() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("python -m flask run --port {PORT}", temp.path(), 8004).unwrap();
        assert_eq!(plan.env.get("FLASK_RUN_PORT").map(String::as_str), Some("8004"));
    }

    #[test]
    fn test_render_plain_command_untouched() {
        let temp = TempDir::new().unwrap();
        let plan = render_launch("go run .", temp.path(), 8080).unwrap();
        assert_eq!(argv_of(&plan), vec!["go", "run", "."]);
        assert_eq!(plan.display(), "go run .");
    }

    // ==================== LOG BUFFER ====================

    #[test]
    fn test_log_buffer_evicts_oldest() {
        let mut buffer = LogBuffer::default();
        for i in 0..(LOG_BUFFER_CAPACITY + 5) {
            buffer.push(format!("line {}", i));
        }
        let lines = buffer.lines();
        assert_eq!(lines.len(), LOG_BUFFER_CAPACITY);
        assert_eq!(lines[0], "line 5");
        assert_eq!(lines.last().unwrap(), &format!("line {}", LOG_BUFFER_CAPACITY + 4));
    }

    // ==================== OUTPUT CAPTURE ====================

    #[test]
    fn test_output_entries_keep_partial_line() {
        assert_eq!(
            output_entries("ready\r\nContinue? (Y/n) "),
            vec!["ready", "Continue? (Y/n) "]
        );
        assert_eq!(output_entries("a\n\nb\n"), vec!["a", "", "b"]);
        assert!(output_entries("").is_empty());
    }

    #[test]
    fn test_output_entries_cap_entry_size() {
        let long = "é".repeat(MAX_LOG_ENTRY_BYTES);
        let entries = output_entries(&long);
        assert!(entries.len() > 1);
        assert!(entries.iter().all(|e| e.len() <= MAX_LOG_ENTRY_BYTES));
        assert_eq!(entries.concat(), long);
    }

    #[test]
    fn test_decode_output_holds_split_utf8() {
        let bytes = "héllo".as_bytes();
        let mut carry = Vec::new();
        // Cut inside the two-byte 'é'
        assert_eq!(decode_output(&mut carry, &bytes[..2]), "h");
        assert_eq!(carry.len(), 1);
        assert_eq!(decode_output(&mut carry, &bytes[2..]), "éllo");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_decode_output_replaces_invalid_bytes() {
        let mut carry = Vec::new();
        assert_eq!(decode_output(&mut carry, b"a\xffb"), "a\u{FFFD}b");
        assert!(carry.is_empty());
    }

    // ==================== ERRORS ====================

    #[test]
    fn test_error_status_codes() {
        assert_eq!(SupervisorError::Validation("x".into()).status_code(), 400);
        assert_eq!(SupervisorError::NotFound("x".into()).status_code(), 404);
        assert_eq!(SupervisorError::Conflict("x".into()).status_code(), 409);
        assert_eq!(SupervisorError::Spawn("x".into()).status_code(), 500);
        assert_eq!(SupervisorError::Persist("x".into()).status_code(), 500);
    }

    #[test]
    fn test_generated_ids_are_lowercase_alphanumeric() {
        let id = generate_app_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    // ==================== APP & PORT RECORDS ====================

    fn supervisor(temp: &TempDir) -> Supervisor {
        let store = ConfigStore::open(temp.path().join("apps.json")).unwrap();
        Supervisor::new(store, Duration::from_millis(500))
    }

    fn input(name: &str, command: &str) -> AppInput {
        AppInput {
            name: Some(name.to_string()),
            command: Some(command.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_app_applies_defaults() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let app = sup.create_app(input("Web", "pnpm run dev")).unwrap();
        assert_eq!(app.app_type, "Service");
        assert_eq!(app.icon, "box");
        assert_eq!(app.cwd, "");
        assert_eq!(sup.apps().len(), 1);
    }

    #[test]
    fn test_create_app_requires_name_and_command() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let missing_name = AppInput {
            command: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(
            sup.create_app(missing_name),
            Err(SupervisorError::Validation(_))
        ));
        assert!(matches!(
            sup.create_app(input("Web", "  ")),
            Err(SupervisorError::Validation(_))
        ));
        assert!(sup.apps().is_empty());
    }

    #[test]
    fn test_update_app_partial_and_unknown() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let app = sup.create_app(input("Web", "pnpm run dev")).unwrap();

        let patch = AppInput {
            icon: Some("globe".into()),
            ..Default::default()
        };
        let updated = sup.update_app(&app.id, patch).unwrap();
        assert_eq!(updated.icon, "globe");
        assert_eq!(updated.name, "Web");

        assert!(matches!(
            sup.update_app("missing", AppInput::default()),
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_port_conflict_across_categories() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        sup.add_port(4100, PortCategory::Frontend).unwrap();
        assert!(matches!(
            sup.add_port(4100, PortCategory::Backend),
            Err(SupervisorError::Conflict(_))
        ));
        assert!(matches!(
            sup.add_port(0, PortCategory::Backend),
            Err(SupervisorError::Validation(_))
        ));
    }

    #[test]
    fn test_unassign_idle_port_is_noop() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let mut rx = sup.subscribe();
        assert!(rx.try_recv().is_ok());

        sup.unassign(4999).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_delete_unknown_app_is_ok() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        assert!(sup.delete_app("nope").is_ok());
    }

    #[test]
    fn test_subscribe_initial_state_then_mutations() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let mut rx = sup.subscribe();

        match rx.try_recv().unwrap() {
            BusEvent::State(state) => assert!(state.apps.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }

        sup.create_app(input("Web", "pnpm run dev")).unwrap();
        match rx.try_recv().unwrap() {
            BusEvent::State(state) => assert_eq!(state.apps.len(), 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_assign_unknown_app_is_not_found() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        assert!(matches!(
            sup.assign("missing", 3000),
            Err(SupervisorError::NotFound(_))
        ));
        assert!(sup.state().assignments.is_empty());
    }

    #[tokio::test]
    async fn test_assign_spawn_failure_narrates_and_clears() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let app = sup
            .create_app(input("Broken", "definitely-not-a-real-binary-xyz --flag"))
            .unwrap();

        let result = sup.assign(&app.id, 4321);
        assert!(matches!(result, Err(SupervisorError::Spawn(_))));
        assert!(sup.state().assignments.is_empty());
        assert!(sup.running_pid(4321).is_none());

        let logs = sup.logs_for(4321);
        assert!(logs.iter().any(|l| l.starts_with("[Starting process:")));
        assert!(logs.iter().any(|l| l.starts_with("[Error:")));
    }

    #[tokio::test]
    async fn test_assign_bad_quoting_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let sup = supervisor(&temp);
        let app = sup.create_app(input("Quote", "echo \"oops")).unwrap();

        assert!(matches!(
            sup.assign(&app.id, 4322),
            Err(SupervisorError::Spawn(_))
        ));
        assert!(sup.logs_for(4322).iter().any(|l| l.starts_with("[Error:")));
    }
}
