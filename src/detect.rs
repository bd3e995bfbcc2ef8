//! Stack detection for project directories
//!
//! Maps a directory to a runnable launch command by running an ordered chain
//! of probes. The first probe that recognises the directory wins. Detection
//! only reads the filesystem; it never spawns processes.

use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::types::PORT_PLACEHOLDER;

// ============================================================================
// TYPES
// ============================================================================

/// What a single probe reports when it recognises a directory
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub stack: String,
    /// argv vectors, one per process the stack needs
    pub commands: Vec<Vec<String>>,
    pub env: BTreeMap<String, String>,
}

impl Classification {
    fn new(stack: &str, commands: Vec<Vec<String>>) -> Self {
        Self {
            stack: stack.to_string(),
            commands,
            env: BTreeMap::new(),
        }
    }

    fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

/// Result of running the probe chain over a directory
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub stack: String,
    pub commands: Vec<Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub default_port: Option<u16>,
    /// True when the commands carry no `{PORT}` token and the stack is
    /// expected to read the `PORT` environment variable instead
    pub port_via_env: bool,
    pub detected: bool,
    pub reason: Option<String>,
}

impl Detection {
    fn undetected(reason: &str) -> Self {
        Self {
            stack: "Unknown".to_string(),
            commands: Vec::new(),
            env: BTreeMap::new(),
            default_port: None,
            port_via_env: false,
            detected: false,
            reason: Some(reason.to_string()),
        }
    }

    fn from_classification(c: Classification) -> Self {
        let has_placeholder = c
            .commands
            .iter()
            .flatten()
            .any(|arg| arg.contains(PORT_PLACEHOLDER));
        Self {
            default_port: default_port(&c.stack),
            port_via_env: !has_placeholder,
            detected: true,
            reason: None,
            stack: c.stack,
            commands: c.commands,
            env: c.env,
        }
    }
}

/// A single detection rule
pub trait Probe: Send + Sync {
    fn probe(&self, dir: &Path) -> Option<Classification>;
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// The built-in probe chain: manifest files first, then Python manifest
/// content, then bare Python scripts.
pub fn default_probes() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(NodeProbe),
        Box::new(DjangoProbe),
        Box::new(GoProbe),
        Box::new(GradleProbe),
        Box::new(MavenProbe),
        Box::new(FastApiProbe),
        Box::new(FlaskProbe),
        Box::new(PythonScriptProbe),
    ]
}

/// Detect the stack of `dir` with the built-in probe chain
pub fn detect(dir: &Path) -> Detection {
    detect_with(dir, &default_probes())
}

pub fn detect_with(dir: &Path, probes: &[Box<dyn Probe>]) -> Detection {
    if !dir.is_dir() {
        return Detection::undetected("directory not found");
    }

    for probe in probes {
        if let Some(classification) = probe.probe(dir) {
            if classification.commands.is_empty() {
                continue;
            }
            debug!("Detected {} in {:?}", classification.stack, dir);
            return Detection::from_classification(classification);
        }
    }

    Detection::undetected("no framework detected")
}

/// Conventional development port for a stack
pub fn default_port(stack: &str) -> Option<u16> {
    match stack {
        "Next.js" | "Nuxt" | "Remix" | "Expo" | "Node" | "Node (server+client)" => Some(3000),
        "Vite" | "SvelteKit" => Some(5173),
        "Django" | "FastAPI" | "Flask" | "Python" => Some(8000),
        "Go" | "Gradle" | "Maven" => Some(8080),
        _ => None,
    }
}

/// (type, icon) pair shown for apps created from a detection
pub fn app_metadata(stack: &str) -> (&'static str, &'static str) {
    match stack {
        "Next.js" | "Vite" | "Nuxt" | "SvelteKit" | "Remix" | "Expo" => ("Web", "globe"),
        "Node" | "Node (server+client)" | "Django" | "Flask" | "Go" => ("API", "code"),
        "FastAPI" => ("API", "zap"),
        "Gradle" | "Maven" => ("API", "server"),
        _ => ("Service", "box"),
    }
}

/// Shell-quote an argv for display and storage, leaving `{PORT}` tokens
/// bare. The result splits back into the same argv.
pub fn join_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            let bare = arg.replace(PORT_PLACEHOLDER, "0");
            if arg.contains(PORT_PLACEHOLDER) && shell_words::quote(&bare) == bare {
                arg.clone()
            } else {
                shell_words::quote(arg).into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn exists_any(dir: &Path, names: &[&str]) -> bool {
    names.iter().any(|name| dir.join(name).exists())
}

fn first_existing<'a>(dir: &Path, names: &[&'a str]) -> Option<&'a str> {
    names.iter().copied().find(|name| dir.join(name).exists())
}

fn read_text(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

const PYTHON_MANIFESTS: &[&str] = &[
    "requirements.txt",
    "requirements-dev.txt",
    "pyproject.toml",
    "Pipfile",
    "poetry.lock",
    "uv.lock",
];

/// Case-insensitive search for `needle` in any Python manifest
fn requirement_contains(dir: &Path, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    PYTHON_MANIFESTS.iter().any(|name| {
        let text = read_text(&dir.join(name));
        !text.is_empty() && text.to_lowercase().contains(&needle)
    })
}

// ============================================================================
// NODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    pub fn detect(dir: &Path) -> Self {
        if dir.join("pnpm-lock.yaml").exists() {
            PackageManager::Pnpm
        } else if dir.join("yarn.lock").exists() {
            PackageManager::Yarn
        } else if dir.join("bun.lockb").exists() {
            PackageManager::Bun
        } else {
            PackageManager::Npm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Bun => "bun",
        }
    }

    /// argv that runs a package.json script
    pub fn script(&self, name: &str) -> Vec<String> {
        match self {
            PackageManager::Yarn | PackageManager::Bun => argv(&[self.as_str(), name]),
            PackageManager::Npm | PackageManager::Pnpm => argv(&[self.as_str(), "run", name]),
        }
    }
}

/// Node framework rules: (stack, config files, dependency, script)
const NODE_FRAMEWORKS: &[(&str, &[&str], &str, &str)] = &[
    (
        "Next.js",
        &["next.config.js", "next.config.ts", "next.config.mjs", "next.config.cjs"],
        "next",
        "dev",
    ),
    ("Vite", &["vite.config.js", "vite.config.ts", "vite.config.mjs"], "vite", "dev"),
    ("Nuxt", &["nuxt.config.ts", "nuxt.config.js"], "nuxt", "dev"),
    ("SvelteKit", &["svelte.config.js", "svelte.config.ts"], "@sveltejs/kit", "dev"),
    ("Remix", &["remix.config.js", "remix.config.ts"], "@remix-run/dev", "dev"),
    ("Expo", &[], "expo", "start"),
];

pub struct NodeProbe;

impl Probe for NodeProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        let package_json = dir.join("package.json");
        if !package_json.exists() {
            return None;
        }

        // An unreadable manifest still counts as a Node project
        let pkg: Value = serde_json::from_str(&read_text(&package_json)).unwrap_or(Value::Null);
        let has_dep = |name: &str| {
            ["dependencies", "devDependencies"]
                .iter()
                .any(|section| pkg.get(section).and_then(|deps| deps.get(name)).is_some())
        };
        let pm = PackageManager::detect(dir);

        for &(stack, configs, dep, script) in NODE_FRAMEWORKS {
            if exists_any(dir, configs) || has_dep(dep) {
                return Some(Classification::new(stack, vec![pm.script(script)]));
            }
        }

        let has_script = |name: &str| {
            pkg.get("scripts")
                .and_then(|scripts| scripts.get(name))
                .is_some()
        };
        if has_script("dev:server") && has_script("dev:client") {
            return Some(Classification::new(
                "Node (server+client)",
                vec![pm.script("dev:server"), pm.script("dev:client")],
            ));
        }
        if let Some(script) = ["dev", "start", "serve"].into_iter().find(|s| has_script(s)) {
            return Some(Classification::new("Node", vec![pm.script(script)]));
        }

        if dir.join("tsconfig.json").exists() && dir.join("src/index.ts").exists() {
            return Some(Classification::new(
                "Node",
                vec![argv(&["pnpm", "exec", "ts-node", "src/index.ts"])],
            ));
        }
        if dir.join("dist/index.js").exists() {
            return Some(Classification::new("Node", vec![argv(&["node", "dist/index.js"])]));
        }
        first_existing(dir, &["index.js", "server.js"])
            .map(|entry| Classification::new("Node", vec![argv(&["node", entry])]))
    }
}

// ============================================================================
// PYTHON
// ============================================================================

/// Interpreter choice for Python stacks, decided from the filesystem alone
#[derive(Debug, Clone, PartialEq)]
pub struct PythonEnv {
    pub python: String,
    pub use_uv: bool,
}

impl PythonEnv {
    pub fn detect(dir: &Path) -> Self {
        let venv = dir.join(".venv").join("bin").join("python");
        if venv.exists() {
            return Self {
                python: venv.to_string_lossy().to_string(),
                use_uv: false,
            };
        }
        Self {
            python: "python".to_string(),
            use_uv: dir.join("uv.lock").exists(),
        }
    }

    fn wrap(&self, cmd: Vec<String>) -> Vec<String> {
        if self.use_uv && cmd.first().map(String::as_str) != Some("uv") {
            let mut wrapped = argv(&["uv", "run"]);
            wrapped.extend(cmd);
            wrapped
        } else {
            cmd
        }
    }

    fn command(&self, args: &[&str]) -> Vec<String> {
        let mut cmd = vec![self.python.clone()];
        cmd.extend(argv(args));
        self.wrap(cmd)
    }
}

pub struct DjangoProbe;

impl Probe for DjangoProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        if !dir.join("manage.py").exists() {
            return None;
        }
        let py = PythonEnv::detect(dir);
        Some(Classification::new(
            "Django",
            vec![py.command(&["manage.py", "runserver", PORT_PLACEHOLDER])],
        ))
    }
}

pub struct FastApiProbe;

impl Probe for FastApiProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        if !requirement_contains(dir, "fastapi") {
            return None;
        }
        let app_path = first_existing(dir, &["main.py", "app/main.py", "src/main.py"])
            .map(|file| format!("{}:app", file.trim_end_matches(".py").replace('/', ".")))
            .unwrap_or_else(|| "main:app".to_string());

        let py = PythonEnv::detect(dir);
        let cmd = py.wrap(vec![
            "uvicorn".to_string(),
            app_path,
            "--reload".to_string(),
            "--port".to_string(),
            PORT_PLACEHOLDER.to_string(),
        ]);
        Some(Classification::new("FastAPI", vec![cmd]))
    }
}

pub struct FlaskProbe;

impl Probe for FlaskProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        if !requirement_contains(dir, "flask") {
            return None;
        }
        let py = PythonEnv::detect(dir);
        let classification = Classification::new(
            "Flask",
            vec![py.command(&["-m", "flask", "run", "--port", PORT_PLACEHOLDER])],
        );
        match first_existing(dir, &["app.py", "wsgi.py", "main.py"]) {
            Some(entry) => Some(classification.with_env("FLASK_APP", entry)),
            None => Some(classification),
        }
    }
}

pub struct PythonScriptProbe;

impl Probe for PythonScriptProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        let entry = first_existing(dir, &["app.py", "main.py"])?;
        let py = PythonEnv::detect(dir);
        Some(Classification::new("Python", vec![py.command(&[entry])]))
    }
}

// ============================================================================
// GO & JVM
// ============================================================================

pub struct GoProbe;

impl Probe for GoProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        if !dir.join("go.mod").exists() {
            return None;
        }
        let target = first_existing(dir, &["main.go", "cmd/server/main.go"]).unwrap_or(".");
        Some(Classification::new("Go", vec![argv(&["go", "run", target])]))
    }
}

pub struct GradleProbe;

impl Probe for GradleProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        if !exists_any(dir, &["gradlew", "build.gradle"]) {
            return None;
        }
        let wrapper = if dir.join("gradlew").exists() {
            "./gradlew"
        } else {
            "gradle"
        };
        Some(Classification::new("Gradle", vec![argv(&[wrapper, "bootRun"])]))
    }
}

pub struct MavenProbe;

impl Probe for MavenProbe {
    fn probe(&self, dir: &Path) -> Option<Classification> {
        if !exists_any(dir, &["mvnw", "pom.xml"]) {
            return None;
        }
        let wrapper = if dir.join("mvnw").exists() { "./mvnw" } else { "mvn" };
        Some(Classification::new("Maven", vec![argv(&[wrapper, "spring-boot:run"])]))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, rel: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    // ==================== ERROR CASES ====================

    #[test]
    fn test_detect_missing_directory() {
        let d = detect(Path::new("/nonexistent/path/for/dev-runner"));
        assert!(!d.detected);
        assert_eq!(d.reason.as_deref(), Some("directory not found"));
    }

    #[test]
    fn test_detect_empty_directory() {
        let temp = TempDir::new().unwrap();
        let d = detect(temp.path());
        assert!(!d.detected);
        assert_eq!(d.reason.as_deref(), Some("no framework detected"));
        assert!(d.commands.is_empty());
    }

    // ==================== NODE ====================

    #[test]
    fn test_detect_next_with_pnpm() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", r#"{"dependencies":{"next":"14.0.0"}}"#);
        touch(&temp, "pnpm-lock.yaml");

        let d = detect(temp.path());
        assert!(d.detected);
        assert_eq!(d.stack, "Next.js");
        assert_eq!(d.commands, vec![argv(&["pnpm", "run", "dev"])]);
        assert_eq!(d.default_port, Some(3000));
        assert!(d.port_via_env);
    }

    #[test]
    fn test_detect_vite_with_yarn_via_config_file() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", r#"{"scripts":{"dev":"vite"}}"#);
        touch(&temp, "vite.config.ts");
        touch(&temp, "yarn.lock");

        let d = detect(temp.path());
        assert_eq!(d.stack, "Vite");
        assert_eq!(d.commands, vec![argv(&["yarn", "dev"])]);
        assert_eq!(d.default_port, Some(5173));
    }

    #[test]
    fn test_detect_bun_lockfile() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", r#"{"devDependencies":{"@sveltejs/kit":"2"}}"#);
        touch(&temp, "bun.lockb");

        let d = detect(temp.path());
        assert_eq!(d.stack, "SvelteKit");
        assert_eq!(d.commands, vec![argv(&["bun", "dev"])]);
    }

    #[test]
    fn test_detect_expo_uses_start_script() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", r#"{"dependencies":{"expo":"50"}}"#);

        let d = detect(temp.path());
        assert_eq!(d.stack, "Expo");
        assert_eq!(d.commands, vec![argv(&["npm", "run", "start"])]);
    }

    #[test]
    fn test_detect_node_server_client_scripts() {
        let temp = TempDir::new().unwrap();
        write(
            &temp,
            "package.json",
            r#"{"scripts":{"dev:server":"x","dev:client":"y","dev":"z"}}"#,
        );

        let d = detect(temp.path());
        assert_eq!(d.stack, "Node (server+client)");
        assert_eq!(
            d.commands,
            vec![argv(&["npm", "run", "dev:server"]), argv(&["npm", "run", "dev:client"])]
        );
    }

    #[test]
    fn test_detect_node_script_priority() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", r#"{"scripts":{"serve":"a","start":"b"}}"#);

        let d = detect(temp.path());
        assert_eq!(d.stack, "Node");
        assert_eq!(d.commands, vec![argv(&["npm", "run", "start"])]);
    }

    #[test]
    fn test_detect_node_entry_fallbacks() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", "{}");
        touch(&temp, "server.js");
        assert_eq!(detect(temp.path()).commands, vec![argv(&["node", "server.js"])]);

        touch(&temp, "dist/index.js");
        assert_eq!(detect(temp.path()).commands, vec![argv(&["node", "dist/index.js"])]);

        touch(&temp, "tsconfig.json");
        touch(&temp, "src/index.ts");
        assert_eq!(
            detect(temp.path()).commands,
            vec![argv(&["pnpm", "exec", "ts-node", "src/index.ts"])]
        );
    }

    #[test]
    fn test_detect_invalid_package_json_falls_through() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", "{ not json");
        touch(&temp, "go.mod");

        let d = detect(temp.path());
        assert_eq!(d.stack, "Go");
    }

    // ==================== PYTHON ====================

    #[test]
    fn test_detect_django_has_port_placeholder() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "manage.py");

        let d = detect(temp.path());
        assert_eq!(d.stack, "Django");
        assert_eq!(d.commands, vec![argv(&["python", "manage.py", "runserver", "{PORT}"])]);
        assert!(!d.port_via_env);
        assert_eq!(d.default_port, Some(8000));
    }

    #[test]
    fn test_detect_django_prefers_venv_python() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "manage.py");
        touch(&temp, ".venv/bin/python");
        touch(&temp, "uv.lock");

        let d = detect(temp.path());
        let venv = temp.path().join(".venv/bin/python").to_string_lossy().to_string();
        assert_eq!(d.commands[0][0], venv);
        assert_eq!(d.commands[0].len(), 4);
    }

    #[test]
    fn test_detect_fastapi_module_path_and_uv() {
        let temp = TempDir::new().unwrap();
        write(&temp, "pyproject.toml", "[project]\ndependencies = [\"FastAPI>=0.100\"]\n");
        touch(&temp, "uv.lock");
        touch(&temp, "app/main.py");

        let d = detect(temp.path());
        assert_eq!(d.stack, "FastAPI");
        assert_eq!(
            d.commands,
            vec![argv(&["uv", "run", "uvicorn", "app.main:app", "--reload", "--port", "{PORT}"])]
        );
    }

    #[test]
    fn test_detect_fastapi_default_module() {
        let temp = TempDir::new().unwrap();
        write(&temp, "requirements.txt", "fastapi\nuvicorn\n");

        let d = detect(temp.path());
        assert_eq!(d.commands[0][1], "main:app");
    }

    #[test]
    fn test_detect_flask_sets_flask_app() {
        let temp = TempDir::new().unwrap();
        write(&temp, "requirements.txt", "Flask==3.0\n");
        touch(&temp, "wsgi.py");

        let d = detect(temp.path());
        assert_eq!(d.stack, "Flask");
        assert_eq!(d.env.get("FLASK_APP").map(String::as_str), Some("wsgi.py"));
        assert!(d.commands[0].contains(&"--port".to_string()));
    }

    #[test]
    fn test_detect_plain_python_script() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "main.py");

        let d = detect(temp.path());
        assert_eq!(d.stack, "Python");
        assert_eq!(d.commands, vec![argv(&["python", "main.py"])]);
    }

    // ==================== GO & JVM ====================

    #[test]
    fn test_detect_go_targets() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "go.mod");
        assert_eq!(detect(temp.path()).commands, vec![argv(&["go", "run", "."])]);

        touch(&temp, "cmd/server/main.go");
        assert_eq!(
            detect(temp.path()).commands,
            vec![argv(&["go", "run", "cmd/server/main.go"])]
        );

        touch(&temp, "main.go");
        assert_eq!(detect(temp.path()).commands, vec![argv(&["go", "run", "main.go"])]);
    }

    #[test]
    fn test_detect_gradle_and_maven_wrappers() {
        let gradle = TempDir::new().unwrap();
        touch(&gradle, "build.gradle");
        assert_eq!(detect(gradle.path()).commands, vec![argv(&["gradle", "bootRun"])]);
        touch(&gradle, "gradlew");
        assert_eq!(detect(gradle.path()).commands, vec![argv(&["./gradlew", "bootRun"])]);

        let maven = TempDir::new().unwrap();
        touch(&maven, "pom.xml");
        let d = detect(maven.path());
        assert_eq!(d.stack, "Maven");
        assert_eq!(d.commands, vec![argv(&["mvn", "spring-boot:run"])]);
        assert_eq!(d.default_port, Some(8080));
    }

    // ==================== ORDERING ====================

    #[test]
    fn test_manifest_probes_beat_content_probes() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "go.mod");
        write(&temp, "requirements.txt", "fastapi\n");

        assert_eq!(detect(temp.path()).stack, "Go");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let temp = TempDir::new().unwrap();
        write(&temp, "package.json", r#"{"dependencies":{"vite":"5","next":"14"}}"#);
        let first = detect(temp.path());
        for _ in 0..5 {
            assert_eq!(detect(temp.path()), first);
        }
        assert_eq!(first.stack, "Next.js");
    }

    #[test]
    fn test_custom_probe_chain() {
        struct Always;
        impl Probe for Always {
            fn probe(&self, _dir: &Path) -> Option<Classification> {
                Some(Classification::new("Custom", vec![argv(&["make", "run"])]))
            }
        }

        let temp = TempDir::new().unwrap();
        let probes: Vec<Box<dyn Probe>> = vec![Box::new(Always)];
        let d = detect_with(temp.path(), &probes);
        assert_eq!(d.stack, "Custom");
        assert_eq!(d.default_port, None);
    }

    // ==================== METADATA ====================

    #[test]
    fn test_app_metadata() {
        assert_eq!(app_metadata("Vite"), ("Web", "globe"));
        assert_eq!(app_metadata("FastAPI"), ("API", "zap"));
        assert_eq!(app_metadata("Maven"), ("API", "server"));
        assert_eq!(app_metadata("Django"), ("API", "code"));
        assert_eq!(app_metadata("Unknown"), ("Service", "box"));
    }

    #[test]
    fn test_join_command_leaves_placeholder_bare() {
        let command = join_command(&argv(&["python", "manage.py", "runserver", "{PORT}"]));
        assert_eq!(command, "python manage.py runserver {PORT}");

        let command = join_command(&argv(&["app", "-p", "{PORT}", "two words"]));
        assert_eq!(command, "app -p {PORT} 'two words'");
        assert_eq!(
            shell_words::split(&command).unwrap(),
            argv(&["app", "-p", "{PORT}", "two words"])
        );
    }
}
