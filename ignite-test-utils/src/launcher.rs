//! Starting and stopping servers for integration tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::error::{Result, TestUtilsError};
use crate::fs::{resolve_home, test_config_dir};
use crate::mock_server::{MockServer, MockServerBuilder};

/// JVM options passed to every test server.
pub const TEST_JVM_OPTIONS: &[&str] = &[
    "-Xdebug",
    "-Xnoagent",
    "-Djava.compiler=NONE",
    "-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=5005",
    "-XX:+HeapDumpOnOutOfMemoryError",
    "-Duser.timezone=GMT",
    "-DIGNITE_QUIET=false",
    "-DIGNITE_CONSOLE_APPENDER=false",
    "-DIGNITE_UPDATE_NOTIFIER=false",
    "-DIGNITE_LOG_CLASSPATH_CONTENT_ON_STARTUP=false",
    "-Duser.language=en",
];

/// Initial heap in MiB.
#[cfg(target_pointer_width = "32")]
pub const HEAP_INITIAL_MB: u32 = 256;
/// Initial heap in MiB.
#[cfg(not(target_pointer_width = "32"))]
pub const HEAP_INITIAL_MB: u32 = 1024;

/// Maximum heap in MiB.
#[cfg(target_pointer_width = "32")]
pub const HEAP_MAX_MB: u32 = 768;
/// Maximum heap in MiB.
#[cfg(not(target_pointer_width = "32"))]
pub const HEAP_MAX_MB: u32 = 4096;

/// Main class that boots a server node from a configuration file.
pub const DEFAULT_MAIN_CLASS: &str = "org.apache.ignite.startup.cmdline.CommandLineStartup";

/// Settings for one test server node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    name: String,
    config_path: PathBuf,
    ignite_home: Option<PathBuf>,
    jvm_options: Vec<String>,
    heap_initial_mb: u32,
    heap_max_mb: u32,
}

impl ServerConfig {
    /// Builds the configuration for `config_file` inside the test config
    /// directory, with the standard test JVM options and heap sizes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the test config directory cannot
    /// be resolved.
    pub fn for_tests(config_file: &str) -> Result<Self> {
        let dir = test_config_dir().ok_or_else(|| {
            TestUtilsError::Configuration("failed to resolve test config directory".to_string())
        })?;
        Ok(Self::in_dir(&dir, config_file))
    }

    /// Like [`ServerConfig::for_tests`], picking the 32-bit variant of the
    /// file on 32-bit targets.
    pub fn cross_platform(config_file: &str) -> Result<Self> {
        Self::for_tests(&cross_platform_config_name(config_file))
    }

    fn in_dir(dir: &Path, config_file: &str) -> Self {
        Self {
            name: "server".to_string(),
            config_path: dir.join(config_file),
            ignite_home: resolve_home(),
            jvm_options: TEST_JVM_OPTIONS.iter().map(|o| o.to_string()).collect(),
            heap_initial_mb: HEAP_INITIAL_MB,
            heap_max_mb: HEAP_MAX_MB,
        }
    }

    /// Sets the node name used in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends a JVM option.
    pub fn with_jvm_option(mut self, option: impl Into<String>) -> Self {
        self.jvm_options.push(option.into());
        self
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the full path of the server configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the server installation directory, if resolved.
    pub fn ignite_home(&self) -> Option<&Path> {
        self.ignite_home.as_deref()
    }

    /// Returns the JVM options.
    pub fn jvm_options(&self) -> &[String] {
        &self.jvm_options
    }

    /// Returns the initial heap in MiB.
    pub fn heap_initial_mb(&self) -> u32 {
        self.heap_initial_mb
    }

    /// Returns the maximum heap in MiB.
    pub fn heap_max_mb(&self) -> u32 {
        self.heap_max_mb
    }
}

/// Returns the configuration file name to use on this target.
///
/// On 32-bit targets `name.xml` becomes `name-32.xml`.
pub fn cross_platform_config_name(config_file: &str) -> String {
    config_name_for_target(config_file, cfg!(target_pointer_width = "32"))
}

fn config_name_for_target(config_file: &str, is_32_bit: bool) -> String {
    match config_file.strip_suffix(".xml") {
        Some(stem) if is_32_bit => format!("{}-32.xml", stem),
        _ => config_file.to_string(),
    }
}

/// A started server.
#[derive(Debug)]
pub struct ServerHandle {
    name: String,
    address: Option<SocketAddr>,
    kind: HandleKind,
}

#[derive(Debug)]
enum HandleKind {
    Process(Child),
    Mock(MockServer),
}

impl ServerHandle {
    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the client address, when the launcher knows it.
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Returns the in-process server, for handles started by
    /// [`MockServerLauncher`].
    pub fn mock(&self) -> Option<&MockServer> {
        match &self.kind {
            HandleKind::Mock(server) => Some(server),
            HandleKind::Process(_) => None,
        }
    }

    /// Returns the OS process id, for handles backed by a process.
    pub fn pid(&self) -> Option<u32> {
        match &self.kind {
            HandleKind::Process(child) => child.id(),
            HandleKind::Mock(_) => None,
        }
    }
}

/// Starts and stops server nodes.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    /// Starts a node.
    async fn start(&self, config: &ServerConfig) -> Result<ServerHandle>;

    /// Stops a node and waits for it to exit.
    async fn stop(&self, handle: ServerHandle) -> Result<()>;
}

/// Launches server nodes as `java` child processes.
#[derive(Debug, Clone)]
pub struct JvmProcessLauncher {
    java: PathBuf,
    main_class: String,
    startup_grace: Duration,
}

impl Default for JvmProcessLauncher {
    fn default() -> Self {
        let java = std::env::var_os("JAVA_HOME")
            .map(|home| PathBuf::from(home).join("bin").join("java"))
            .unwrap_or_else(|| PathBuf::from("java"));
        Self {
            java,
            main_class: DEFAULT_MAIN_CLASS.to_string(),
            startup_grace: Duration::from_millis(500),
        }
    }
}

impl JvmProcessLauncher {
    /// Creates a launcher using `$JAVA_HOME/bin/java`, or `java` on the path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the java executable.
    pub fn java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    /// Sets the main class.
    pub fn main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = main_class.into();
        self
    }

    /// Sets how long to watch a fresh process for an early exit.
    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Builds the command line for `config` without running it.
    pub fn build_command(&self, config: &ServerConfig) -> Command {
        let mut command = Command::new(&self.java);
        command
            .arg(format!("-Xms{}m", config.heap_initial_mb()))
            .arg(format!("-Xmx{}m", config.heap_max_mb()))
            .args(config.jvm_options());

        if let Some(home) = config.ignite_home() {
            command
                .arg(format!("-DIGNITE_HOME={}", home.display()))
                .arg("-cp")
                .arg(home.join("libs").join("*"))
                .env("IGNITE_HOME", home);
        }

        command
            .arg(&self.main_class)
            .arg(config.config_path())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ServerLauncher for JvmProcessLauncher {
    async fn start(&self, config: &ServerConfig) -> Result<ServerHandle> {
        let mut child = self.build_command(config).spawn()?;
        tracing::info!(
            name = %config.name(),
            pid = ?child.id(),
            config = %config.config_path().display(),
            "started server process"
        );

        tokio::time::sleep(self.startup_grace).await;
        if let Some(status) = child.try_wait()? {
            return Err(TestUtilsError::Process(format!(
                "server {} exited during startup with {}",
                config.name(),
                status
            )));
        }

        Ok(ServerHandle {
            name: config.name().to_string(),
            address: None,
            kind: HandleKind::Process(child),
        })
    }

    async fn stop(&self, handle: ServerHandle) -> Result<()> {
        match handle.kind {
            HandleKind::Process(mut child) => {
                child.kill().await?;
                tracing::info!(name = %handle.name, "stopped server process");
                Ok(())
            }
            HandleKind::Mock(_) => Err(TestUtilsError::Process(format!(
                "{} was not started by this launcher",
                handle.name
            ))),
        }
    }
}

/// Launches in-process [`MockServer`]s. The configuration file is ignored.
#[derive(Debug, Clone, Default)]
pub struct MockServerLauncher {
    builder: MockServerBuilder,
}

impl MockServerLauncher {
    /// Creates a launcher with default mock server settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a launcher that starts servers from `builder`.
    pub fn with_builder(builder: MockServerBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl ServerLauncher for MockServerLauncher {
    async fn start(&self, config: &ServerConfig) -> Result<ServerHandle> {
        let server = self.builder.clone().start().await?;
        tracing::debug!(name = %config.name(), address = %server.address(), "started mock server");
        Ok(ServerHandle {
            name: config.name().to_string(),
            address: Some(server.address()),
            kind: HandleKind::Mock(server),
        })
    }

    async fn stop(&self, handle: ServerHandle) -> Result<()> {
        match handle.kind {
            HandleKind::Mock(server) => {
                server.shutdown().await;
                Ok(())
            }
            HandleKind::Process(_) => Err(TestUtilsError::Process(format!(
                "{} was not started by this launcher",
                handle.name
            ))),
        }
    }
}
