//! Plugins hosted in external processes speaking JSON lines over stdio.

use crate::plugin::{HostFunctions, Plugin, PluginError, PluginLoader};
use crate::protocol::{HostMessage, PluginMessage, PROTOCOL_VERSION};
use crate::task::AsyncCall;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use wyrmhole_core::PluginConfig;
use wyrmhole_protocol::{ColonyId, MessageId};

/// Loader that maps mimetypes to executables from the `[plugins]` table.
#[derive(Debug, Clone, Default)]
pub struct ExecPluginLoader {
    plugins: BTreeMap<String, PluginConfig>,
}

impl ExecPluginLoader {
    pub fn new(plugins: BTreeMap<String, PluginConfig>) -> Self {
        Self { plugins }
    }
}

impl PluginLoader for ExecPluginLoader {
    fn load(&self, mimetype: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let config = self.plugins.get(mimetype).ok_or_else(|| PluginError::Load {
            mimetype: mimetype.to_string(),
            reason: "no plugin configured for this mimetype".into(),
        })?;
        let plugin = ExecPlugin::spawn(mimetype, config)?;
        Ok(Box::new(plugin))
    }
}

/// A running plugin process.
pub struct ExecPlugin {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ExecPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecPlugin")
            .field("name", &self.name)
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl ExecPlugin {
    /// Start the plugin process. The handshake happens in `initialize`.
    pub fn spawn(mimetype: &str, config: &PluginConfig) -> Result<Self, PluginError> {
        let load_error = |reason: String| PluginError::Load {
            mimetype: mimetype.to_string(),
            reason,
        };

        let mut cmd = Command::new(&config.executable);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|err| {
            load_error(format!(
                "failed to spawn {}: {err}",
                config.executable.display()
            ))
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(load_error("plugin process has no stdio pipes".into()));
        };

        tracing::info!(%mimetype, pid = child.id(), "spawned plugin process");
        Ok(Self {
            name: mimetype.to_string(),
            child,
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
            reader: None,
        })
    }

    fn send(&mut self, message: &HostMessage) -> Result<(), PluginError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PluginError::Call("plugin process has shut down".into()))?;
        let line = serde_json::to_string(message)
            .map_err(|err| PluginError::Call(format!("failed to encode request: {err}")))?;
        writeln!(stdin, "{line}")
            .and_then(|()| stdin.flush())
            .map_err(|err| PluginError::Call(format!("failed to write to plugin: {err}")))
    }

    fn handshake(&mut self) -> Result<String, PluginError> {
        self.send(&HostMessage::Init {
            protocol_version: PROTOCOL_VERSION,
        })
        .map_err(|err| PluginError::Init(err.to_string()))?;

        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| PluginError::Init("plugin stdout already consumed".into()))?;
        let mut line = String::new();
        let read = stdout
            .read_line(&mut line)
            .map_err(|err| PluginError::Init(format!("failed to read from plugin: {err}")))?;
        if read == 0 {
            return Err(PluginError::Init(
                "plugin exited before completing the handshake".into(),
            ));
        }

        match serde_json::from_str::<PluginMessage>(&line) {
            Ok(PluginMessage::Ready {
                name,
                protocol_version,
            }) if protocol_version == PROTOCOL_VERSION => Ok(name),
            Ok(PluginMessage::Ready {
                protocol_version, ..
            }) => Err(PluginError::Init(format!(
                "protocol version mismatch: expected {PROTOCOL_VERSION}, got {protocol_version}"
            ))),
            Ok(_) => Err(PluginError::Init(
                "plugin sent a message before `ready`".into(),
            )),
            Err(err) => Err(PluginError::Init(format!(
                "failed to parse plugin handshake: {err}"
            ))),
        }
    }
}

impl Plugin for ExecPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, host: Arc<dyn HostFunctions>) -> Result<(), PluginError> {
        self.name = self.handshake()?;
        tracing::info!(plugin = %self.name, "plugin initialized");

        let stdout = self
            .stdout
            .take()
            .ok_or_else(|| PluginError::Init("plugin stdout already consumed".into()))?;
        let plugin_name = self.name.clone();
        let reader = thread::Builder::new()
            .name(format!("plugin-{}", self.child.id()))
            .spawn(move || relay_plugin_output(stdout, host, &plugin_name))
            .map_err(|err| PluginError::Init(format!("failed to start reader thread: {err}")))?;
        self.reader = Some(reader);
        Ok(())
    }

    fn on_command(
        &mut self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    ) -> Result<(), PluginError> {
        self.send(&HostMessage::Command {
            colony_id,
            msg_id,
            msg: payload,
        })
    }

    fn on_response(
        &mut self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    ) -> Result<(), PluginError> {
        self.send(&HostMessage::Response {
            colony_id,
            msg_id,
            msg: payload,
        })
    }

    fn shutdown(&mut self) {
        if self.stdin.is_some() {
            let _ = self.send(&HostMessage::Shutdown);
        }
        // Closing stdin lets a well-behaved plugin exit on its own.
        self.stdin = None;

        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();

        // Detached, not joined: a grandchild that inherited the plugin's
        // stdout can hold the pipe open indefinitely.
        drop(self.reader.take());
        tracing::info!(plugin = %self.name, "plugin stopped");
    }
}

impl Drop for ExecPlugin {
    fn drop(&mut self) {
        if self.stdin.is_some() || self.reader.is_some() {
            self.shutdown();
        }
    }
}

/// Forward everything the plugin prints to the extension. Each line is
/// relayed from the dispatch loop thread via an async call.
fn relay_plugin_output(
    stdout: BufReader<ChildStdout>,
    host: Arc<dyn HostFunctions>,
    plugin_name: &str,
) {
    for line in stdout.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(plugin = %plugin_name, error = %err, "failed to read plugin output");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<PluginMessage>(&line) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(plugin = %plugin_name, error = %err, "ignoring malformed plugin line");
                continue;
            }
        };

        let relay_host = Arc::clone(&host);
        let call = match message {
            PluginMessage::Command {
                colony_id,
                msg_id,
                msg,
            } => AsyncCall::new(move || {
                if let Err(err) = relay_host.send_command(colony_id, msg_id, &msg) {
                    tracing::error!(%colony_id, %msg_id, error = %err, "failed to relay plugin command");
                }
            }),
            PluginMessage::Response {
                colony_id,
                msg_id,
                msg,
            } => AsyncCall::new(move || {
                if let Err(err) = relay_host.send_response(colony_id, msg_id, &msg) {
                    tracing::error!(%colony_id, %msg_id, error = %err, "failed to relay plugin response");
                }
            }),
            PluginMessage::Ready { .. } => {
                tracing::debug!(plugin = %plugin_name, "ignoring repeated ready");
                continue;
            }
        };

        if let Err(err) = host.schedule_call(call) {
            tracing::warn!(plugin = %plugin_name, error = %err, "dropping plugin output");
            break;
        }
    }
    tracing::debug!(plugin = %plugin_name, "plugin output closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::HostError;
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Runs scheduled calls inline and reports what the plugin sent.
    struct InlineHost {
        sent: Mutex<Sender<(&'static str, ColonyId, MessageId, String)>>,
    }

    impl HostFunctions for InlineHost {
        fn schedule_call(&self, call: AsyncCall) -> Result<(), HostError> {
            call.run();
            Ok(())
        }

        fn send_command(
            &self,
            colony_id: ColonyId,
            msg_id: MessageId,
            payload: &str,
        ) -> Result<(), HostError> {
            let _ = self
                .sent
                .lock()
                .unwrap()
                .send(("cmd", colony_id, msg_id, payload.into()));
            Ok(())
        }

        fn send_response(
            &self,
            colony_id: ColonyId,
            msg_id: MessageId,
            payload: &str,
        ) -> Result<(), HostError> {
            let _ = self
                .sent
                .lock()
                .unwrap()
                .send(("resp", colony_id, msg_id, payload.into()));
            Ok(())
        }
    }

    #[cfg(unix)]
    fn write_script(body: &str) -> tempfile::TempPath {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{body}").unwrap();
        file.flush().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        file.into_temp_path()
    }

    #[cfg(unix)]
    fn echo_plugin_script() -> tempfile::TempPath {
        write_script(
            r#"#!/bin/sh
while IFS= read -r line; do
    case "$line" in
        *'"type":"init"'*)
            echo '{"type":"ready","name":"Echo Plugin","protocol_version":1}' ;;
        *'"type":"cmd"'*)
            id=$(echo "$line" | grep -o '"cmdId":[0-9]*' | cut -d: -f2)
            echo '{"type":"resp","colonyId":3,"cmdId":'$id',"msg":"pong"}' ;;
        *'"type":"shutdown"'*)
            exit 0 ;;
    esac
done
"#,
        )
    }

    fn config_for(path: &std::path::Path) -> PluginConfig {
        PluginConfig {
            executable: path.to_path_buf(),
            ..PluginConfig::default()
        }
    }

    #[test]
    fn unconfigured_mimetype_fails_to_load() {
        let loader = ExecPluginLoader::default();
        let err = loader.load("application/x-none").err().expect("should fail");
        assert!(matches!(err, PluginError::Load { .. }));
    }

    #[test]
    fn missing_executable_fails_to_load() {
        let mut plugins = BTreeMap::new();
        plugins.insert(
            "application/x-ghost".to_string(),
            config_for(std::path::Path::new("/nonexistent/wyrmhole-plugin")),
        );
        let err = ExecPluginLoader::new(plugins)
            .load("application/x-ghost")
            .err()
            .expect("spawn should fail");
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    #[cfg(unix)]
    fn handshake_names_plugin_and_relays_responses() {
        let script = echo_plugin_script();
        let mut plugins = BTreeMap::new();
        plugins.insert("application/x-echo".to_string(), config_for(&script));
        let loader = ExecPluginLoader::new(plugins);

        let (tx, rx) = mpsc::channel();
        let host: Arc<dyn HostFunctions> = Arc::new(InlineHost {
            sent: Mutex::new(tx),
        });

        let mut plugin = loader.load("application/x-echo").expect("spawn plugin");
        plugin.initialize(host).expect("handshake");
        assert_eq!(plugin.name(), "Echo Plugin");

        plugin
            .on_command(ColonyId(3), MessageId(42), "ping".into())
            .expect("send command");
        let (kind, colony, msg_id, payload) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("plugin should answer");
        assert_eq!(kind, "resp");
        assert_eq!(colony, ColonyId(3));
        assert_eq!(msg_id, MessageId(42));
        assert_eq!(payload, "pong");

        plugin.shutdown();
    }

    #[test]
    #[cfg(unix)]
    fn version_mismatch_is_init_error() {
        let script = write_script(
            r#"#!/bin/sh
read -r line
echo '{"type":"ready","name":"Old","protocol_version":99}'
"#,
        );
        let mut plugin = ExecPlugin::spawn("application/x-old", &config_for(&script)).unwrap();
        let (tx, _rx) = mpsc::channel();
        let host: Arc<dyn HostFunctions> = Arc::new(InlineHost {
            sent: Mutex::new(tx),
        });

        let err = plugin.initialize(host).unwrap_err();
        assert!(matches!(err, PluginError::Init(msg) if msg.contains("version mismatch")));
        plugin.shutdown();
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_does_not_wait_for_inherited_stdout() {
        // The background sleep keeps the stdout pipe open after the
        // plugin itself is killed.
        let script = write_script(
            r#"#!/bin/sh
read -r line
sleep 30 &
echo '{"type":"ready","name":"Forker","protocol_version":1}'
while IFS= read -r line; do :; done
"#,
        );
        let mut plugin = ExecPlugin::spawn("application/x-fork", &config_for(&script)).unwrap();
        let (tx, _rx) = mpsc::channel();
        let host: Arc<dyn HostFunctions> = Arc::new(InlineHost {
            sent: Mutex::new(tx),
        });
        plugin.initialize(host).expect("handshake");

        let started = std::time::Instant::now();
        plugin.shutdown();
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
