//! External driver adapter: a child process speaking INDI on stdio
//!
//! The adapter launches the program, injects an initial
//! `getProperties` so the child announces its vectors, learns the
//! child's device set from `def*` elements and its snoop subscriptions
//! from `getProperties`, and bridges both directions to the router.
//! Stderr lines are logged at ERROR. A dead child takes down only its
//! adapter; the server keeps running.

use crate::comms::{queue_put, write_message, Shutdown};
use crate::framer::MessageReader;
use crate::message::{GetProperties, ProtocolMessage};
use crate::server::{Ingress, Origin};
use crate::snoop::SnoopState;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Configuration for one external driver.
#[derive(Debug, Clone)]
pub struct ExDriverConfig {
    /// Path of the executable
    pub program: PathBuf,
    /// Program arguments
    pub args: Vec<String>,
    /// Log this child's XML traffic at DEBUG level
    pub debug_xml: bool,
}

impl ExDriverConfig {
    /// Configuration with no arguments and XML logging off.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            debug_xml: false,
        }
    }
}

/// The adapter; the router holds clones of its shared tables.
pub(crate) struct ExDriver {
    config: ExDriverConfig,
    devices: Arc<Mutex<HashMap<String, HashSet<String>>>>,
    snoop: Arc<SnoopState>,
    alive: Arc<AtomicBool>,
}

impl ExDriver {
    pub(crate) fn new(config: ExDriverConfig) -> Self {
        Self {
            config,
            devices: Arc::new(Mutex::new(HashMap::new())),
            snoop: Arc::new(SnoopState::new()),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn devices(&self) -> Arc<Mutex<HashMap<String, HashSet<String>>>> {
        Arc::clone(&self.devices)
    }

    pub(crate) fn snoop_state(&self) -> Arc<SnoopState> {
        Arc::clone(&self.snoop)
    }

    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// Record what a `def*` from the child tells us about its devices.
    fn learn_definition(&self, msg: &ProtocolMessage) {
        if !msg.is_def() {
            return;
        }
        let (Some(device), Some(name)) = (msg.device(), msg.name()) else {
            return;
        };
        self.devices
            .lock()
            .expect("exdriver devices lock")
            .entry(device.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Run the child and bridge its stdio until it exits or the server
    /// stops.
    pub(crate) async fn run(
        self,
        mut inbox: mpsc::Receiver<ProtocolMessage>,
        ingress: mpsc::Sender<Ingress>,
        origin: Origin,
        shutdown: Shutdown,
    ) {
        let program = self.config.program.display().to_string();
        let mut child = match Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("failed to start external driver {program}: {e}");
                return;
            }
        };
        info!("external driver {program} started");
        self.alive.store(true, Ordering::SeqCst);

        let mut stdin = child.stdin.take().expect("child stdin piped");
        let stdout = child.stdout.take().expect("child stdout piped");
        let stderr = child.stderr.take().expect("child stderr piped");
        let mut reader = MessageReader::new(stdout);
        let mut errlines = BufReader::new(stderr).lines();

        // ask the child to announce its vectors
        let hello = ProtocolMessage::GetProperties(GetProperties::new(None, None));
        if let Err(e) = write_message(&mut stdin, &hello).await {
            error!("external driver {program} rejected initial getProperties: {e}");
        }

        let mut stop = shutdown.subscribe();
        let mut stderr_open = true;
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                exit = child.wait() => {
                    match exit {
                        Ok(status) => error!("external driver {program} exited: {status}"),
                        Err(e) => error!("external driver {program} wait failed: {e}"),
                    }
                    self.alive.store(false, Ordering::SeqCst);
                    return;
                }
                outbound = inbox.recv() => {
                    let Some(msg) = outbound else { break };
                    if self.config.debug_xml {
                        debug!("RX:: {}", msg.to_log_string());
                    }
                    if let Err(e) = write_message(&mut stdin, &msg).await {
                        error!("write to external driver {program} failed: {e}");
                        break;
                    }
                }
                inbound = reader.next_message() => {
                    match inbound {
                        Ok(Some(msg)) => {
                            if self.config.debug_xml {
                                debug!("TX:: {}", msg.to_log_string());
                            }
                            self.learn_definition(&msg);
                            if let ProtocolMessage::GetProperties(gp) = &msg {
                                self.snoop.record_get_properties(
                                    gp.device.as_deref(),
                                    gp.name.as_deref(),
                                );
                            }
                            if !queue_put(&ingress, Ingress { origin, msg }, &shutdown).await {
                                break;
                            }
                        }
                        Ok(None) => {
                            error!("external driver {program} closed its stdout");
                            break;
                        }
                        Err(e) => {
                            error!("read from external driver {program} failed: {e}");
                            break;
                        }
                    }
                }
                errline = errlines.next_line(), if stderr_open => {
                    match errline {
                        Ok(Some(line)) => error!("{program} stderr: {line}"),
                        // stderr closed; keep bridging stdio
                        _ => stderr_open = false,
                    }
                }
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        terminate(&mut child, &program).await;
    }
}

/// SIGTERM the child, then give it a moment before SIGKILL.
async fn terminate(child: &mut tokio::process::Child, program: &str) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
            debug!("SIGTERM to {program} failed: {e}");
        }
    }
    match tokio::time::timeout(Duration::from_secs(1), child.wait()).await {
        Ok(_) => info!("external driver {program} terminated"),
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            info!("external driver {program} killed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learn_definition_builds_device_table() {
        let exdriver = ExDriver::new(ExDriverConfig::new("/bin/true"));
        let def: ProtocolMessage = r#"<defNumberVector device="Focuser" name="position" state="Ok" perm="rw"><defNumber name="steps" format="%6.0f" min="0" max="10000" step="1">0</defNumber></defNumberVector>"#
            .parse()
            .unwrap();
        exdriver.learn_definition(&def);
        let devices = exdriver.devices();
        let table = devices.lock().unwrap();
        assert!(table["Focuser"].contains("position"));
    }

    #[test]
    fn test_non_def_learns_nothing() {
        let exdriver = ExDriver::new(ExDriverConfig::new("/bin/true"));
        let set: ProtocolMessage = r#"<setNumberVector device="Focuser" name="position"><oneNumber name="steps">5</oneNumber></setNumberVector>"#
            .parse()
            .unwrap();
        exdriver.learn_definition(&set);
        assert!(exdriver.devices().lock().unwrap().is_empty());
    }
}
