//! Config-driven script buttons.
//!
//! Each `[scripts.<id>]` section becomes a button that launches its `exec`
//! command line. When any command line contains `{arg}`, a shared text
//! entity supplies the argument, which is cleared after each use.

use super::Integration;
use crate::config::ScriptConfig;
use crate::entity::variants::{Button, Text};
use crate::entity::{Entity, EntityContext};
use crate::host::sanitize_id;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ARGUMENT_PLACEHOLDER: &str = "{arg}";
const ARGUMENTS_ID: &str = "scripts_arguments";

pub struct Scripts {
    buttons: Vec<Arc<Button>>,
    arguments: Option<Arc<Text>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scripts {
    /// Create one button per configured script; `None` when nothing is configured
    pub fn start(context: &EntityContext, scripts: &BTreeMap<String, ScriptConfig>) -> Option<Self> {
        let mut integration = Self {
            buttons: Vec::new(),
            arguments: None,
            tasks: Vec::new(),
        };

        for (section, script) in scripts {
            if script.exec.trim().is_empty() {
                warn!(script = %section, "Script has no exec entry, skipping");
                continue;
            }

            let arguments = if script.exec.contains(ARGUMENT_PLACEHOLDER) {
                Some(Arc::clone(
                    integration
                        .arguments
                        .get_or_insert_with(|| arguments_entity(context)),
                ))
            } else {
                None
            };

            let id = sanitize_id(section);
            let name = script.name.clone().unwrap_or_else(|| section.clone());
            let button = Button::new(context, id.clone(), name);
            button.set_ha_icon(&script.icon);

            let mut presses = button.subscribe_presses();
            let exec = script.exec.clone();
            integration.tasks.push(tokio::spawn(async move {
                loop {
                    match presses.recv().await {
                        Ok(()) => run_script(&id, &exec, arguments.as_deref()),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(script = %id, skipped, "Dropped script presses")
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
            integration.buttons.push(button);
        }

        if integration.buttons.is_empty() {
            return None;
        }

        info!(count = integration.buttons.len(), "Loaded scripts");
        Some(integration)
    }

    pub fn buttons(&self) -> &[Arc<Button>] {
        &self.buttons
    }

    pub fn arguments(&self) -> Option<&Arc<Text>> {
        self.arguments.as_ref()
    }
}

impl Integration for Scripts {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Scripts {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn arguments_entity(context: &EntityContext) -> Arc<Text> {
    let text = Text::new(context, ARGUMENTS_ID, "arguments");
    text.set_ha_icon("mdi:console");
    text
}

/// Substitute the shared argument, then launch the command detached
fn run_script(id: &str, exec: &str, arguments: Option<&Text>) {
    let command_line = match arguments {
        Some(text) if exec.contains(ARGUMENT_PLACEHOLDER) => {
            let line = exec.replace(ARGUMENT_PLACEHOLDER, &text.value());
            text.set_value("");
            line
        }
        _ => exec.to_string(),
    };

    info!(script = %id, command = %command_line, "Running script");
    if let Err(e) = spawn_detached(id, &command_line) {
        warn!(script = %id, error = %e, "Failed to run script");
    }
}

fn spawn_detached(id: &str, command_line: &str) -> Result<()> {
    let mut words = split_command(command_line)?.into_iter();
    let program = match words.next() {
        Some(program) => program,
        None => bail!("empty command line"),
    };

    let mut child = tokio::process::Command::new(&program)
        .args(words)
        .stdin(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start '{}'", program))?;

    let id = id.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => debug!(script = %id, "Script finished"),
            Ok(status) => warn!(script = %id, status = %status, "Script exited with failure"),
            Err(e) => warn!(script = %id, error = %e, "Failed to wait for script"),
        }
    });
    Ok(())
}

/// Split a command line into words.
///
/// Words are separated by whitespace. Single or double quotes group text
/// containing whitespace and are removed; inside double quotes, `""` is a
/// literal quote.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some('"') if c == '"' && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        bail!("unterminated {} quote in '{}'", q, line);
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRegistry;
    use crate::host::HostIdentity;
    use crate::mqtt::{ConnectionState, IncomingMessage, MemoryOutbound, Transport};

    fn context() -> (EntityContext, Arc<MemoryOutbound>) {
        let outbound = Arc::new(MemoryOutbound::new());
        let transport = Transport::new(outbound.clone());
        transport.set_state(ConnectionState::Connected);
        let context = EntityContext::new(
            HostIdentity::new("desktop", "homeassistant"),
            transport,
            Arc::new(EntityRegistry::new()),
        );
        (context, outbound)
    }

    fn script(exec: &str) -> ScriptConfig {
        ScriptConfig {
            name: None,
            exec: exec.to_string(),
            icon: "mdi:script-text".to_string(),
        }
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("notify-send 'Backup done' now").unwrap(),
            vec!["notify-send", "Backup done", "now"]
        );
        assert_eq!(
            split_command(r#"  sh -c "echo ""hi"" there"  "#).unwrap(),
            vec!["sh", "-c", r#"echo "hi" there"#]
        );
        assert_eq!(split_command("a '' b").unwrap(), vec!["a", "", "b"]);
        assert!(split_command("").unwrap().is_empty());
    }

    #[test]
    fn test_split_command_unterminated_quote() {
        assert!(split_command("echo 'oops").is_err());
    }

    #[tokio::test]
    async fn test_buttons_created_from_config() {
        let (context, outbound) = context();
        let mut scripts = BTreeMap::new();
        scripts.insert("Backup Home".to_string(), script("true"));
        scripts.insert("empty".to_string(), script("  "));

        let integration = Scripts::start(&context, &scripts).unwrap();
        assert_eq!(integration.buttons().len(), 1);
        assert!(integration.arguments().is_none());

        let button = &integration.buttons()[0];
        assert_eq!(button.id(), "backup_home");
        assert_eq!(button.name(), "Backup Home");

        button.init();
        let payload: serde_json::Value = serde_json::from_str(
            &outbound.published_to("homeassistant/button/desktop/backup_home/config")[0],
        )
        .unwrap();
        assert_eq!(payload["icon"], "mdi:script-text");
    }

    #[tokio::test]
    async fn test_no_scripts_means_no_integration() {
        let (context, _outbound) = context();
        assert!(Scripts::start(&context, &BTreeMap::new()).is_none());

        let mut scripts = BTreeMap::new();
        scripts.insert("broken".to_string(), script(""));
        assert!(Scripts::start(&context, &scripts).is_none());
    }

    #[tokio::test]
    async fn test_argument_is_substituted_and_cleared() {
        let (context, outbound) = context();
        let mut scripts = BTreeMap::new();
        scripts.insert("say".to_string(), script("true {arg}"));
        scripts.insert("other".to_string(), script("true {arg} again"));

        let integration = Scripts::start(&context, &scripts).unwrap();
        let arguments = Arc::clone(integration.arguments().unwrap());
        assert_eq!(arguments.id(), "scripts_arguments");
        assert_eq!(context.registry().len(), 3);

        arguments.init();
        context.transport().dispatch(&IncomingMessage::new(
            "desktop/scripts_arguments/set",
            "hello",
        ));
        assert_eq!(arguments.value(), "hello");

        run_script("say", "true {arg}", Some(&arguments));
        assert_eq!(arguments.value(), "");
        assert_eq!(
            outbound
                .published_to("desktop/scripts_arguments")
                .last()
                .map(String::as_str),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        assert!(spawn_detached("missing", "/nonexistent/hass-bridge-test-program").is_err());
        assert!(spawn_detached("empty", "   ").is_err());
    }
}
