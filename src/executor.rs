use crate::configs::PowerCommands;
use new_string_template::template::Template;
use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use tracing::{debug, info, instrument};

/// The power action a timer or watch commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Shutdown,
    Restart,
    FirmwareReboot,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Shutdown => "shutdown",
            ActionKind::Restart => "restart",
            ActionKind::FirmwareReboot => "firmware reboot",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("invalid command template: {0}")]
    Template(String),

    #[error("no command configured for {0}")]
    MissingCommand(ActionKind),

    #[error("the {0} command does not accept a delay")]
    DelayUnsupported(ActionKind),

    #[error("empty power command")]
    EmptyCommand,

    #[error("failed to run power command")]
    Spawn(#[from] std::io::Error),

    #[error("power command exited with {0}")]
    CommandFailed(std::process::ExitStatus),
}

/// Issues the platform power commands. `schedule` and `cancel` run commands
/// that return immediately (the OS owns the real countdown), so the whole
/// contract is synchronous.
pub trait ActionExecutor: Send + Sync {
    fn schedule(&self, kind: ActionKind, seconds: u64) -> Result<(), ExecutorError>;
    fn cancel(&self) -> Result<(), ExecutorError>;
    fn supports(&self, kind: ActionKind) -> bool;
}

/// [`ActionExecutor`] backed by the configured command templates.
#[derive(Debug)]
pub struct SystemExecutor {
    commands: PowerCommands,
}

impl SystemExecutor {
    pub fn new(commands: PowerCommands) -> Self {
        Self { commands }
    }

    fn template_for(&self, kind: ActionKind) -> Result<&str, ExecutorError> {
        match kind {
            ActionKind::Shutdown => Ok(&self.commands.shutdown),
            ActionKind::Restart => Ok(&self.commands.restart),
            ActionKind::FirmwareReboot => self
                .commands
                .firmware
                .as_deref()
                .ok_or(ExecutorError::MissingCommand(kind)),
        }
    }
}

impl ActionExecutor for SystemExecutor {
    #[instrument(skip(self))]
    fn schedule(&self, kind: ActionKind, seconds: u64) -> Result<(), ExecutorError> {
        let template = self.template_for(kind)?;
        if seconds > 0 && !has_delay_placeholder(template) {
            return Err(ExecutorError::DelayUnsupported(kind));
        }
        let argv = render_command(template, seconds)?;
        info!(%kind, seconds, ?argv, "Issuing scheduled power command");
        run_command(&argv)
    }

    #[instrument(skip(self))]
    fn cancel(&self) -> Result<(), ExecutorError> {
        let argv = render_command(&self.commands.abort, 0)?;
        info!(?argv, "Issuing abort command");
        run_command(&argv)
    }

    fn supports(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Shutdown | ActionKind::Restart => true,
            ActionKind::FirmwareReboot => {
                self.commands.firmware.is_some() && firmware_tool_available()
            }
        }
    }
}

/// Renders a command template and splits it into an argv. Templates may use
/// `{seconds}` or `{minutes}` (seconds rounded up, for `shutdown +N` style
/// commands).
fn render_command(template: &str, seconds: u64) -> Result<Vec<String>, ExecutorError> {
    let data = {
        let mut map = HashMap::new();
        map.insert("seconds", seconds.to_string());
        map.insert("minutes", seconds.div_ceil(60).to_string());
        map
    };
    let rendered = Template::new(template)
        .render(&data)
        .map_err(|err| ExecutorError::Template(err.to_string()))?;
    let argv =
        shell_words::split(&rendered).map_err(|err| ExecutorError::Template(err.to_string()))?;
    if argv.is_empty() {
        return Err(ExecutorError::EmptyCommand);
    }
    Ok(argv)
}

/// A template with no delay placeholder runs its action immediately, so it
/// must never be handed a nonzero delay.
fn has_delay_placeholder(template: &str) -> bool {
    template.contains("{seconds}") || template.contains("{minutes}")
}

fn run_command(argv: &[String]) -> Result<(), ExecutorError> {
    let status = Command::new(&argv[0]).args(&argv[1..]).status()?;
    if !status.success() {
        return Err(ExecutorError::CommandFailed(status));
    }
    debug!(?status, "Power command completed");
    Ok(())
}

#[cfg(windows)]
fn firmware_tool_available() -> bool {
    // `shutdown /r /fw` ships with every supported Windows version.
    true
}

#[cfg(not(windows))]
fn firmware_tool_available() -> bool {
    ["/usr/bin/systemctl", "/bin/systemctl"]
        .iter()
        .any(|p| std::path::Path::new(p).exists())
}
