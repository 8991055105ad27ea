use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NightfallConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Append-only activity log shown by the log viewer.
    #[serde(default = "default_event_log")]
    pub event_log: PathBuf,
    #[serde(with = "humantime_serde", default = "default_timer_poll")]
    pub timer_poll_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_watch_poll")]
    pub watch_poll_interval: Duration,
    #[serde(default)]
    pub commands: PowerCommands,
}

/// Command lines issued by the executor. Templates may reference `{seconds}`
/// or `{minutes}` (seconds rounded up).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PowerCommands {
    #[serde(default = "default_shutdown_command")]
    pub shutdown: String,
    #[serde(default = "default_restart_command")]
    pub restart: String,
    /// Unset means firmware reboot is not available on this platform.
    #[serde(default = "default_firmware_command")]
    pub firmware: Option<String>,
    #[serde(default = "default_abort_command")]
    pub abort: String,
}

fn default_log_filter() -> String {
    // The terminal is owned by the interactive UI; keep diagnostics quiet
    // unless NIGHTFALL_LOG raises the filter.
    "warn".into()
}

fn default_event_log() -> PathBuf {
    "nightfall-events.log".into()
}

fn default_timer_poll() -> Duration {
    Duration::from_millis(500)
}

fn default_watch_poll() -> Duration {
    Duration::from_secs(1)
}

#[cfg(windows)]
fn default_shutdown_command() -> String {
    "shutdown /s /t {seconds}".into()
}

#[cfg(windows)]
fn default_restart_command() -> String {
    "shutdown /r /t {seconds}".into()
}

#[cfg(windows)]
fn default_firmware_command() -> Option<String> {
    Some("shutdown /r /fw /t {seconds}".into())
}

#[cfg(windows)]
fn default_abort_command() -> String {
    "shutdown /a".into()
}

#[cfg(not(windows))]
fn default_shutdown_command() -> String {
    "shutdown -h +{minutes}".into()
}

#[cfg(not(windows))]
fn default_restart_command() -> String {
    "shutdown -r +{minutes}".into()
}

/// systemd reboots into firmware setup immediately; there is no delayed
/// variant, so the executor rejects arming this template with a delay.
#[cfg(not(windows))]
fn default_firmware_command() -> Option<String> {
    Some("systemctl reboot --firmware-setup".into())
}

#[cfg(not(windows))]
fn default_abort_command() -> String {
    "shutdown -c".into()
}

impl Default for NightfallConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            event_log: default_event_log(),
            timer_poll_interval: default_timer_poll(),
            watch_poll_interval: default_watch_poll(),
            commands: PowerCommands::default(),
        }
    }
}

impl Default for PowerCommands {
    fn default() -> Self {
        Self {
            shutdown: default_shutdown_command(),
            restart: default_restart_command(),
            firmware: default_firmware_command(),
            abort: default_abort_command(),
        }
    }
}

/// Loads the config at `path`, falling back to defaults if the file does not
/// exist. A file that exists but cannot be read or parsed is an error.
pub fn load_or_default(path: &Path) -> Result<NightfallConfig> {
    if !path.exists() {
        return Ok(NightfallConfig::default());
    }
    let file = std::fs::File::open(path)
        .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
    serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse config {}", path.display()))
}
