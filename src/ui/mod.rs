mod screens;

use crate::control::{Controller, WatchTarget};
use crate::duration::parse_duration_spec;
use crate::executor::ActionKind;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use std::io::Write;
use tracing::debug;

/// Interactive menu loop. Everything here is sequential glue: user intents
/// go to the [`Controller`], renderable state comes back as snapshots.
pub fn run(controller: Controller) -> Result<()> {
    println!("nightfall {}", env!("CARGO_PKG_VERSION"));
    loop {
        println!();
        println!("  1) Shutdown timer");
        println!("  2) Restart timer");
        println!("  3) Firmware reboot timer");
        println!("  4) Cancel timer");
        println!("  5) Timer & watch status");
        println!("  6) Add watch target");
        println!("  7) Start watching");
        println!("  8) Clear watch targets");
        println!("  9) Activity log");
        println!("  f) Reboot to firmware now");
        println!("  0) Quit");

        match prompt("Choice")?.as_str() {
            "1" => arm_flow(&controller, ActionKind::Shutdown)?,
            "2" => arm_flow(&controller, ActionKind::Restart)?,
            "3" => arm_flow(&controller, ActionKind::FirmwareReboot)?,
            "4" => cancel_flow(&controller),
            "5" => screens::live_status(&controller)?,
            "6" => add_target_flow(&controller)?,
            "7" => start_watch_flow(&controller)?,
            "8" => clear_watch_flow(&controller)?,
            "9" => screens::view_log(&controller)?,
            "f" | "F" => fire_now_flow(&controller)?,
            "0" | "q" | "exit" => break,
            other => debug!(other, "Unrecognized menu choice"),
        }
    }
    println!("Goodbye!");
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    std::io::stdout().flush().wrap_err("Failed to flush stdout")?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .wrap_err("Failed to read input")?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    Ok(prompt(&format!("{question} [y/N]"))?.eq_ignore_ascii_case("y"))
}

fn arm_flow(controller: &Controller, kind: ActionKind) -> Result<()> {
    loop {
        let input = prompt("Time (e.g. 30m, 2h, 1h 30m 15s, 90) or 'back'")?;
        if input.eq_ignore_ascii_case("back") || input.is_empty() {
            return Ok(());
        }
        let seconds = match parse_duration_spec(&input) {
            Ok(seconds) => seconds,
            Err(err) => {
                println!("{err}. Use formats like 10s, 5m, 1h 30m or 90.");
                continue;
            }
        };
        match controller.arm_timer(kind, seconds) {
            Ok(outcome) => {
                if let Some(previous) = outcome.replaced {
                    println!("Previous {previous} timer cancelled.");
                }
                if let Some(warning) = outcome.warning {
                    println!("Warning: {warning}");
                }
                println!(
                    "Your PC will {kind} in {} (at {}).",
                    humantime::format_duration(std::time::Duration::from_secs(seconds)),
                    outcome.deadline.format("%Y-%m-%d %H:%M:%S"),
                );
                return Ok(());
            }
            // Recoverable, but retrying the same input cannot help; back to
            // the menu so the user can pick another action.
            Err(err) => {
                println!("{err}");
                return Ok(());
            }
        }
    }
}

fn cancel_flow(controller: &Controller) {
    let outcome = controller.cancel_timer();
    if outcome.cancelled {
        println!("Timer cancelled.");
        if let Some(warning) = outcome.warning {
            println!("Warning: {warning}");
        }
    } else {
        println!("No active timer to cancel.");
    }
}

fn add_target_flow(controller: &Controller) -> Result<()> {
    let input = prompt("PID or process name (or 'back')")?;
    if input.is_empty() || input.eq_ignore_ascii_case("back") {
        return Ok(());
    }
    let target = match input.parse::<u32>() {
        Ok(pid) => WatchTarget::by_pid(pid),
        Err(_) => WatchTarget::by_name(input),
    };
    let name = target.display_name();
    match controller.add_watch_target(target) {
        Ok(true) => println!("Added {name} to the watch list."),
        Ok(false) => println!("{name} is already on the watch list."),
        Err(err) => println!("{err}"),
    }
    Ok(())
}

fn start_watch_flow(controller: &Controller) -> Result<()> {
    let kind = match prompt("After all processes finish: 1) shutdown 2) restart")?.as_str() {
        "1" => ActionKind::Shutdown,
        "2" => ActionKind::Restart,
        _ => return Ok(()),
    };
    match controller.start_watch(kind) {
        Ok(()) => println!("Watching. The {kind} fires when every target has exited."),
        Err(err) => println!("{err}"),
    }
    Ok(())
}

fn clear_watch_flow(controller: &Controller) -> Result<()> {
    let count = controller.status().watch.targets.len();
    if count == 0 {
        println!("No watch targets configured.");
        return Ok(());
    }
    if confirm(&format!("Clear all {count} watch target(s)?"))? {
        controller.clear_watch();
        println!("Watch targets cleared.");
    }
    Ok(())
}

fn fire_now_flow(controller: &Controller) -> Result<()> {
    if !confirm("This restarts into the firmware setup immediately. Continue?")? {
        return Ok(());
    }
    match controller.fire_now(ActionKind::FirmwareReboot) {
        Ok(()) => println!("Rebooting to firmware setup..."),
        Err(err) => println!("{err}"),
    }
    Ok(())
}
