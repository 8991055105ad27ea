use crate::control::{Controller, TimerStatus, WatchStatus};
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{cursor, execute};
use std::io::Write;
use std::time::Duration;

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Live countdown/status view. Redraws a few times a second; `c` cancels the
/// timer, any other key returns to the menu. The key read is
/// non-blocking-with-poll so the countdown keeps moving without a dedicated
/// input thread.
pub fn live_status(controller: &Controller) -> Result<()> {
    terminal::enable_raw_mode()?;
    let result = status_loop(controller);
    terminal::disable_raw_mode()?;
    println!();
    result
}

fn status_loop(controller: &Controller) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut notice: Option<String> = None;

    loop {
        let snap = controller.status();
        execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

        match snap.timer.status {
            TimerStatus::Armed => {
                let action = snap
                    .timer
                    .action
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "action".into());
                let remaining = snap
                    .timer
                    .remaining_display()
                    .unwrap_or_else(|| "0s".into());
                let deadline = snap.timer.deadline_display().unwrap_or_default();
                write!(stdout, "Pending {action} in {remaining} (at {deadline})\r\n")?;
            }
            TimerStatus::Expired => write!(stdout, "Timer expired\r\n")?,
            TimerStatus::Idle | TimerStatus::Cancelled => {
                write!(stdout, "No active timer\r\n")?
            }
        }

        match snap.watch.status {
            WatchStatus::Monitoring => {
                let pending = snap
                    .watch
                    .pending
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "action".into());
                write!(
                    stdout,
                    "Watching {} process(es), then {pending}:\r\n",
                    snap.watch.targets.len()
                )?;
                for target in &snap.watch.targets {
                    write!(stdout, "  - {target}\r\n")?;
                }
            }
            _ if !snap.watch.targets.is_empty() => {
                write!(
                    stdout,
                    "{} watch target(s) configured (not yet monitoring)\r\n",
                    snap.watch.targets.len()
                )?;
            }
            _ => write!(stdout, "No watched processes\r\n")?,
        }

        if let Some(notice) = &notice {
            write!(stdout, "\r\n{notice}\r\n")?;
        }
        write!(
            stdout,
            "\r\nPress 'c' to cancel the timer, any other key to return\r\n"
        )?;
        stdout.flush()?;

        if event::poll(REDRAW_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('c') | KeyCode::Char('C') => {
                        let outcome = controller.cancel_timer();
                        notice = Some(match (outcome.cancelled, outcome.warning) {
                            (true, Some(warning)) => {
                                format!("Timer cancelled. Warning: {warning}")
                            }
                            (true, None) => "Timer cancelled.".into(),
                            (false, _) => "No active timer to cancel.".into(),
                        });
                    }
                    _ => return Ok(()),
                }
            }
        }
    }
}

/// Prints the most recent activity-log entries, newest first.
pub fn view_log(controller: &Controller) -> Result<()> {
    let entries = controller.recent_events(20);
    if entries.is_empty() {
        println!("No logged events.");
        return Ok(());
    }
    println!();
    for entry in entries {
        match entry.details {
            Some(details) => println!("{} | {} | {details}", entry.timestamp, entry.action),
            None => println!("{} | {}", entry.timestamp, entry.action),
        }
    }
    Ok(())
}
