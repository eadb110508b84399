//! Sends command lines to a terminal application via AppleScript.
//!
//! Two terminal families are handled. iTerm exposes "create window with
//! default profile", so a warm dispatch opens a new window and types the
//! command into its session. Everything else is driven through Terminal.app's
//! `do script`, which needs an existing window or tab as its target; a warm
//! dispatch therefore synthesizes Cmd-T first.
//!
//! Application activation and window creation have no completion signal, so
//! the scripts wait a fixed time ([`LaunchDelays`]) before addressing the new
//! session. The command text is embedded in a quoted AppleScript literal
//! without escaping: a command containing `"` or `\` can break or alter the
//! generated script.

use std::{
    process::Command,
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::{debug, error, info};

/// Terminal name that selects the create-window branch.
pub const ITERM: &str = "iTerm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// New window with the default profile, then `write text` (iTerm).
    CreateWindow,
    /// `do script` in window 1 on cold start, new tab via Cmd-T when warm.
    RunInTab,
}

impl Branch {
    pub fn for_terminal(terminal: &str) -> Self {
        if terminal == ITERM {
            Branch::CreateWindow
        } else {
            Branch::RunInTab
        }
    }
}

/// Blind waits between activating/creating and addressing the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDelays {
    /// iTerm already running: after creating the window.
    pub new_window: Duration,
    /// iTerm cold launch: after activating.
    pub cold_launch: Duration,
    /// Terminal.app, both cold and warm.
    pub tab_ready: Duration,
}

impl Default for LaunchDelays {
    fn default() -> Self {
        Self {
            new_window: Duration::from_millis(200),
            cold_launch: Duration::from_millis(500),
            tab_ready: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub branch: Branch,
    pub terminal: String,
    pub script: String,
}

pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str) -> Result<()>;
}

/// Runs scripts through `osascript`.
pub struct OsaScript;

impl ScriptRunner for OsaScript {
    fn run(&self, script: &str) -> Result<()> {
        let out = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .context("running osascript")?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            bail!("osascript failed (exit={}): {}", out.status, stderr.trim());
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn ScriptRunner>,
    delays: LaunchDelays,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(OsaScript), LaunchDelays::default())
    }

    pub fn with_runner(runner: Arc<dyn ScriptRunner>, delays: LaunchDelays) -> Self {
        Self { runner, delays }
    }

    pub fn plan(&self, command: &str, terminal: &str) -> DispatchPlan {
        let branch = Branch::for_terminal(terminal);
        let script = match branch {
            Branch::CreateWindow => create_window_script(command, terminal, &self.delays),
            Branch::RunInTab => run_in_tab_script(command, terminal, &self.delays),
        };
        DispatchPlan {
            branch,
            terminal: terminal.to_string(),
            script,
        }
    }

    /// Runs the script on the calling thread and reports the outcome.
    pub fn run_blocking(&self, command: &str, terminal: &str) -> Result<()> {
        let plan = self.plan(command, terminal);
        debug!("{:?} dispatch to {}", plan.branch, plan.terminal);
        self.runner
            .run(&plan.script)
            .with_context(|| format!("dispatch to {terminal}"))
    }

    /// Fire-and-forget: schedules the command on a background thread and returns.
    ///
    /// Failures are logged; nothing is reported back. Concurrent dispatches are
    /// not serialized and may race for the same terminal's new window or tab.
    pub fn dispatch(&self, command: &str, terminal: &str) {
        let this = self.clone();
        let command = command.to_string();
        let terminal = terminal.to_string();

        let spawned = thread::Builder::new()
            .name("mbsc-dispatch".to_string())
            .spawn(move || match this.run_blocking(&command, &terminal) {
                Ok(()) => info!("dispatched to {terminal}"),
                Err(e) => error!("{e:#}"),
            });
        if let Err(e) = spawned {
            error!("failed to spawn dispatch thread: {e}");
        }
    }
}

fn seconds(d: Duration) -> String {
    format!("{}", d.as_secs_f64())
}

fn create_window_script(command: &str, terminal: &str, delays: &LaunchDelays) -> String {
    let new_window = seconds(delays.new_window);
    let cold_launch = seconds(delays.cold_launch);
    format!(
        r#"if application "{terminal}" is running then
    tell application "{terminal}"
        activate
        tell (create window with default profile)
            delay {new_window}
            tell current session
                write text "{command}"
            end tell
        end tell
    end tell
else
    tell application "{terminal}"
        activate
        delay {cold_launch}
        tell current window
            tell current session
                write text "{command}"
            end tell
        end tell
    end tell
end if"#
    )
}

fn run_in_tab_script(command: &str, terminal: &str, delays: &LaunchDelays) -> String {
    let tab_ready = seconds(delays.tab_ready);
    format!(
        r#"tell application "{terminal}"
    if not (running) then
        activate
        delay {tab_ready}
        do script "{command}" in window 1
    else
        activate
        tell application "System Events"
            keystroke "t" using {{command down}}
        end tell
        delay {tab_ready}
        tell front window
            do script "{command}" in selected tab
        end tell
    end if
end tell"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        mpsc::{self, Sender},
        Mutex,
    };

    struct Recording(Mutex<Sender<String>>);

    impl ScriptRunner for Recording {
        fn run(&self, script: &str) -> Result<()> {
            let _ = self.0.lock().unwrap().send(script.to_string());
            Ok(())
        }
    }

    struct Failing;

    impl ScriptRunner for Failing {
        fn run(&self, _script: &str) -> Result<()> {
            bail!("execution error: Not authorized to send Apple events")
        }
    }

    #[test]
    fn selects_branch_by_exact_terminal_name() {
        assert_eq!(Branch::for_terminal("iTerm"), Branch::CreateWindow);
        assert_eq!(Branch::for_terminal("Terminal"), Branch::RunInTab);
        assert_eq!(Branch::for_terminal("AnyOtherName"), Branch::RunInTab);
        assert_eq!(Branch::for_terminal("iterm"), Branch::RunInTab);
        assert_eq!(Branch::for_terminal("iTerm2"), Branch::RunInTab);
    }

    #[test]
    fn iterm_plan_embeds_command_verbatim() {
        let plan = Dispatcher::new().plan("ls -la", "iTerm");
        assert_eq!(plan.branch, Branch::CreateWindow);
        assert!(plan.script.contains(r#"write text "ls -la""#));
        assert!(plan.script.contains("create window with default profile"));
        assert!(plan.script.contains("delay 0.2"));
        assert!(plan.script.contains("delay 0.5"));
        assert!(!plan.script.contains("do script"));
    }

    #[test]
    fn default_plan_opens_tab_when_running() {
        let plan = Dispatcher::new().plan("htop", "Terminal");
        assert_eq!(plan.branch, Branch::RunInTab);
        assert!(plan.script.starts_with(r#"tell application "Terminal""#));
        assert!(plan.script.contains(r#"do script "htop" in window 1"#));
        assert!(plan.script.contains(r#"keystroke "t" using {command down}"#));
        assert!(plan.script.contains(r#"do script "htop" in selected tab"#));
        assert_eq!(plan.script.matches("delay 0.3").count(), 2);

        let keystroke = plan.script.find("keystroke").unwrap();
        let tab = plan.script.find("in selected tab").unwrap();
        assert!(keystroke < tab);
    }

    #[test]
    fn other_terminal_names_are_addressed_directly() {
        let plan = Dispatcher::new().plan("make", "Ghostty");
        assert_eq!(plan.branch, Branch::RunInTab);
        assert!(plan.script.contains(r#"tell application "Ghostty""#));
    }

    #[test]
    fn delays_are_configurable() {
        let delays = LaunchDelays {
            new_window: Duration::from_millis(1500),
            cold_launch: Duration::from_secs(2),
            tab_ready: Duration::from_millis(250),
        };
        let dispatcher = Dispatcher::with_runner(Arc::new(OsaScript), delays);
        let iterm = dispatcher.plan("x", ITERM).script;
        assert!(iterm.contains("delay 1.5"));
        assert!(iterm.contains("delay 2"));
        let term = dispatcher.plan("x", "Terminal").script;
        assert!(term.contains("delay 0.25"));
    }

    #[test]
    fn dispatch_runs_in_background() {
        let (tx, rx) = mpsc::channel();
        let dispatcher = Dispatcher::with_runner(
            Arc::new(Recording(Mutex::new(tx))),
            LaunchDelays::default(),
        );

        dispatcher.dispatch("ls -la", ITERM);

        let script = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(script, dispatcher.plan("ls -la", ITERM).script);
    }

    #[test]
    fn run_blocking_reports_runner_errors() {
        let dispatcher = Dispatcher::with_runner(Arc::new(Failing), LaunchDelays::default());
        let err = dispatcher.run_blocking("ls", "Terminal").unwrap_err();
        assert!(format!("{err:#}").contains("Not authorized"));

        // Fire-and-forget swallows the same failure.
        dispatcher.dispatch("ls", "Terminal");
    }
}
