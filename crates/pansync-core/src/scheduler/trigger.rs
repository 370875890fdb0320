//! Cron triggers that start, stop, or re-check a folder.

use std::str::FromStr;

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TriggerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cron expression {expr:?}: {message}")]
pub struct TriggerError {
    pub expr: String,
    pub message: String,
}

/// Parse a cron expression. The classic 5-field form (no seconds) is
/// accepted alongside the 6/7-field form.
pub fn parse_cron(expr: &str) -> Result<Schedule, TriggerError> {
    let expr = expr.trim();
    let full = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&full).map_err(|e| TriggerError {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Begin a sync window.
    Start,
    /// End a sync window: drop queued work and stop running tasks.
    Stop,
    /// Recurring check outside of any window.
    Check,
}

#[derive(Debug, Clone)]
pub enum FolderTrigger {
    Window { start: Schedule, stop: Schedule },
    Check(Schedule),
}

impl FolderTrigger {
    pub fn from_config(cfg: &TriggerConfig) -> Result<Self, TriggerError> {
        Ok(match cfg {
            TriggerConfig::Window { start, stop } => FolderTrigger::Window {
                start: parse_cron(start)?,
                stop: parse_cron(stop)?,
            },
            TriggerConfig::Check { check } => FolderTrigger::Check(parse_cron(check)?),
        })
    }

    /// The earliest firing strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Local>) -> Option<(DateTime<Local>, TriggerAction)> {
        match self {
            FolderTrigger::Check(s) => s.after(after).next().map(|t| (t, TriggerAction::Check)),
            FolderTrigger::Window { start, stop } => {
                let start = start.after(after).next();
                let stop = stop.after(after).next();
                match (start, stop) {
                    (Some(a), Some(b)) if b < a => Some((b, TriggerAction::Stop)),
                    (Some(a), _) => Some((a, TriggerAction::Start)),
                    (None, Some(b)) => Some((b, TriggerAction::Stop)),
                    (None, None) => None,
                }
            }
        }
    }
}

/// Sleep until each firing and report it as `(folder, action)`. Ends when the
/// schedule runs out or the receiver is gone.
pub(crate) fn spawn_trigger(
    folder: String,
    trigger: FolderTrigger,
    tx: mpsc::UnboundedSender<(String, TriggerAction)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let Some((at, action)) = trigger.next_after(&now) else {
                tracing::info!(folder = %folder, "trigger schedule exhausted");
                return;
            };
            let wait = (at - now).to_std().unwrap_or_default();
            tracing::debug!(folder = %folder, ?action, at = %at, "next trigger");
            tokio::time::sleep(wait).await;
            if tx.send((folder.clone(), action)).is_err() {
                return;
            }
        }
    })
}
