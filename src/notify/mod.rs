//! Alarm presentation
//!
//! The host shows at most one alarm notification at a time. Presenting a new
//! one replaces whatever was shown; cancelling removes it.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Identifier of the single action button on an alarm notification
pub const STOP_ACTION_ID: &str = "stop_alarm";

/// Errors that can occur while presenting or cancelling a notification
#[derive(Error, Debug)]
pub enum PresentError {
    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Presenter lock poisoned")]
    Poisoned,
}

/// The content of an alarm notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmNotification {
    /// Geofence the alarm belongs to
    pub location: String,
    pub title: String,
    pub body: String,
    /// Action delivered back to the app when the button is tapped
    pub action_id: String,
}

impl AlarmNotification {
    /// Build the standard notification for a geofence
    pub fn for_location(location: &str) -> Self {
        AlarmNotification {
            location: location.to_string(),
            title: "Location Alarm".to_string(),
            body: format!("You are near {}", location),
            action_id: STOP_ACTION_ID.to_string(),
        }
    }
}

/// Trait for notification presentation backends
pub trait AlarmPresenter: Send + Sync {
    /// Show a persistent notification with one action button
    fn present(&self, notification: &AlarmNotification) -> Result<(), PresentError>;

    /// Remove the notification, if one is shown
    fn cancel(&self) -> Result<(), PresentError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Console, // Default
        }
    }
}

/// Record written for every presentation change
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum NotificationRecord<'a> {
    Present {
        #[serde(flatten)]
        notification: &'a AlarmNotification,
    },
    Cancel {
        location: Option<&'a str>,
    },
}

/// Presenter that writes notifications to stdout or a file
///
/// Stands in for a desktop notification service on headless hosts. It keeps
/// track of the notification currently shown so `cancel` can name it.
pub struct NotificationOutput {
    format: OutputFormat,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    shown: Mutex<Option<AlarmNotification>>,
}

impl NotificationOutput {
    /// Create a new notification output
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, PresentError> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(NotificationOutput {
            format,
            writer: Mutex::new(writer),
            shown: Mutex::new(None),
        })
    }

    /// The notification currently shown, if any
    pub fn shown(&self) -> Option<AlarmNotification> {
        self.shown.lock().ok().and_then(|shown| shown.clone())
    }

    fn render(&self, record: &NotificationRecord<'_>) -> Result<String, PresentError> {
        let output = match &self.format {
            OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(record)?),
            OutputFormat::Jsonl => format!("{}\n", serde_json::to_string(record)?),
            OutputFormat::Console => match record {
                NotificationRecord::Present { notification } => format!(
                    "[{}] {} (action: {})\n",
                    notification.title, notification.body, notification.action_id
                ),
                NotificationRecord::Cancel { location } => format!(
                    "[Location Alarm] cleared{}\n",
                    location.map(|l| format!(" for {}", l)).unwrap_or_default()
                ),
            },
        };
        Ok(output)
    }

    fn write_output(&self, data: &str) -> Result<(), PresentError> {
        let mut writer = self.writer.lock().map_err(|_| PresentError::Poisoned)?;
        match writer.as_mut() {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                let mut stdout = std::io::stdout();
                stdout.write_all(data.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

impl AlarmPresenter for NotificationOutput {
    fn present(&self, notification: &AlarmNotification) -> Result<(), PresentError> {
        let output = self.render(&NotificationRecord::Present { notification })?;
        self.write_output(&output)?;

        let mut shown = self.shown.lock().map_err(|_| PresentError::Poisoned)?;
        *shown = Some(notification.clone());
        Ok(())
    }

    fn cancel(&self) -> Result<(), PresentError> {
        let mut shown = self.shown.lock().map_err(|_| PresentError::Poisoned)?;
        let previous = shown.take();

        let output = self.render(&NotificationRecord::Cancel {
            location: previous.as_ref().map(|n| n.location.as_str()),
        })?;
        self.write_output(&output)
    }
}
