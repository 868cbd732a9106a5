use crate::err::SaverError;
use huescreen_lib::{Lang, Schedule, ScheduleError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Behavior settings, read from config.toml. Connection settings live
/// in the command line / environment instead.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct SaverConfig {
    /// seconds of sustained no-motion before the screen turns off
    pub cool_down: u32,
    pub start_time: String,
    pub end_time: String,
    pub active_days: Vec<String>,
    /// when false the quiet window applies every day (legacy behavior)
    pub weekday_gate: bool,
    /// milliseconds between sensor polls
    pub poll_interval: u64,
    pub language: String,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            cool_down: 300,
            start_time: "06:00".to_string(),
            end_time: "00:00".to_string(),
            active_days: vec!["Sat".to_string(), "Sun".to_string()],
            weekday_gate: true,
            poll_interval: 2000,
            language: "en".to_string(),
        }
    }
}

fn config_path() -> Box<Path> {
    directories::ProjectDirs::from("", "", "huescreen").map_or_else(
        || Path::new("/tmp").into(),
        |proj_dirs| proj_dirs.config_dir().into(),
    )
}

impl SaverConfig {
    pub fn load() -> Result<Self, SaverError> {
        let path = config_path();
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        let path = path.join("config.toml");
        if path.exists() {
            let read = fs::read_to_string(path)?;
            Ok(toml::from_str(&read)?)
        } else {
            let config = Self::default();
            fs::write(path, toml::to_string(&config)?)?;
            Ok(config)
        }
    }

    pub fn schedule(&self) -> Result<Schedule, ScheduleError> {
        Schedule::new(
            &self.start_time,
            &self.end_time,
            &self.active_days,
            self.weekday_gate,
        )
    }

    #[must_use]
    pub fn lang(&self) -> Lang {
        Lang::from_tag(&self.language)
    }
}
