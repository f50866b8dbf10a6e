/// User commands delivered to the consumer loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    TogglePause,
    Pause,
    Resume,
    ResetStatistics,
    TogglePerformance,
    ToggleRecording,
    Quit,
}

impl ControlCommand {
    /// Maps a key name to its command.
    ///
    /// `space` pauses, `r` resets statistics, `p` toggles the performance
    /// overlay, `v` toggles recording, `q` or `esc` quits. Matching is case
    /// insensitive; a single literal space counts as `space`.
    pub fn from_key(key: &str) -> Option<Self> {
        if key == " " {
            return Some(ControlCommand::TogglePause);
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "space" => Some(ControlCommand::TogglePause),
            "r" => Some(ControlCommand::ResetStatistics),
            "p" => Some(ControlCommand::TogglePerformance),
            "v" => Some(ControlCommand::ToggleRecording),
            "q" | "esc" | "escape" => Some(ControlCommand::Quit),
            _ => None,
        }
    }
}
