use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiningError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("System error: {0}")]
    System(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Parse error: {error}")]
    ParseError { error: String },

    #[error("Validation error: {field}, reason: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value: {field}, value: {value}, reason: {reason}")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("Unknown {kind} '{id}'")]
    UnknownReference { kind: &'static str, id: String },

    #[error("Unknown trigger id '{trigger_id}' for trigger '{id}'")]
    UnknownTrigger { id: String, trigger_id: String },

    #[error("Unknown action id '{action_id}' for action '{id}'")]
    UnknownAction { id: String, action_id: String },

    #[error("No workers could be loaded")]
    NoWorkers,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("Working directory does not exist: {app}, path: {path}")]
    WorkingDirMissing { app: String, path: String },

    #[error("Executable not found: {app}, executable: {executable}")]
    ExecutableNotFound { app: String, executable: String },

    #[error("Spawn failed: {app}, error: {error}")]
    SpawnFailed { app: String, error: String },

    #[error("Terminate failed: pid {pid}, error: {error}")]
    TerminateFailed { pid: u32, error: String },

    #[error("Pseudo-terminal error: {error}")]
    Pty { error: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Process error in action '{action}': {source}")]
    Process {
        action: String,
        #[source]
        source: ProcessError,
    },
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {message}")]
    Server { message: String },

    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },
}

// 错误统计
#[derive(Debug, Default, Clone)]
pub struct ErrorStats {
    pub config_errors: u64,
    pub process_errors: u64,
    pub action_errors: u64,
    pub feed_errors: u64,
    pub total_errors: u64,
}

impl ErrorStats {
    pub fn record_error(&mut self, error: &MiningError) {
        self.total_errors += 1;

        match error {
            MiningError::Config(_) => self.config_errors += 1,
            MiningError::Process(_) => self.process_errors += 1,
            MiningError::Action(_) => self.action_errors += 1,
            MiningError::Feed(_) => self.feed_errors += 1,
            MiningError::System(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_stats() {
        let mut stats = ErrorStats::default();
        stats.record_error(&MiningError::Config(ConfigError::NoWorkers));
        stats.record_error(&MiningError::Feed(FeedError::Server { message: "down".to_string() }));
        stats.record_error(&MiningError::System("x".to_string()));

        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.config_errors, 1);
        assert_eq!(stats.feed_errors, 1);
        assert_eq!(stats.process_errors, 0);
    }
}
