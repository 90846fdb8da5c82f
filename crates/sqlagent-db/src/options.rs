use std::time::Duration;

/// Whether statements that modify data may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, AccessMode::ReadOnly)
    }
}

/// Options that control how the database handle connects and samples.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Rows shown per table by the schema tool.
    pub sample_rows: u32,
    pub access: AccessMode,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            sample_rows: 3,
            access: AccessMode::ReadWrite,
        }
    }
}
