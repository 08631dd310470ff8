use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkageError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Invalid configuration value (threshold range, fold count, weight length, empty pool, ...).
    Config(String),
    /// Invalid input data (empty record store, duplicate id, malformed CSV row, ...).
    Data(String),
    /// Attribute index outside a record's value list.
    AttributeIndex { record_id: String, index: usize, len: usize },
    /// A computation cannot produce a meaningful result from its inputs.
    Computation(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for LinkageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Data(msg) => write!(f, "data error: {msg}"),
            Self::AttributeIndex { record_id, index, len } => {
                write!(
                    f,
                    "data error: record '{record_id}' has {len} attribute(s), index {index} is out of range"
                )
            }
            Self::Computation(msg) => write!(f, "computation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for LinkageError {}

impl LinkageError {
    /// True for errors caused by the configuration rather than the data.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigParse(_) | Self::Config(_))
    }

    /// True for errors caused by the input records or files.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_) | Self::AttributeIndex { .. } | Self::Io(_))
    }
}
