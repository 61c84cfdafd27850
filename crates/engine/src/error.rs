use thiserror::Error;

/// Shape or naming input the engine refuses to act on. Never clamped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("radius must be between 1 and {max}, got {value}")]
    Radius { value: i64, max: u32 },
    #[error("{name} must be between 1 and {max}, got {value}")]
    Side {
        name: &'static str,
        value: i64,
        max: u32,
    },
    #[error("map name must not be empty")]
    EmptyName,
    #[error("tiles do not match a {shape} grid: {detail}")]
    TileMismatch { shape: &'static str, detail: String },
}
