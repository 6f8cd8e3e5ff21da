//! Configuration and startup errors shared across crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_field() {
        let err = Error::Config("tenant_id must not be empty".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: tenant_id must not be empty"
        );
    }

    #[test]
    fn toml_errors_convert_with_question_mark() {
        fn parse() -> Result<toml::Table> {
            Ok(toml::from_str("[azure\ntenant_id = ")?)
        }
        let err = parse().unwrap_err();
        assert!(
            err.to_string().starts_with("TOML parse error:"),
            "got: {err}"
        );
    }
}
