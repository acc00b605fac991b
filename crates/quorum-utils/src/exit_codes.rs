//! Exit code constants for the quorum CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | Task or internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |

use crate::error::ConfigError;

/// Process exit code.
///
/// The numeric values are part of the CLI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Task failed or an internal error occurred
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid CLI arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<&ConfigError> for ExitCode {
    fn from(_: &ConfigError) -> Self {
        ExitCode::CLI_ARGS
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert!(ExitCode::SUCCESS.is_success());
        assert!(!ExitCode::INTERNAL.is_success());
    }

    #[test]
    fn test_config_errors_map_to_cli_args() {
        let err = ConfigError::MissingRequired("coders".to_string());
        assert_eq!(ExitCode::from(&err), ExitCode::CLI_ARGS);
        assert_eq!(i32::from(ExitCode::from(&err)), 2);
    }
}
