//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract: scripts branch on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 2    | Usage error (bad arguments, unreadable config path) |
//! | 3    | Invalid config, or one the command cannot use       |
//! | 4    | Data or IO error (CSV files, record ids, output)    |
//! | 5    | Computation error (degenerate training data, ...)   |

use reclink_linkage::LinkageError;

// =============================================================================
// Universal
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Linkage (3-5)
// =============================================================================

/// Config file does not parse or fails validation.
pub const EXIT_CONFIG: u8 = 3;

/// Input data could not be read or is malformed.
pub const EXIT_DATA: u8 = 4;

/// The pipeline ran but a step could not produce a result.
pub const EXIT_COMPUTATION: u8 = 5;

/// Map an engine error to its exit code.
pub fn linkage_exit_code(err: &LinkageError) -> u8 {
    if err.is_config() {
        EXIT_CONFIG
    } else if err.is_data() {
        EXIT_DATA
    } else {
        EXIT_COMPUTATION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_codes() {
        assert_eq!(linkage_exit_code(&LinkageError::ConfigParse("x".into())), EXIT_CONFIG);
        assert_eq!(linkage_exit_code(&LinkageError::Config("x".into())), EXIT_CONFIG);
        assert_eq!(linkage_exit_code(&LinkageError::Io("x".into())), EXIT_DATA);
        assert_eq!(
            linkage_exit_code(&LinkageError::AttributeIndex { record_id: "r".into(), index: 3, len: 1 }),
            EXIT_DATA
        );
        assert_eq!(linkage_exit_code(&LinkageError::Computation("x".into())), EXIT_COMPUTATION);
    }
}
