//! Standard exit codes for CLI operations
//!
//! Template, input and configuration faults share the general failure
//! code; clap reports usage errors with its own code before any work starts.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - template, input or configuration fault
pub const ERROR: i32 = 1;

/// Usage error - invalid arguments or options (reported by clap)
pub const USAGE_ERROR: i32 = 2;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
