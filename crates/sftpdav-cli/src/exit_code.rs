//! Process exit codes.

/// Served until interrupted and shut down cleanly
pub const SUCCESS: u8 = 0;
/// Any error without a more specific code
pub const GENERAL_ERROR: u8 = 1;
/// Could not dial or authenticate to the remote host
pub const CONNECTION_FAILED: u8 = 3;
/// Malformed descriptor, config file or remote home directory
pub const CONFIG_INVALID: u8 = 4;
/// Permission denied (local key file or listen address)
pub const PERMISSION_DENIED: u8 = 5;
/// The listen address is already taken
pub const ADDRESS_IN_USE: u8 = 6;
/// Interrupted before startup finished
pub const CANCELLED: u8 = 130;
