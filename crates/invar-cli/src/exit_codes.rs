//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Inventory error - unreadable inventory, malformed variable files, failed imports
pub const INVENTORY_ERROR: i32 = 2;

/// Container error - compose files, image versions file, manifest serialization
pub const CONTAINER_ERROR: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
