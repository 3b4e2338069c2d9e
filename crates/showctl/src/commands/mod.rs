pub mod functions;
pub mod run;
pub mod validate;

/// Process exit codes for pipeline outcomes
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_STEP_FAILURE: i32 = 1;
pub const EXIT_CANCELLED: i32 = 2;
pub const EXIT_BAD_CONFIGURATION: i32 = 3;
pub const EXIT_NO_PROVIDER: i32 = 4;
