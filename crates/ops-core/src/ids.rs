//! ID prefix constants.
//!
//! All entity IDs are `"<prefix>-<8 hex chars>"`, generated in SQL at insert
//! time. The prefix makes IDs self-describing in logs and audit rows.

pub const PREFIX_TASK: &str = "tsk";
pub const PREFIX_PROJECT: &str = "prj";
pub const PREFIX_USER: &str = "usr";
pub const PREFIX_ROLE: &str = "rol";
pub const PREFIX_USER_ROLE: &str = "url";
pub const PREFIX_AUDIT: &str = "aud";

/// All known prefixes, for validation and test sweeps.
pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_TASK,
    PREFIX_PROJECT,
    PREFIX_USER,
    PREFIX_ROLE,
    PREFIX_USER_ROLE,
    PREFIX_AUDIT,
];
