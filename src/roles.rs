//! Agent role identifiers for the investment pipeline
//!
//! Senders and recipients are logical agent-type strings drawn from a closed
//! set of pipeline roles, plus the `broadcast` sentinel which addresses every
//! matching subscriber rather than a single agent.

/// Decomposes a request into research/analysis tasks.
pub const PLANNING: &str = "planning";
/// Gathers market data and filings.
pub const RESEARCH: &str = "research";
/// Scores and interprets gathered data.
pub const ANALYSIS: &str = "analysis";
/// Screens recommendations against regulatory constraints.
pub const COMPLIANCE: &str = "compliance";
/// Assembles the final report.
pub const SYNTHESIS: &str = "synthesis";
/// Coordinates the pipeline; receives escalated high-priority traffic.
pub const SUPERVISOR: &str = "supervisor";

/// Sentinel recipient meaning "deliver to every subscriber matching the
/// message type", not a single named agent.
pub const BROADCAST: &str = "broadcast";

/// The closed set of pipeline roles (excludes the `broadcast` sentinel).
pub const KNOWN_ROLES: &[&str] = &[
    PLANNING, RESEARCH, ANALYSIS, COMPLIANCE, SYNTHESIS, SUPERVISOR,
];

/// Returns `true` if `role` is one of the known pipeline roles.
///
/// The bus does not reject unknown roles (agents may register experimental
/// types) but callers can use this to warn on typos.
pub fn is_known(role: &str) -> bool {
    KNOWN_ROLES.contains(&role)
}
