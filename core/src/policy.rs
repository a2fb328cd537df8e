//! Policy gate (spec §4.F): decides whether a tool call may proceed, must be
//! confirmed, or is denied outright. Grounded on the teacher's
//! `safety::assess_command_safety`/`assess_patch_safety` decision shape,
//! generalized from Codex's sandbox-centric `SafetyCheck` to the spec's
//! `allow / deny / requires_confirmation` gate over an explicit policy
//! object, with command recognition reusing [`crate::is_safe_command`].

use wildmatch::WildMatch;

use crate::config::PolicyConfig;
use crate::is_safe_command::is_known_safe_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RequiresConfirmation,
    Deny { code: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub decision: Decision,
    pub risk: RiskLevel,
    pub reason: String,
}

impl PolicyVerdict {
    fn allow(risk: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            risk,
            reason: reason.into(),
        }
    }

    fn confirm(risk: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::RequiresConfirmation,
            risk,
            reason: reason.into(),
        }
    }

    fn deny(code: &'static str, risk: RiskLevel, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            decision: Decision::Deny { code, reason: reason.clone() },
            risk,
            reason,
        }
    }
}

const NETWORK_COMMANDS: &[&str] = &["curl", "wget", "nc", "ssh", "scp", "rsync"];
const NETWORK_PHRASES: &[&str] = &["git clone", "git fetch", "git pull", "git push", "pip install", "npm install"];
const PRIVILEGE_ESCALATION: &[&str] = &["sudo", "chmod 777", "mkfs", "rm -rf /"];

pub struct PolicyGate<'a> {
    config: &'a PolicyConfig,
    risk_threshold: RiskLevel,
}

impl<'a> PolicyGate<'a> {
    pub fn new(config: &'a PolicyConfig) -> Self {
        Self {
            config,
            risk_threshold: RiskLevel::Critical,
        }
    }

    pub fn with_risk_threshold(mut self, threshold: RiskLevel) -> Self {
        self.risk_threshold = threshold;
        self
    }

    fn check_tool_name(&self, tool_name: &str) -> Option<PolicyVerdict> {
        if self.config.disallowed_tools.iter().any(|t| t == tool_name) {
            return Some(PolicyVerdict::deny(
                "E_TOOL_BLOCKED",
                RiskLevel::High,
                format!("tool '{tool_name}' is explicitly disallowed"),
            ));
        }
        if !self.config.allowed_tools.is_empty() && !self.config.allowed_tools.iter().any(|t| t == tool_name) {
            return Some(PolicyVerdict::deny(
                "E_TOOL_BLOCKED",
                RiskLevel::High,
                format!("tool '{tool_name}' is not in the allowed-tools list"),
            ));
        }
        None
    }

    /// Gate a `run_cmd` invocation. `argv` is the already-lexed command;
    /// `allowlist`/`denylist` are glob patterns matched against the joined
    /// command string.
    pub fn check_command(
        &self,
        tool_name: &str,
        argv: &[String],
        command_allowlist: &[String],
        command_denylist: &[String],
    ) -> PolicyVerdict {
        if let Some(v) = self.check_tool_name(tool_name) {
            return v;
        }

        let joined = argv.join(" ");

        for pattern in command_denylist {
            if WildMatch::new(pattern).matches(&joined) {
                return PolicyVerdict::deny(
                    "E_POLICY_DENIED",
                    RiskLevel::High,
                    format!("command matches denylist pattern '{pattern}'"),
                );
            }
        }

        if !command_allowlist.is_empty() && !command_allowlist.iter().any(|p| WildMatch::new(p).matches(&joined)) {
            return PolicyVerdict::deny(
                "E_POLICY_DENIED",
                RiskLevel::Medium,
                "command does not match any allowlist pattern",
            );
        }

        if PRIVILEGE_ESCALATION.iter().any(|p| joined.contains(p)) {
            return PolicyVerdict::deny(
                "E_POLICY_DENIED",
                RiskLevel::Critical,
                "command appears to attempt privilege escalation or destructive action",
            );
        }

        let looks_networked = argv.first().map(|c| NETWORK_COMMANDS.contains(&c.as_str())).unwrap_or(false)
            || NETWORK_PHRASES.iter().any(|p| joined.contains(p));
        if looks_networked && !self.config.allow_network {
            return PolicyVerdict::deny(
                "E_POLICY_DENIED",
                RiskLevel::Medium,
                "command appears to require network access, which is disabled",
            );
        }

        if is_known_safe_command(argv) {
            return PolicyVerdict::allow(RiskLevel::Safe, "matches known-safe command shape");
        }

        if self.config.confirm_exec {
            return PolicyVerdict::confirm(RiskLevel::Medium, "execution requires user confirmation");
        }

        PolicyVerdict::allow(RiskLevel::Low, "no denylist, network, or escalation signal detected")
    }

    /// Gate a file-write style tool call (`apply_patch`, `write_file`).
    /// `path_rules` is an ordered list of `(glob, allow)` pairs; the last
    /// matching rule wins, default allow when no rule matches.
    pub fn check_write(&self, tool_name: &str, relative_path: &str, path_rules: &[(String, bool)]) -> PolicyVerdict {
        if let Some(v) = self.check_tool_name(tool_name) {
            return v;
        }

        let mut allowed = true;
        for (pattern, allow) in path_rules {
            if WildMatch::new(pattern).matches(relative_path) {
                allowed = *allow;
            }
        }
        if !allowed {
            return PolicyVerdict::deny(
                "E_POLICY_DENIED",
                RiskLevel::Medium,
                format!("path '{relative_path}' is denied by a path rule"),
            );
        }

        if self.config.confirm_write {
            return PolicyVerdict::confirm(RiskLevel::Low, "write requires user confirmation");
        }

        PolicyVerdict::allow(RiskLevel::Safe, "write permitted")
    }

    /// Gate any other tool call by name only (read-only tools, semantic
    /// search, display, plugin invocations not covered above).
    pub fn check_tool(&self, tool_name: &str) -> PolicyVerdict {
        self.check_tool_name(tool_name)
            .unwrap_or_else(|| PolicyVerdict::allow(RiskLevel::Safe, "no restriction on this tool"))
    }

    pub fn enforce_risk_threshold(&self, verdict: PolicyVerdict) -> PolicyVerdict {
        if verdict.risk > self.risk_threshold && !matches!(verdict.decision, Decision::Deny { .. }) {
            return PolicyVerdict::deny(
                "E_POLICY_DENIED",
                verdict.risk,
                format!("risk level exceeds configured threshold ({:?})", self.risk_threshold),
            );
        }
        verdict
    }
}
