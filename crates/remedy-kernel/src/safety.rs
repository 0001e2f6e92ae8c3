//! Destructive-command blocklist
//!
//! Every connector renders the full remote command first and hands the
//! rendered string to [`SafetyValidator::validate`] before anything is sent.
//! Matching is case-insensitive and looks at the whole string, so a
//! dangerous token is caught no matter which field supplied it.
//!
//! Blocked families:
//! - Disk and volume formatting
//! - Recursive deletion
//! - Forced host shutdown
//! - Privileged account or group removal
//! - Schema-destroying SQL

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};

/// Built-in destructive patterns, matched case-insensitively
pub const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    // disk / volume
    r"\bformat-volume\b",
    r"\bformat\s+[a-z]:",
    r"\bmkfs(\.\w+)?\b",
    r"\bclear-disk\b",
    r"\bdiskpart\b.*\bclean\b",
    r"\bdd\b.*\bof=/dev/",
    // recursive deletion
    r"\brm\s+(-\S+\s+)*(-[a-z]*r[a-z]*|--recursive)\b",
    r"\bremove-item\b.*-recurse\b",
    r"\brmdir\s+/s\b",
    r"\bdel\s+/s\b",
    // forced shutdown
    r"\bstop-computer\b",
    r"\bshutdown\s+(-h|/s)\b",
    r"\bpoweroff\b",
    r"\bhalt\b",
    // privileged accounts
    r"\bremove-adgroupmember\b",
    r"\bremove-localgroupmember\b.*\badministrators\b",
    r"\bnet\s+user\b.*/delete\b",
    r"\buserdel\b",
    r"\bremove-aduser\b",
    // schema destruction
    r"\bdrop\s+(database|schema|table)\b",
    r"\btruncate\s+table\b",
];

static DEFAULT_SET: Lazy<SafetyValidator> = Lazy::new(|| {
    SafetyValidator::compile(DEFAULT_BLOCKED_PATTERNS.iter().map(|p| (*p).to_string()))
        .unwrap_or_else(|err| {
            tracing::error!("built-in blocked patterns failed to compile: {}", err);
            SafetyValidator::deny_all()
        })
});

/// A rendered command matched a blocked pattern
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command matches blocked pattern `{pattern}`")]
pub struct SafetyViolation {
    /// The pattern that matched
    pub pattern: String,
    /// The rendered command that was rejected
    pub command: String,
}

/// Case-insensitive blocklist over rendered commands
#[derive(Debug, Clone)]
pub struct SafetyValidator {
    set: RegexSet,
    patterns: Vec<String>,
    deny_all: bool,
}

impl SafetyValidator {
    /// Validator with the built-in patterns only
    #[must_use]
    pub fn new() -> Self {
        DEFAULT_SET.clone()
    }

    /// Built-in patterns plus operator-configured ones
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] for the first pattern that
    /// does not compile.
    pub fn with_additional_patterns<I, S>(extra: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = DEFAULT_BLOCKED_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .chain(extra.into_iter().map(Into::into));
        Self::compile(patterns)
    }

    fn compile(patterns: impl Iterator<Item = String>) -> Result<Self, ConfigError> {
        let patterns: Vec<String> = patterns.collect();

        for pattern in &patterns {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
        }

        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: patterns.join(" | "),
                source,
            })?;

        Ok(Self {
            set,
            patterns,
            deny_all: false,
        })
    }

    /// Rejects every command; used if the built-in set cannot be compiled
    fn deny_all() -> Self {
        Self {
            set: RegexSet::empty(),
            patterns: Vec::new(),
            deny_all: true,
        }
    }

    /// Check a fully rendered command
    ///
    /// # Errors
    /// Returns the first matching pattern as a [`SafetyViolation`].
    pub fn validate(&self, rendered: &str) -> Result<(), SafetyViolation> {
        if self.deny_all {
            return Err(SafetyViolation {
                pattern: "*".to_string(),
                command: rendered.to_string(),
            });
        }
        match self.set.matches(rendered).iter().next() {
            None => Ok(()),
            Some(index) => {
                let pattern = self.patterns[index].clone();
                tracing::warn!(pattern = %pattern, command = %rendered, "safety violation");
                Err(SafetyViolation {
                    pattern,
                    command: rendered.to_string(),
                })
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn is_safe(&self, rendered: &str) -> bool {
        !self.deny_all && !self.set.is_match(rendered)
    }

    /// Active patterns, built-ins first
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a single pattern the way the validator does
///
/// # Errors
/// Returns [`ConfigError::InvalidPattern`] if the pattern is not a valid regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_patterns_compile() {
        for pattern in DEFAULT_BLOCKED_PATTERNS {
            assert!(compile_pattern(pattern).is_ok(), "{pattern}");
        }
        assert_eq!(
            SafetyValidator::new().patterns().len(),
            DEFAULT_BLOCKED_PATTERNS.len()
        );
    }

    #[test]
    fn rejects_destructive_commands() {
        let validator = SafetyValidator::new();
        let blocked = [
            "Format-Volume -DriveLetter D",
            "format c: /q",
            "mkfs.ext4 /dev/sdb1",
            "Clear-Disk -Number 1 -RemoveData",
            "diskpart /s script && clean",
            "dd if=/dev/zero of=/dev/sda bs=1M",
            "rm -rf /var/lib/app",
            "rm -fr /tmp/x",
            "Remove-Item C:\\data -Recurse -Force",
            "rmdir /s /q C:\\app",
            "del /s C:\\logs\\*",
            "Stop-Computer -Force",
            "shutdown -h now",
            "shutdown /s /t 0",
            "poweroff",
            "halt",
            "Remove-ADGroupMember -Identity 'Domain Admins' -Members bob",
            "Remove-LocalGroupMember -Group Administrators -Member bob",
            "net user bob /delete",
            "userdel -r bob",
            "Remove-ADUser -Identity bob",
            "DROP DATABASE prod",
            "drop schema public cascade",
            "Drop Table users",
            "TRUNCATE TABLE orders",
        ];

        for command in blocked {
            assert!(validator.validate(command).is_err(), "{command}");
        }
    }

    #[test]
    fn recursive_rm_is_caught_in_any_flag_form() {
        let validator = SafetyValidator::new();
        let blocked = [
            "rm -r -f /",
            "rm -f -r /srv",
            "rm -R /var",
            "rm -r build",
            "rm --recursive --force /",
            "rm --force --recursive /opt",
            "rm -v --recursive /",
            "sudo rm -Rf /",
        ];
        for command in blocked {
            assert!(validator.validate(command).is_err(), "{command}");
        }

        for command in ["rm -f /tmp/lock", "rm --force /tmp/lock", "rm -i notes.txt"] {
            assert!(validator.validate(command).is_ok(), "{command}");
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let validator = SafetyValidator::new();
        assert!(!validator.is_safe("FORMAT-VOLUME"));
        assert!(!validator.is_safe("format-volume"));
        assert!(!validator.is_safe("Restart-Service -Name 'fOrMaT-vOlUmE' -Force"));
    }

    #[test]
    fn allows_routine_operations() {
        let validator = SafetyValidator::new();
        let allowed = [
            "Restart-Service -Name 'w3svc' -Force",
            "kubectl rollout restart deployment/api -n default",
            "kubectl scale deployment/api --replicas=3 -n default",
            "aws ec2 reboot-instances --instance-ids i-0abc",
            "Get-Service -Name 'spooler' | ConvertTo-Json",
            "rm /tmp/single-file",
            "SELECT * FROM tables",
        ];

        for command in allowed {
            assert!(validator.validate(command).is_ok(), "{command}");
        }
    }

    #[test]
    fn violation_reports_pattern_and_command() {
        let err = SafetyValidator::new()
            .validate("Restart-Service -Name 'Format-Volume' -Force")
            .unwrap_err();
        assert_eq!(err.pattern, DEFAULT_BLOCKED_PATTERNS[0]);
        assert!(err.command.contains("Format-Volume"));
    }

    #[test]
    fn additional_patterns_extend_defaults() {
        let validator =
            SafetyValidator::with_additional_patterns(["\\bkill\\s+-9\\s+1\\b"]).unwrap();
        assert!(validator.validate("kill -9 1").is_err());
        assert!(validator.validate("rm -rf /").is_err());
    }

    #[test]
    fn invalid_additional_pattern_is_config_error() {
        let err = SafetyValidator::with_additional_patterns(["(unclosed"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
