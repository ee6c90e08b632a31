//! VM configuration.

use nksp_core::vmint;
use serde::{Deserialize, Serialize};

/// Tunable execution parameters of the VM.
///
/// The defaults cap one `exec()` call at roughly 300 µs before a loop
/// iteration suspends (soft) and 1000 µs before any further step suspends
/// (hard), assuming around 5 µs per instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Instruction count after which loop iterations auto-suspend.
    pub max_instructions_soft: u64,
    /// Instruction count after which any step auto-suspends.
    pub max_instructions_hard: u64,
    /// Duration of a forced suspension, in microseconds.
    pub suspension_microseconds: vmint,
    /// Master switch for budget-based auto-suspension.
    pub auto_suspend: bool,
    /// Whether `exit()` accepts an argument and captures it as the
    /// execution's result.
    pub exit_result_enabled: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_instructions_soft: 70,
            max_instructions_hard: 210,
            suspension_microseconds: 1000,
            auto_suspend: true,
            exit_result_enabled: false,
        }
    }
}

impl VmConfig {
    /// Load a configuration from TOML text; omitted keys keep their
    /// defaults.
    pub fn from_toml_str(text: &str) -> Result<VmConfig, String> {
        toml::from_str(text).map_err(|e| format!("invalid VM configuration: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.max_instructions_soft, 70);
        assert_eq!(cfg.max_instructions_hard, 210);
        assert_eq!(cfg.suspension_microseconds, 1000);
        assert!(cfg.auto_suspend);
        assert!(!cfg.exit_result_enabled);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let cfg = VmConfig::from_toml_str("max_instructions_hard = 500\nauto_suspend = false")
            .unwrap();
        assert_eq!(cfg.max_instructions_hard, 500);
        assert!(!cfg.auto_suspend);
        assert_eq!(cfg.max_instructions_soft, 70);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(VmConfig::from_toml_str("max_instructions_soft = \"many\"").is_err());
    }
}
