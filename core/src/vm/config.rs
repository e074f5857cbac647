use serde::{Deserialize, Serialize};

/// Operand stack slots per frame.
pub const FRAME_STACK_MAX: usize = 128;
/// Arguments accepted by a single call.
pub const FRAME_ARG_MAX: usize = 24;
/// Captured variables per closure.
pub const FRAME_CLOSURE_MAX: usize = 24;
/// Nested calls before the VM refuses to go deeper.
pub const RECURSION_MAX: usize = 256;

/// Resource limits for one [`Vm`](super::Vm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    pub max_stack: usize,
    pub max_args: usize,
    pub max_closures: usize,
    pub max_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack: FRAME_STACK_MAX,
            max_args: FRAME_ARG_MAX,
            max_closures: FRAME_CLOSURE_MAX,
            max_depth: RECURSION_MAX,
        }
    }
}

impl VmConfig {
    /// Parse a flat TOML table; missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(src)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_stack(mut self, slots: usize) -> Self {
        self.max_stack = slots;
        self
    }
}
