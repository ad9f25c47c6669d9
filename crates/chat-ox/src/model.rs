use serde::{Deserialize, Serialize};
use std::fmt;

/// Models served by the agent backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    /// Tool-calling agent used when the caller does not pick one
    #[default]
    #[serde(rename = "sgr_auto_tool_calling_agent")]
    SgrAutoToolCallingAgent,
}

impl Model {
    /// Get the string representation of the model
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::SgrAutoToolCallingAgent => "sgr_auto_tool_calling_agent",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
