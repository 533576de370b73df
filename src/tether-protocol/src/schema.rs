//! Command and flag schema reported by a plugin.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Value type of a plugin flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    /// Free-form string value.
    String,
    /// Boolean switch.
    Bool,
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Bool => write!(f, "bool"),
        }
    }
}

/// A single flag accepted by a plugin command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FlagDefinition {
    /// Long flag name, without leading dashes.
    pub name: String,

    /// Optional one-character short form.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shorthand: String,

    /// Value type.
    #[serde(rename = "type")]
    pub flag_type: FlagType,

    /// Reject invocations that omit this flag.
    #[serde(default)]
    pub required: bool,

    /// Help text.
    #[serde(default)]
    pub usage: String,

    /// Prompt shown when the flag was left at its default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,

    /// Fixed choices offered by the prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FlagDefinition {
    fn new(name: impl Into<String>, flag_type: FlagType) -> Self {
        Self {
            name: name.into(),
            shorthand: String::new(),
            flag_type,
            required: false,
            usage: String::new(),
            prompt: String::new(),
            options: Vec::new(),
        }
    }

    /// A string flag.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FlagType::String)
    }

    /// A boolean flag.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FlagType::Bool)
    }

    pub fn with_shorthand(mut self, shorthand: char) -> Self {
        self.shorthand = shorthand.to_string();
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The shorthand as a char, if it is exactly one character long.
    pub fn shorthand_char(&self) -> Option<char> {
        let mut chars = self.shorthand.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    /// Whether the user should be prompted for this flag.
    pub fn has_prompt(&self) -> bool {
        !self.prompt.is_empty()
    }
}

/// One command exposed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandDefinition {
    /// Usage line; the first word is the command name.
    #[serde(rename = "use")]
    pub use_line: String,

    /// One-line description.
    #[serde(default)]
    pub short: String,

    /// Long description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub long: String,

    /// Example invocation(s).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub example: String,

    /// Flags accepted by the command.
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,

    /// The command expects to talk to a user.
    #[serde(default)]
    pub interactive: bool,
}

impl CommandDefinition {
    pub fn new(use_line: impl Into<String>) -> Self {
        Self {
            use_line: use_line.into(),
            short: String::new(),
            long: String::new(),
            example: String::new(),
            flags: Vec::new(),
            interactive: false,
        }
    }

    pub fn with_short(mut self, short: impl Into<String>) -> Self {
        self.short = short.into();
        self
    }

    pub fn with_long(mut self, long: impl Into<String>) -> Self {
        self.long = long.into();
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }

    pub fn with_flag(mut self, flag: FlagDefinition) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Command name: the first word of the usage line.
    pub fn name(&self) -> &str {
        self.use_line.split_whitespace().next().unwrap_or("")
    }

    /// Look up a flag by long name.
    pub fn flag(&self, name: &str) -> Option<&FlagDefinition> {
        self.flags.iter().find(|f| f.name == name)
    }
}

/// Result of the Discover method.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DiscoverResult {
    pub commands: Vec<CommandDefinition>,
}
