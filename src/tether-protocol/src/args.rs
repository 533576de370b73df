//! Canonical argument form.
//!
//! Resolved flags are forwarded to a plugin as plain strings:
//! `--name=value` for string flags, `--name` for a true boolean, nothing for a
//! false boolean. Positional arguments follow a `--` terminator.

use crate::error::{ProtocolError, Result};
use crate::schema::FlagType;

/// Terminator separating flags from positional arguments.
const END_OF_FLAGS: &str = "--";

/// A resolved flag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    String(String),
    Bool(bool),
}

impl FlagValue {
    /// The empty/false default for a flag type.
    pub fn default_for(flag_type: FlagType) -> Self {
        match flag_type {
            FlagType::String => Self::String(String::new()),
            FlagType::Bool => Self::Bool(false),
        }
    }

    /// Whether the value still equals its type default.
    pub fn is_default(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Bool(b) => !b,
        }
    }

    /// Parse user text into a value of the given type.
    pub fn parse_as(flag_type: FlagType, raw: &str) -> Option<Self> {
        match flag_type {
            FlagType::String => Some(Self::String(raw.to_string())),
            FlagType::Bool => parse_bool_loose(raw).map(Self::Bool),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(_) => None,
        }
    }
}

/// Parse a boolean the way a person would type it at a prompt.
pub fn parse_bool_loose(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Encode flags (in declaration order) and positionals into canonical form.
///
/// A `--` always precedes the positionals, whether or not the user typed one.
pub fn encode_canonical_args<'a, I>(flags: I, positional: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a FlagValue)>,
{
    let mut args = Vec::new();
    for (name, value) in flags {
        match value {
            FlagValue::String(s) => args.push(format!("--{name}={s}")),
            FlagValue::Bool(true) => args.push(format!("--{name}")),
            FlagValue::Bool(false) => {}
        }
    }
    if !positional.is_empty() {
        args.push(END_OF_FLAGS.to_string());
        args.extend(positional.iter().cloned());
    }
    args
}

/// Arguments decoded from canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedArgs {
    pub flags: Vec<(String, FlagValue)>,
    pub positional: Vec<String>,
}

impl DecodedArgs {
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.flags
            .iter()
            .find(|(flag, _)| flag == name)
            .map(|(_, value)| value)
    }

    /// String value of a flag, if present.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FlagValue::as_str)
    }

    /// Boolean flags are true when present.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(FlagValue::as_bool).unwrap_or(false)
    }
}

/// Reference decoder for [`encode_canonical_args`].
///
/// The first `=` splits name from value, so values may themselves contain
/// `=` and spaces.
pub fn decode_canonical_args(args: &[String]) -> Result<DecodedArgs> {
    let mut decoded = DecodedArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == END_OF_FLAGS {
            decoded.positional.extend(iter.by_ref().cloned());
            break;
        }
        match arg.strip_prefix("--") {
            Some(body) => {
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (name, FlagValue::String(value.to_string())),
                    None => (body, FlagValue::Bool(true)),
                };
                if name.is_empty() {
                    return Err(ProtocolError::InvalidArgument(arg.clone()));
                }
                decoded.flags.push((name.to_string(), value));
            }
            None => decoded.positional.push(arg.clone()),
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encode_forms() {
        let name = FlagValue::String("Ada".into());
        let empty = FlagValue::String(String::new());
        let loud = FlagValue::Bool(true);
        let quiet = FlagValue::Bool(false);

        let args = encode_canonical_args(
            [
                ("name", &name),
                ("region", &empty),
                ("loud", &loud),
                ("quiet", &quiet),
            ],
            &strings(&["one", "two"]),
        );

        assert_eq!(
            args,
            strings(&["--name=Ada", "--region=", "--loud", "--", "one", "two"])
        );
    }

    #[test]
    fn test_no_terminator_without_positionals() {
        let on = FlagValue::Bool(true);
        assert_eq!(encode_canonical_args([("v", &on)], &[]), strings(&["--v"]));
    }

    #[test]
    fn test_value_with_spaces_and_equals_roundtrips() {
        let original = "a b=c == d  ";
        let value = FlagValue::String(original.to_string());
        let args = encode_canonical_args([("query", &value)], &[]);

        let decoded = decode_canonical_args(&args).unwrap();
        assert_eq!(decoded.get_str("query"), Some(original));
    }

    #[test]
    fn test_dashed_positionals_stay_positional() {
        let args = encode_canonical_args(std::iter::empty(), &strings(&["--not-a-flag", "-x"]));
        let decoded = decode_canonical_args(&args).unwrap();
        assert!(decoded.flags.is_empty());
        assert_eq!(decoded.positional, strings(&["--not-a-flag", "-x"]));
    }

    #[test]
    fn test_decode_bool_and_missing() {
        let decoded = decode_canonical_args(&strings(&["--force", "--name=x"])).unwrap();
        assert!(decoded.get_bool("force"));
        assert!(!decoded.get_bool("dry-run"));
        assert_eq!(decoded.get_str("force"), None);
    }

    #[test]
    fn test_decode_rejects_empty_name() {
        assert!(decode_canonical_args(&strings(&["--=x"])).is_err());
    }

    #[test]
    fn test_flag_value_defaults() {
        assert!(FlagValue::default_for(FlagType::String).is_default());
        assert!(FlagValue::default_for(FlagType::Bool).is_default());
        assert!(!FlagValue::String("x".into()).is_default());
        assert!(!FlagValue::Bool(true).is_default());
    }

    #[test]
    fn test_parse_bool_loose() {
        assert_eq!(parse_bool_loose("Yes"), Some(true));
        assert_eq!(parse_bool_loose(" n "), Some(false));
        assert_eq!(parse_bool_loose("maybe"), None);
        assert_eq!(
            FlagValue::parse_as(FlagType::Bool, "1"),
            Some(FlagValue::Bool(true))
        );
        assert_eq!(FlagValue::parse_as(FlagType::Bool, "nah"), None);
    }
}
