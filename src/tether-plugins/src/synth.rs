//! Building clap commands from plugin schemas and resolving invocations.
//!
//! Every plugin becomes one root command whose subcommands mirror its
//! [`CommandDefinition`]s flag for flag. Parsing the user's command line
//! against that tree yields an [`Invocation`], which is checked for required
//! flags, completed by prompting, and encoded into canonical arguments.

use std::collections::HashSet;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tether_protocol::{
    CommandDefinition, ExecRequest, FlagDefinition, FlagType, FlagValue, encode_canonical_args,
};

use crate::error::{PluginError, Result};
use crate::prompt::Prompter;
use crate::registry::LoadedPlugin;

/// Arg id of the trailing positional arguments on every synthesized command.
pub const POSITIONAL_ID: &str = "__positional";

/// Subcommand names clap claims for itself.
const RESERVED_COMMANDS: &[&str] = &["help"];

/// Flag names and shorthands owned by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedNames {
    pub flags: Vec<String>,
    pub shorthands: Vec<char>,
}

impl Default for ReservedNames {
    fn default() -> Self {
        Self {
            flags: vec!["help".to_string()],
            shorthands: vec!['h'],
        }
    }
}

impl ReservedNames {
    pub fn new<I, S>(flags: I, shorthands: impl IntoIterator<Item = char>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reserved = Self::default();
        for flag in flags {
            let flag = flag.into();
            if !reserved.flags.contains(&flag) {
                reserved.flags.push(flag);
            }
        }
        for c in shorthands {
            if !reserved.shorthands.contains(&c) {
                reserved.shorthands.push(c);
            }
        }
        reserved
    }
}

/// Validates schemas and turns them into clap commands.
#[derive(Debug, Clone, Default)]
pub struct CommandSynthesizer {
    reserved: ReservedNames,
}

impl CommandSynthesizer {
    pub fn new(reserved: ReservedNames) -> Self {
        Self { reserved }
    }

    /// Reject schemas that cannot be mirrored onto the command line.
    pub fn validate(&self, plugin: &str, commands: &[CommandDefinition]) -> Result<()> {
        let mut names = HashSet::new();
        for command in commands {
            let name = command.name();
            if name.is_empty() {
                return Err(PluginError::invalid_schema(plugin, "command with empty 'use'"));
            }
            if name.starts_with('-') || RESERVED_COMMANDS.contains(&name) {
                return Err(PluginError::invalid_schema(
                    plugin,
                    format!("command name '{name}' is not allowed"),
                ));
            }
            if !names.insert(name) {
                return Err(PluginError::invalid_schema(
                    plugin,
                    format!("duplicate command '{name}'"),
                ));
            }
            self.validate_flags(plugin, command)?;
        }
        Ok(())
    }

    fn validate_flags(&self, plugin: &str, command: &CommandDefinition) -> Result<()> {
        let invalid = |message: String| {
            PluginError::invalid_schema(plugin, format!("command '{}': {message}", command.name()))
        };
        let mut names = HashSet::new();
        let mut shorthands = HashSet::new();

        for flag in &command.flags {
            let name = flag.name.as_str();
            if name.is_empty() {
                return Err(invalid("flag with empty name".into()));
            }
            if name.starts_with('-')
                || name == POSITIONAL_ID
                || name.chars().any(|c| c.is_whitespace() || c == '=')
            {
                return Err(invalid(format!("invalid flag name '{name}'")));
            }
            if self.reserved.flags.iter().any(|r| r == name) {
                return Err(invalid(format!("flag --{name} is reserved by the host")));
            }
            if !names.insert(name) {
                return Err(invalid(format!("duplicate flag --{name}")));
            }

            if flag.shorthand.is_empty() {
                continue;
            }
            let Some(short) = flag.shorthand_char().filter(char::is_ascii_alphanumeric) else {
                return Err(invalid(format!(
                    "shorthand '{}' of --{name} must be one ASCII letter or digit",
                    flag.shorthand
                )));
            };
            if self.reserved.shorthands.contains(&short) {
                return Err(invalid(format!("shorthand -{short} is reserved by the host")));
            }
            if !shorthands.insert(short) {
                return Err(invalid(format!("duplicate shorthand -{short}")));
            }
        }
        Ok(())
    }

    /// Root command for a plugin, one subcommand per definition.
    pub fn build_root(&self, plugin: &LoadedPlugin) -> Command {
        let manifest = &plugin.manifest;
        let mut root = Command::new(plugin.name().to_string())
            .about(manifest.short.clone())
            .subcommand_required(true)
            .arg_required_else_help(true);
        if !manifest.long.is_empty() {
            root = root.long_about(manifest.long.clone());
        }
        for definition in &plugin.commands {
            root = root.subcommand(build_command(plugin.name(), definition));
        }
        root
    }

    /// Map parsed matches of a plugin root back to an [`Invocation`].
    pub fn resolve(&self, plugin: &LoadedPlugin, matches: &ArgMatches) -> Result<Invocation> {
        let Some((name, sub_matches)) = matches.subcommand() else {
            return Err(PluginError::NotFound(format!("{} <command>", plugin.name())));
        };
        let command = plugin
            .command(name)
            .ok_or_else(|| PluginError::NotFound(format!("{} {name}", plugin.name())))?;
        Ok(Invocation::from_matches(plugin.name(), command, sub_matches))
    }
}

/// One synthesized subcommand.
pub fn build_command(root: &str, definition: &CommandDefinition) -> Command {
    let mut command = Command::new(definition.name().to_string())
        .about(definition.short.clone())
        .override_usage(format!("{root} {}", definition.use_line));
    if !definition.long.is_empty() {
        command = command.long_about(definition.long.clone());
    }
    if !definition.example.is_empty() {
        command = command.after_help(examples_block(&definition.example));
    }
    for flag in &definition.flags {
        command = command.arg(build_flag(flag));
    }
    command.arg(
        Arg::new(POSITIONAL_ID)
            .value_name("ARGS")
            .num_args(0..)
            .action(ArgAction::Append),
    )
}

fn build_flag(flag: &FlagDefinition) -> Arg {
    let help = if flag.required {
        format!("{} [required]", flag.usage).trim_start().to_string()
    } else {
        flag.usage.clone()
    };
    let mut arg = Arg::new(flag.name.clone()).long(flag.name.clone()).help(help);
    if let Some(short) = flag.shorthand_char() {
        arg = arg.short(short);
    }
    match flag.flag_type {
        FlagType::String => arg.action(ArgAction::Set).value_name("VALUE"),
        FlagType::Bool => arg.action(ArgAction::SetTrue),
    }
}

fn examples_block(example: &str) -> String {
    let body = example
        .lines()
        .map(|line| format!("  {}", line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Examples:\n{body}")
}

/// A flag with its resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFlag {
    pub definition: FlagDefinition,
    pub value: FlagValue,
    /// Given on the command line (as opposed to defaulted)
    pub provided: bool,
}

/// A parsed call of one plugin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub plugin: String,
    pub command: CommandDefinition,
    /// Every declared flag, in declaration order
    pub flags: Vec<ResolvedFlag>,
    pub positional: Vec<String>,
}

impl Invocation {
    /// All flags at their defaults, no positionals.
    pub fn new(plugin: impl Into<String>, command: CommandDefinition) -> Self {
        let flags = command
            .flags
            .iter()
            .map(|definition| ResolvedFlag {
                value: FlagValue::default_for(definition.flag_type),
                definition: definition.clone(),
                provided: false,
            })
            .collect();
        Self {
            plugin: plugin.into(),
            command,
            flags,
            positional: Vec::new(),
        }
    }

    pub fn from_matches(plugin: &str, command: &CommandDefinition, matches: &ArgMatches) -> Self {
        let mut invocation = Self::new(plugin, command.clone());
        for flag in &mut invocation.flags {
            let id = flag.definition.name.as_str();
            if !matches!(matches.value_source(id), Some(ValueSource::CommandLine)) {
                continue;
            }
            let value = match flag.definition.flag_type {
                FlagType::String => matches
                    .try_get_one::<String>(id)
                    .ok()
                    .flatten()
                    .cloned()
                    .map(FlagValue::String),
                FlagType::Bool => matches
                    .try_get_one::<bool>(id)
                    .ok()
                    .flatten()
                    .copied()
                    .map(FlagValue::Bool),
            };
            if let Some(value) = value {
                flag.value = value;
                flag.provided = true;
            }
        }
        invocation.positional = matches
            .try_get_many::<String>(POSITIONAL_ID)
            .ok()
            .flatten()
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        invocation
    }

    /// Set a flag as if given on the command line.
    pub fn set_flag(&mut self, name: &str, value: FlagValue) -> Result<()> {
        let flag = self
            .flags
            .iter_mut()
            .find(|f| f.definition.name == name)
            .ok_or_else(|| PluginError::NotFound(format!("flag --{name}")))?;
        flag.value = value;
        flag.provided = true;
        Ok(())
    }

    pub fn with_positional(mut self, positional: Vec<String>) -> Self {
        self.positional = positional;
        self
    }

    pub fn command_name(&self) -> &str {
        self.command.name()
    }

    pub fn value(&self, name: &str) -> Option<&FlagValue> {
        self.flags
            .iter()
            .find(|f| f.definition.name == name)
            .map(|f| &f.value)
    }

    /// Required flags that were not given.
    pub fn missing_required(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|f| f.definition.required && !f.provided)
            .map(|f| f.definition.name.clone())
            .collect()
    }

    /// Fail before any subprocess is involved if a required flag is absent.
    pub fn check_required(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            return Ok(());
        }
        Err(PluginError::MissingRequiredFlag {
            command: format!("{} {}", self.plugin, self.command_name()),
            flags: missing,
        })
    }

    /// Ask for every prompting flag still at its default.
    ///
    /// Select prompts are used when the flag offers options, free text
    /// otherwise. Nothing is asked when no one is there to answer.
    pub fn prompt_unset(&mut self, prompter: &dyn Prompter) -> Result<()> {
        if !prompter.is_interactive() {
            return Ok(());
        }
        for flag in &mut self.flags {
            if !flag.definition.has_prompt() || !flag.value.is_default() {
                continue;
            }
            let definition = &flag.definition;
            let answer = if definition.options.is_empty() {
                prompter.text(&definition.prompt)?
            } else {
                prompter.select(&definition.prompt, &definition.options)?
            };
            let value = FlagValue::parse_as(definition.flag_type, &answer).ok_or_else(|| {
                PluginError::InvalidFlagValue {
                    flag: definition.name.clone(),
                    value: answer.clone(),
                    message: format!("expected a {}", definition.flag_type),
                }
            })?;
            tracing::debug!(flag = %definition.name, "Filled flag from prompt");
            flag.value = value;
        }
        Ok(())
    }

    /// Canonical argument form of the resolved values.
    pub fn canonical_args(&self) -> Vec<String> {
        encode_canonical_args(
            self.flags
                .iter()
                .map(|f| (f.definition.name.as_str(), &f.value)),
            &self.positional,
        )
    }

    pub fn exec_request(&self) -> ExecRequest {
        ExecRequest::new(self.command_name(), self.canonical_args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{PluginManifest, PluginMode};
    use crate::prompt::{Asked, NonInteractive, ScriptedPrompter};
    use crate::registry::SchemaSource;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn greet() -> CommandDefinition {
        CommandDefinition::new("greet [names...]")
            .with_short("Say hello")
            .with_long("Greets everyone named, one line each.")
            .with_example("hello greet --name=bob")
            .with_flag(
                FlagDefinition::string("name")
                    .with_shorthand('n')
                    .with_usage("Who to greet")
                    .required(),
            )
            .with_flag(FlagDefinition::bool("loud").with_shorthand('l'))
            .with_flag(
                FlagDefinition::string("region")
                    .with_prompt("Region?")
                    .with_options(["us", "eu"]),
            )
    }

    fn plugin(commands: Vec<CommandDefinition>) -> LoadedPlugin {
        LoadedPlugin {
            manifest: PluginManifest {
                root_name: "hello".into(),
                short: "Hello plugin".into(),
                long: String::new(),
                launch_command: "hello".into(),
                launch_args: Vec::new(),
                mode: PluginMode::Rpc,
                deadline: None,
                static_commands: None,
                dir: PathBuf::from("/plugins/hello"),
                path: PathBuf::from("/plugins/hello/plugin.toml"),
            },
            commands,
            source: SchemaSource::Discovered,
        }
    }

    fn parse(plugin: &LoadedPlugin, argv: &[&str]) -> Invocation {
        let synth = CommandSynthesizer::default();
        let matches = synth
            .build_root(plugin)
            .try_get_matches_from(argv)
            .unwrap();
        synth.resolve(plugin, &matches).unwrap()
    }

    #[test]
    fn test_flags_mirror_schema() {
        let command = build_command("hello", &greet());
        let mut flags: Vec<_> = command
            .get_arguments()
            .filter(|a| a.get_id() != POSITIONAL_ID)
            .map(|a| {
                (
                    a.get_id().to_string(),
                    a.get_short(),
                    matches!(a.get_action(), ArgAction::SetTrue),
                )
            })
            .collect();
        flags.sort();
        assert_eq!(
            flags,
            vec![
                ("loud".to_string(), Some('l'), true),
                ("name".to_string(), Some('n'), false),
                ("region".to_string(), None, false),
            ]
        );
        assert_eq!(command.get_about().map(|s| s.to_string()), Some("Say hello".into()));
        assert_eq!(
            command.get_long_about().map(|s| s.to_string()),
            Some("Greets everyone named, one line each.".into())
        );
        assert!(
            command
                .get_after_help()
                .map(|s| s.to_string())
                .unwrap_or_default()
                .starts_with("Examples:")
        );
    }

    #[test]
    fn test_usage_line_is_verbatim() {
        let mut command = build_command("hello", &greet());
        let usage = command.render_usage().to_string();
        assert!(usage.contains("hello greet [names...]"), "{usage}");
    }

    #[test]
    fn test_root_copies_descriptions() {
        let mut plugin = plugin(vec![greet()]);
        plugin.manifest.long = "Everything about saying hello.".into();
        let root = CommandSynthesizer::default().build_root(&plugin);
        assert_eq!(root.get_name(), "hello");
        assert_eq!(root.get_about().map(|s| s.to_string()), Some("Hello plugin".into()));
        assert_eq!(
            root.get_long_about().map(|s| s.to_string()),
            Some("Everything about saying hello.".into())
        );
        let greet = root.find_subcommand("greet").unwrap();
        assert_eq!(
            greet.get_long_about().map(|s| s.to_string()),
            Some("Greets everyone named, one line each.".into())
        );
    }

    #[test]
    fn test_resolve_values_and_positionals() {
        let plugin = plugin(vec![greet()]);
        let invocation = parse(
            &plugin,
            &["hello", "greet", "--name", "a b=c", "-l", "x", "y"],
        );
        assert_eq!(invocation.command_name(), "greet");
        assert_eq!(
            invocation.canonical_args(),
            vec!["--name=a b=c", "--loud", "--region=", "--", "x", "y"]
        );
        assert!(invocation.check_required().is_ok());
    }

    #[test]
    fn test_missing_required_flag() {
        let plugin = plugin(vec![greet()]);
        let invocation = parse(&plugin, &["hello", "greet"]);
        let err = invocation.check_required().unwrap_err();
        assert!(matches!(
            &err,
            PluginError::MissingRequiredFlag { flags, .. } if flags == &vec!["name".to_string()]
        ));
    }

    #[test]
    fn test_unknown_flag_rejected_by_parser() {
        let plugin = plugin(vec![greet()]);
        let result = CommandSynthesizer::default()
            .build_root(&plugin)
            .try_get_matches_from(["hello", "greet", "--colour=red"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_fills_defaults_only() {
        let plugin = plugin(vec![greet()]);
        let mut invocation = parse(&plugin, &["hello", "greet", "--name=bob"]);
        let prompter = ScriptedPrompter::new(["eu"]);
        invocation.prompt_unset(&prompter).unwrap();

        assert_eq!(
            invocation.value("region"),
            Some(&FlagValue::String("eu".into()))
        );
        assert_eq!(
            prompter.asked(),
            vec![Asked::Select {
                prompt: "Region?".into(),
                options: vec!["us".into(), "eu".into()],
            }]
        );

        let mut given = parse(&plugin, &["hello", "greet", "--name=bob", "--region=us"]);
        let silent = ScriptedPrompter::new(Vec::<String>::new());
        given.prompt_unset(&silent).unwrap();
        assert!(silent.asked().is_empty());
    }

    #[test]
    fn test_prompt_skipped_without_terminal() {
        let plugin = plugin(vec![greet()]);
        let mut invocation = parse(&plugin, &["hello", "greet", "--name=bob"]);
        invocation.prompt_unset(&NonInteractive).unwrap();
        assert_eq!(
            invocation.value("region"),
            Some(&FlagValue::String(String::new()))
        );
    }

    #[test]
    fn test_bool_prompt_parsing() {
        let command = CommandDefinition::new("deploy")
            .with_flag(FlagDefinition::bool("force").with_prompt("Force?"));
        let mut invocation = Invocation::new("ops", command.clone());
        invocation
            .prompt_unset(&ScriptedPrompter::new(["yes"]))
            .unwrap();
        assert_eq!(invocation.canonical_args(), vec!["--force"]);

        let mut invocation = Invocation::new("ops", command);
        let err = invocation
            .prompt_unset(&ScriptedPrompter::new(["maybe"]))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidFlagValueError");
    }

    #[test]
    fn test_validate_rejects_bad_schemas() {
        let synth = CommandSynthesizer::new(ReservedNames::new(["verbose"], ['v']));
        let cases = vec![
            vec![CommandDefinition::new("")],
            vec![CommandDefinition::new("a"), CommandDefinition::new("a x")],
            vec![CommandDefinition::new("help")],
            vec![CommandDefinition::new("a").with_flag(FlagDefinition::bool("verbose"))],
            vec![
                CommandDefinition::new("a")
                    .with_flag(FlagDefinition::bool("x"))
                    .with_flag(FlagDefinition::string("x")),
            ],
            vec![CommandDefinition::new("a").with_flag(FlagDefinition::bool("x").with_shorthand('v'))],
            vec![CommandDefinition::new("a").with_flag(FlagDefinition::bool("x").with_shorthand('?'))],
            vec![CommandDefinition::new("a").with_flag(FlagDefinition::string("k=v"))],
        ];
        for commands in cases {
            let err = synth.validate("p", &commands).unwrap_err();
            assert_eq!(err.kind(), "InvalidSchemaError", "{commands:?}");
        }
        assert!(synth.validate("p", &[greet()]).is_ok());
    }

    #[test]
    fn test_root_lists_every_command() {
        let plugin = plugin(vec![greet(), CommandDefinition::new("count").with_short("Count")]);
        let root = CommandSynthesizer::default().build_root(&plugin);
        let names: Vec<_> = root.get_subcommands().map(|c| c.get_name().to_string()).collect();
        assert_eq!(names, vec!["greet", "count"]);
        assert_eq!(root.get_about().map(|s| s.to_string()), Some("Hello plugin".into()));
    }
}
