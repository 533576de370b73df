//! Plugin commands grafted onto the built-in clap tree.

use clap::{ArgMatches, Command, CommandFactory};
use tether_plugins::{CommandSynthesizer, ConfigStore, PluginError, PluginRegistry, ReservedNames};
use tokio_util::sync::CancellationToken;

use crate::cli::{BUILTIN_COMMANDS, Cli, GLOBAL_FLAGS, GLOBAL_SHORTHANDS};

/// Synthesizer that keeps plugins off the host's global flags.
pub fn synthesizer() -> CommandSynthesizer {
    CommandSynthesizer::new(ReservedNames::new(
        GLOBAL_FLAGS.iter().copied(),
        GLOBAL_SHORTHANDS.iter().copied(),
    ))
}

/// Load every plugin, then unregister those shadowing a built-in command.
///
/// `cancel` aborts the load and kills plugins still answering Discover.
pub async fn load_registry(
    store: &dyn ConfigStore,
    synthesizer: &CommandSynthesizer,
    cancel: &CancellationToken,
) -> tether_plugins::Result<PluginRegistry> {
    let mut registry = PluginRegistry::load_with_cancel(store, synthesizer, cancel).await?;

    let collisions: Vec<String> = registry
        .names()
        .into_iter()
        .filter(|name| BUILTIN_COMMANDS.contains(&name.as_str()))
        .collect();
    for name in collisions {
        let error = PluginError::invalid_schema(
            &name,
            format!("root command '{name}' collides with a built-in command"),
        );
        registry.record_failure(name, error);
    }
    Ok(registry)
}

/// The full command tree: built-ins plus one root per loaded plugin.
pub fn build_cli(registry: &PluginRegistry, synthesizer: &CommandSynthesizer) -> Command {
    let mut command = Cli::command();
    for plugin in registry.plugins() {
        command = command.subcommand(synthesizer.build_root(plugin));
    }
    command
}

/// The plugin a parse selected, with its matches.
pub fn selected_plugin<'a>(
    registry: &PluginRegistry,
    matches: &'a ArgMatches,
) -> Option<(String, &'a ArgMatches)> {
    let (name, sub_matches) = matches.subcommand()?;
    registry.get(name).map(|_| (name.to_string(), sub_matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tether_plugins::StaticConfigStore;

    fn static_plugin(root: &Path, name: &str, flags: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("plugin.toml"),
            format!(
                "[plugin]\nname = \"{name}\"\nshort = \"{name} tools\"\ncommand = \"/nonexistent/{name}\"\n\n\
                 [[commands]]\nuse = \"run [target]\"\nshort = \"Run it\"\n{flags}"
            ),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_builtin_collision_is_failure() {
        let temp = TempDir::new().unwrap();
        static_plugin(temp.path(), "plugins", "");
        static_plugin(temp.path(), "deploy", "");

        let store = StaticConfigStore::new(temp.path());
        let registry = load_registry(&store, &synthesizer(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(registry.names(), vec!["deploy".to_string()]);
        assert_eq!(
            registry.failure("plugins").unwrap().error.kind(),
            "InvalidSchemaError"
        );
    }

    #[tokio::test]
    async fn test_global_flag_reuse_is_rejected() {
        let temp = TempDir::new().unwrap();
        static_plugin(
            temp.path(),
            "noisy",
            "\n[[commands.flags]]\nname = \"verbose\"\ntype = \"bool\"\n",
        );

        let store = StaticConfigStore::new(temp.path());
        let registry = load_registry(&store, &synthesizer(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(registry.is_empty());
        assert!(registry.failure("noisy").is_some());
    }

    #[tokio::test]
    async fn test_tree_routes_to_plugin() {
        let temp = TempDir::new().unwrap();
        static_plugin(
            temp.path(),
            "deploy",
            "\n[[commands.flags]]\nname = \"env\"\ntype = \"string\"\nshorthand = \"e\"\n",
        );
        let store = StaticConfigStore::new(temp.path());
        let synthesizer = synthesizer();
        let registry = load_registry(&store, &synthesizer, &CancellationToken::new())
            .await
            .unwrap();

        let matches = build_cli(&registry, &synthesizer)
            .try_get_matches_from(["tether", "deploy", "run", "-e", "prod", "api"])
            .unwrap();
        let (name, plugin_matches) = selected_plugin(&registry, &matches).unwrap();
        assert_eq!(name, "deploy");

        let plugin = registry.get("deploy").unwrap();
        let invocation = synthesizer.resolve(plugin, plugin_matches).unwrap();
        assert_eq!(
            invocation.canonical_args(),
            vec!["--env=prod".to_string(), "--".to_string(), "api".to_string()]
        );
    }

    #[tokio::test]
    async fn test_builtin_not_treated_as_plugin() {
        let temp = TempDir::new().unwrap();
        let store = StaticConfigStore::new(temp.path());
        let synthesizer = synthesizer();
        let registry = load_registry(&store, &synthesizer, &CancellationToken::new())
            .await
            .unwrap();

        let matches = build_cli(&registry, &synthesizer)
            .try_get_matches_from(["tether", "plugins", "list"])
            .unwrap();
        assert!(selected_plugin(&registry, &matches).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_aborts_discover() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("silent");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("plugin.toml"),
            "[plugin]\nname = \"silent\"\ncommand = \"/bin/sh\"\nargs = [\"-c\", \"exec sleep 30\"]\n",
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let store = StaticConfigStore::new(temp.path());
        let err = load_registry(&store, &synthesizer(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Interrupted");
        assert_eq!(err.exit_code(), 130);
    }
}
