//! Terminal prompts for flags that declare a `prompt`.

use std::io::IsTerminal;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use tether_plugins::{PluginError, Prompter};

/// Prompts on the controlling terminal with dialoguer.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn select(&self, prompt: &str, options: &[String]) -> tether_plugins::Result<String> {
        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact()
            .map_err(|e| PluginError::Prompt(e.to_string()))?;
        options
            .get(index)
            .cloned()
            .ok_or_else(|| PluginError::Prompt(format!("no option at index {index}")))
    }

    fn text(&self, prompt: &str) -> tether_plugins::Result<String> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| PluginError::Prompt(e.to_string()))
    }
}
