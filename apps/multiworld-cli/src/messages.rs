//! English text for command message keys.

use multiworld_command::{CommandError, Outcome};

fn template(key: &str) -> Option<&'static str> {
    Some(match key {
        "command.import.success" => "Imported world '{0}'.",
        "command.create.success" => "Created world '{0}' with seed {1}.",
        "command.load.success" => "Loaded world '{0}'.",
        "command.unload.success" => "Unloaded world '{0}'.",
        "command.remove.success" => "Removed world '{0}'. Its files were kept.",
        "command.delete.success" => "Deleted world '{0}' and its files.",
        "command.list.header" => "Worlds ({0}):",
        "command.info.header" => "World info for {0}:",
        "command.modify.success" => "Set {0} to {1} on '{2}'.",
        "command.exception.added" => "Spawn exception for {0} saved on '{1}'.",
        "command.exception.removed" => "Spawn exception for {0} removed from '{1}'.",
        "command.exception.list" => "{0} spawn exception(s) on '{1}':",
        "command.blacklist.added" => "'{0}' can no longer be reached from '{1}'.",
        "command.blacklist.removed" => "'{0}' can be reached from '{1}' again.",
        "command.blacklist.unchanged" => "Blacklist of '{1}' already says that about '{0}'.",
        "command.blacklist.list" => "{0} blacklisted world(s) for '{1}':",
        _ => return None,
    })
}

fn fill(template: &str, args: &[String]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (i, arg)| text.replace(&format!("{{{i}}}"), arg))
}

/// Headline plus indented detail lines.
pub fn render(outcome: &Outcome) -> String {
    let mut text = match template(outcome.key) {
        Some(t) => fill(t, &outcome.args),
        None => format!("{} {}", outcome.key, outcome.args.join(" ")),
    };
    for line in &outcome.lines {
        text.push_str("\n  ");
        text.push_str(line);
    }
    text
}

pub fn render_error(error: &CommandError) -> String {
    match error {
        CommandError::UnknownCommand(name) if name.is_empty() => "Type 'help' for commands.".into(),
        CommandError::UnknownCommand(name) => format!("Unknown command '{name}'. Type 'help' for commands."),
        CommandError::PermissionDenied { node } => format!("You need {node} to do that."),
        CommandError::Usage { usage } => format!("Usage: {usage}"),
        other => format!("Error: {other}"),
    }
}
