use std::collections::BTreeMap;

use multiworld_kernel::{WorldError, WorldManager, validate_world_name};

use crate::perm::{Perm, PermissionChecker};

/// Errors from running a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("missing permission {node}")]
    PermissionDenied { node: &'static str },
    #[error("usage: {usage}")]
    Usage { usage: &'static str },
    #[error("invalid {name}: {reason}")]
    Argument { name: &'static str, reason: String },
    #[error(transparent)]
    World(#[from] WorldError),
}

impl CommandError {
    /// Localization key for the player-facing message.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "command.unknown",
            Self::PermissionDenied { .. } => "command.no_permission",
            Self::Usage { .. } => "command.usage",
            Self::Argument { .. } => "command.invalid_argument",
            Self::World(e) => e.message_key(),
        }
    }

    pub(crate) fn argument(name: &'static str, reason: impl ToString) -> Self {
        Self::Argument {
            name,
            reason: reason.to_string(),
        }
    }
}

/// Successful command result: a message key with its arguments, plus any
/// detail lines (listings, property dumps).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub key: &'static str,
    pub args: Vec<String>,
    pub lines: Vec<String>,
}

impl Outcome {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            args: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }
}

/// One world-management command.
///
/// Argument counts are checked before `run` is called, so `args` always has
/// between `min_args` and `max_args` entries.
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn usage(&self) -> &'static str;
    fn help(&self) -> &'static str;
    fn permission(&self) -> Perm;
    fn min_args(&self) -> usize;
    /// `None` takes any number of trailing arguments.
    fn max_args(&self) -> Option<usize>;
    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError>;
}

/// First argument as a world name, rejected before it reaches the manager
/// when it could never be valid.
pub(crate) fn world_arg(args: &[String]) -> Result<&str, CommandError> {
    let name = args.first().map(String::as_str).unwrap_or_default();
    validate_world_name(name)?;
    Ok(name)
}

/// Save after a change when the manager is configured to.
///
/// The change has already been applied, so a failed save does not fail the
/// command: the world stays dirty and the outcome gains a line saying so.
pub(crate) fn save_if_configured(
    manager: &WorldManager,
    world: &multiworld_kernel::WorldRecord,
    outcome: Outcome,
) -> Outcome {
    if !manager.config().save_on_change {
        return outcome;
    }
    match world.save() {
        Ok(()) => outcome,
        Err(e) => {
            tracing::warn!(world = world.name(), "change applied but not saved: {e}");
            outcome.line(format!("not saved yet: {e}"))
        }
    }
}

/// Named commands plus permission and arity checks.
pub struct CommandSet {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// Every built-in world command.
    pub fn standard() -> Self {
        let mut set = Self::new();
        for command in crate::commands::all() {
            set.register(command);
        }
        set
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .get(name.to_ascii_lowercase().as_str())
            .map(|c| c.as_ref())
    }

    /// Commands in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|c| c.as_ref())
    }

    /// Run `line[0]` with the remaining words as arguments.
    pub fn dispatch(
        &self,
        manager: &WorldManager,
        perms: &dyn PermissionChecker,
        line: &[String],
    ) -> Result<Outcome, CommandError> {
        let Some((name, args)) = line.split_first() else {
            return Err(CommandError::UnknownCommand(String::new()));
        };
        let command = self
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.clone()))?;

        let node = command.permission().node();
        if !perms.has(node) && !perms.has(Perm::All.node()) {
            tracing::debug!(command = command.name(), node, "permission denied");
            return Err(CommandError::PermissionDenied { node });
        }
        let too_many = command.max_args().is_some_and(|max| args.len() > max);
        if args.len() < command.min_args() || too_many {
            return Err(CommandError::Usage {
                usage: command.usage(),
            });
        }

        let _span = tracing::info_span!("command", name = command.name()).entered();
        command.run(manager, args)
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::standard()
    }
}
