//! The built-in world commands.

use std::str::FromStr;

use multiworld_common::{Environment, WorldType};
use multiworld_kernel::{
    PropertyRegistry, SpawnBehavior, SpawnException, WorldManager, time,
};

use crate::command::{Command, CommandError, Outcome, save_if_configured, world_arg};
use crate::perm::Perm;

pub(crate) fn all() -> Vec<Box<dyn Command>> {
    vec![
        Box::new(Import),
        Box::new(Create),
        Box::new(Load),
        Box::new(Unload),
        Box::new(Remove),
        Box::new(Delete),
        Box::new(List),
        Box::new(Info),
        Box::new(Modify),
        Box::new(Exception),
        Box::new(Blacklist),
    ]
}

fn parse_arg<T>(name: &'static str, text: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.parse().map_err(|e| CommandError::argument(name, e))
}

/// Numeric seeds are used as-is; any other text is hashed the way the
/// classic server does it, so seeds shared as words keep working.
fn seed_from_text(text: &str) -> i64 {
    text.parse().unwrap_or_else(|_| {
        let hash = text
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
        i64::from(hash)
    })
}

pub struct Import;

impl Command for Import {
    fn name(&self) -> &'static str {
        "import"
    }
    fn usage(&self) -> &'static str {
        "import <name> <normal|nether|end> [normal|flat|versioned] [generator]"
    }
    fn help(&self) -> &'static str {
        "Register a world that already exists on disk"
    }
    fn permission(&self) -> Perm {
        Perm::Import
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(4)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        let environment: Environment = parse_arg("environment", &args[1])?;
        let world_type: WorldType = match args.get(2) {
            Some(text) => parse_arg("type", text)?,
            None => WorldType::default(),
        };
        let generator = args.get(3).map(String::as_str);
        let world = manager.import_world(name, environment, world_type, generator)?;
        Ok(save_if_configured(
            manager,
            &world,
            Outcome::new("command.import.success").arg(name),
        ))
    }
}

pub struct Create;

impl Command for Create {
    fn name(&self) -> &'static str {
        "create"
    }
    fn usage(&self) -> &'static str {
        "create <name> <normal|nether|end> [normal|flat|versioned] [seed] [generator]"
    }
    fn help(&self) -> &'static str {
        "Generate a new world"
    }
    fn permission(&self) -> Perm {
        Perm::Create
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(5)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        let environment: Environment = parse_arg("environment", &args[1])?;
        let world_type: WorldType = match args.get(2) {
            Some(text) => parse_arg("type", text)?,
            None => WorldType::default(),
        };
        let seed = args.get(3).map(|s| seed_from_text(s));
        let generator = args.get(4).map(String::as_str);
        let world = manager.create_world(name, environment, world_type, seed, generator)?;
        let outcome = Outcome::new("command.create.success")
            .arg(name)
            .arg(world.seed());
        Ok(save_if_configured(manager, &world, outcome))
    }
}

pub struct Load;

impl Command for Load {
    fn name(&self) -> &'static str {
        "load"
    }
    fn usage(&self) -> &'static str {
        "load <name>"
    }
    fn help(&self) -> &'static str {
        "Load a registered world into memory"
    }
    fn permission(&self) -> Perm {
        Perm::Load
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        manager.load_world(name)?;
        Ok(Outcome::new("command.load.success").arg(name))
    }
}

pub struct Unload;

impl Command for Unload {
    fn name(&self) -> &'static str {
        "unload"
    }
    fn usage(&self) -> &'static str {
        "unload <name>"
    }
    fn help(&self) -> &'static str {
        "Move players out and unload a world"
    }
    fn permission(&self) -> Perm {
        Perm::Unload
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        manager.unload_world(name)?;
        Ok(Outcome::new("command.unload.success").arg(name))
    }
}

pub struct Remove;

impl Command for Remove {
    fn name(&self) -> &'static str {
        "remove"
    }
    fn usage(&self) -> &'static str {
        "remove <name>"
    }
    fn help(&self) -> &'static str {
        "Forget an unloaded world, keeping its files"
    }
    fn permission(&self) -> Perm {
        Perm::Remove
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        manager.remove_world(name)?;
        Ok(Outcome::new("command.remove.success").arg(name))
    }
}

pub struct Delete;

impl Command for Delete {
    fn name(&self) -> &'static str {
        "delete"
    }
    fn usage(&self) -> &'static str {
        "delete <name>"
    }
    fn help(&self) -> &'static str {
        "Forget an unloaded world and delete its files"
    }
    fn permission(&self) -> Perm {
        Perm::Delete
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        if manager.is_registered(name) {
            manager.remove_world(name)?;
        }
        manager.delete_world_files(name)?;
        Ok(Outcome::new("command.delete.success").arg(name))
    }
}

pub struct List;

impl Command for List {
    fn name(&self) -> &'static str {
        "list"
    }
    fn usage(&self) -> &'static str {
        "list"
    }
    fn help(&self) -> &'static str {
        "List worlds that are not hidden"
    }
    fn permission(&self) -> Perm {
        Perm::List
    }
    fn min_args(&self) -> usize {
        0
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn run(&self, manager: &WorldManager, _args: &[String]) -> Result<Outcome, CommandError> {
        let visible: Vec<_> = manager
            .list_worlds()
            .into_iter()
            .filter(|w| !w.is_hidden())
            .collect();
        let mut outcome = Outcome::new("command.list.header").arg(visible.len());
        for world in visible {
            outcome = outcome.line(format!(
                "{} ({}) [{}, {}]",
                world.alias(),
                world.name(),
                world.load_state(),
                world.environment()
            ));
        }
        Ok(outcome)
    }
}

pub struct Info;

impl Command for Info {
    fn name(&self) -> &'static str {
        "info"
    }
    fn usage(&self) -> &'static str {
        "info <name>"
    }
    fn help(&self) -> &'static str {
        "Show every property of a world"
    }
    fn permission(&self) -> Perm {
        Perm::Info
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        let world = manager.get_world(name)?;
        let mut outcome = Outcome::new("command.info.header")
            .arg(world.alias())
            .line(format!("name = {}", world.name()))
            .line(format!("uid = {}", world.uid()))
            .line(format!("type = {}", world.world_type()))
            .line(format!("state = {}", world.load_state()));

        for key in PropertyRegistry::global().property_names() {
            let value = world.property(key)?;
            let shown = match key {
                "time" => time::format_time(value.as_long().unwrap_or_default()),
                _ => value.to_string(),
            };
            outcome = outcome.line(format!("{key} = {shown}"));
        }

        let pending = world.pending_keys();
        if !pending.is_empty() {
            outcome = outcome.line(format!("pending until next load: {}", pending.join(", ")));
        }
        for exception in world.spawn_exceptions() {
            let limit = exception
                .limit
                .map_or_else(|| "unlimited".to_string(), |l| l.to_string());
            outcome = outcome.line(format!(
                "spawn {} = {:?}, limit {limit}",
                exception.creature_type(),
                exception.behavior
            ));
        }
        let blacklist = world.world_blacklist();
        if !blacklist.is_empty() {
            outcome = outcome.line(format!("blacklist = {}", blacklist.join(", ")));
        }
        Ok(outcome)
    }
}

pub struct Modify;

impl Command for Modify {
    fn name(&self) -> &'static str {
        "modify"
    }
    fn usage(&self) -> &'static str {
        "modify <name> <property> <value>"
    }
    fn help(&self) -> &'static str {
        "Set a world property"
    }
    fn permission(&self) -> Perm {
        Perm::Modify
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        let key = args[1].as_str();
        let text = args[2..].join(" ");
        let world = manager.get_world(name)?;
        world.set_property_from_str(key, &text)?;

        let key = PropertyRegistry::global()
            .describe(key)
            .map_or(key, |def| def.key);
        let stored = world.property(key)?;
        let mut outcome = Outcome::new("command.modify.success")
            .arg(key)
            .arg(stored)
            .arg(name);
        if world.pending_keys().iter().any(|k| *k == key) {
            outcome = outcome.line("takes effect the next time the world loads");
        }
        Ok(save_if_configured(manager, &world, outcome))
    }
}

pub struct Exception;

impl Command for Exception {
    fn name(&self) -> &'static str {
        "exception"
    }
    fn usage(&self) -> &'static str {
        "exception <name> <add|remove|list> [creature] [allow|deny] [limit]"
    }
    fn help(&self) -> &'static str {
        "Manage per-creature spawn exceptions"
    }
    fn permission(&self) -> Perm {
        Perm::Modify
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(5)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        let world = manager.get_world(name)?;
        let creature = || {
            args.get(2).map(String::as_str).ok_or(CommandError::Usage {
                usage: self.usage(),
            })
        };

        match args[1].to_ascii_lowercase().as_str() {
            "add" => {
                let creature = creature()?;
                let behavior = match args.get(3).map(|b| b.to_ascii_lowercase()) {
                    None => SpawnBehavior::Deny,
                    Some(b) if b == "deny" => SpawnBehavior::Deny,
                    Some(b) if b == "allow" => SpawnBehavior::Allow,
                    Some(other) => {
                        return Err(CommandError::argument("behavior", format!("'{other}' is not allow or deny")));
                    }
                };
                let mut exception = SpawnException::new(creature, behavior);
                if let Some(limit) = args.get(4) {
                    exception = exception.with_limit(parse_arg("limit", limit)?);
                }
                let canonical = exception.creature_type().to_string();
                world.add_or_update_spawn_exception(exception)?;
                let outcome = Outcome::new("command.exception.added").arg(canonical).arg(name);
                Ok(save_if_configured(manager, &world, outcome))
            }
            "remove" => {
                let removed = world.remove_spawn_exception(creature()?)?;
                let outcome = Outcome::new("command.exception.removed")
                    .arg(removed.creature_type())
                    .arg(name);
                Ok(save_if_configured(manager, &world, outcome))
            }
            "list" => {
                let exceptions = world.spawn_exceptions();
                let mut outcome = Outcome::new("command.exception.list")
                    .arg(exceptions.len())
                    .arg(name);
                for e in exceptions {
                    outcome = outcome.line(format!("{} {:?} {:?}", e.creature_type(), e.behavior, e.limit));
                }
                Ok(outcome)
            }
            _ => Err(CommandError::Usage {
                usage: self.usage(),
            }),
        }
    }
}

pub struct Blacklist;

impl Command for Blacklist {
    fn name(&self) -> &'static str {
        "blacklist"
    }
    fn usage(&self) -> &'static str {
        "blacklist <name> <add|remove|list> [world]"
    }
    fn help(&self) -> &'static str {
        "Manage worlds that cannot be reached from a world"
    }
    fn permission(&self) -> Perm {
        Perm::Modify
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn run(&self, manager: &WorldManager, args: &[String]) -> Result<Outcome, CommandError> {
        let name = world_arg(args)?;
        let world = manager.get_world(name)?;
        let target = || {
            args.get(2).map(String::as_str).ok_or(CommandError::Usage {
                usage: self.usage(),
            })
        };

        match args[1].to_ascii_lowercase().as_str() {
            "add" => {
                let target = target()?;
                manager.get_world(target)?;
                if !world.blacklist_world(target) {
                    return Ok(Outcome::new("command.blacklist.unchanged").arg(target).arg(name));
                }
                let outcome = Outcome::new("command.blacklist.added").arg(target).arg(name);
                Ok(save_if_configured(manager, &world, outcome))
            }
            "remove" => {
                let target = target()?;
                if !world.unblacklist_world(target) {
                    return Ok(Outcome::new("command.blacklist.unchanged").arg(target).arg(name));
                }
                let outcome = Outcome::new("command.blacklist.removed").arg(target).arg(name);
                Ok(save_if_configured(manager, &world, outcome))
            }
            "list" => {
                let listed = world.world_blacklist();
                Ok(Outcome::new("command.blacklist.list")
                    .arg(listed.len())
                    .arg(name)
                    .line(listed.join(", ")))
            }
            _ => Err(CommandError::Usage {
                usage: self.usage(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSet;
    use crate::perm::{AllowAll, GrantList};
    use multiworld_kernel::testing::Harness;
    use multiworld_kernel::{ErrorKind, ManagerConfig};

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn run(h: &Harness, line: &str) -> Result<Outcome, CommandError> {
        CommandSet::standard().dispatch(&h.manager, &AllowAll, &words(line))
    }

    fn world_kind(err: CommandError) -> ErrorKind {
        match err {
            CommandError::World(e) => e.kind(),
            other => panic!("expected a world error, got {other}"),
        }
    }

    #[test]
    fn import_saves_and_confirms() {
        let h = Harness::new();
        h.engine.add_world_on_disk("skyworld");
        let out = run(&h, "import skyworld normal").unwrap();
        assert_eq!(out.key, "command.import.success");
        assert_eq!(out.args, vec!["skyworld"]);
        assert!(h.store.get("skyworld").is_some());
    }

    #[test]
    fn import_without_save_on_change_leaves_store_alone() {
        let mut config = ManagerConfig::default();
        config.save_on_change = false;
        let h = Harness::with_config(config);
        h.engine.add_world_on_disk("w");
        run(&h, "import w nether flat").unwrap();
        assert!(h.store.is_empty());
        let w = h.manager.get_world("w").unwrap();
        assert_eq!(w.environment(), Environment::Nether);
        assert_eq!(w.world_type(), WorldType::Flat);
    }

    #[test]
    fn bad_environment_is_an_argument_error() {
        let h = Harness::new();
        let err = run(&h, "import w aether").unwrap_err();
        assert!(matches!(err, CommandError::Argument { name: "environment", .. }));
        assert_eq!(err.message_key(), "command.invalid_argument");
    }

    #[test]
    fn create_accepts_word_seeds() {
        let h = Harness::new();
        let out = run(&h, "create fresh normal normal 42").unwrap();
        assert_eq!(out.args, vec!["fresh", "42"]);
        run(&h, "create other normal normal glacier").unwrap();
        assert_eq!(
            h.manager.get_world("other").unwrap().seed(),
            seed_from_text("glacier")
        );
        assert_ne!(seed_from_text("glacier"), seed_from_text("Glacier"));
    }

    #[test]
    fn lifecycle_through_commands() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        run(&h, "import w normal").unwrap();
        assert_eq!(world_kind(run(&h, "remove w").unwrap_err()), ErrorKind::WorldStillLoaded);
        assert_eq!(run(&h, "unload w").unwrap().key, "command.unload.success");
        assert_eq!(run(&h, "load w").unwrap().key, "command.load.success");
        run(&h, "unload w").unwrap();
        run(&h, "remove w").unwrap();
        assert_eq!(world_kind(run(&h, "load w").unwrap_err()), ErrorKind::UnknownWorld);
        assert!(h.engine.has_files("w"));
    }

    #[test]
    fn delete_forgets_and_deletes() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        run(&h, "import w normal").unwrap();
        assert_eq!(world_kind(run(&h, "delete w").unwrap_err()), ErrorKind::WorldStillLoaded);
        run(&h, "unload w").unwrap();
        run(&h, "delete w").unwrap();
        assert!(!h.manager.is_registered("w"));
        assert!(!h.engine.has_files("w"));
    }

    #[test]
    fn modify_parses_and_reports_stored_value() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        run(&h, "import w normal").unwrap();
        let out = run(&h, "modify w difficulty 3").unwrap();
        assert_eq!(out.args, vec!["difficulty", "hard", "w"]);
        let out = run(&h, "modify w alias Floating Isles").unwrap();
        assert_eq!(out.args[1], "Floating Isles");
        let out = run(&h, "modify w seed 7").unwrap();
        assert_eq!(out.lines.len(), 1);
        assert_eq!(world_kind(run(&h, "modify w scale -5").unwrap_err()), ErrorKind::Validation);
        assert_eq!(world_kind(run(&h, "modify w flying yes").unwrap_err()), ErrorKind::NotFound);
        assert_eq!(h.store.get("w").unwrap().properties["alias"], "Floating Isles");
    }

    #[test]
    fn modify_accepts_keys_in_any_case() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        run(&h, "import w normal").unwrap();
        let out = run(&h, "modify w gamemode creative").unwrap();
        assert_eq!(out.args, vec!["gameMode", "creative", "w"]);
        let out = run(&h, "modify w SEED 7").unwrap();
        assert_eq!(out.args[0], "seed");
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn failed_save_still_reports_the_change() {
        let h = Harness::with_failing_store();
        h.engine.add_world_on_disk("w");
        let out = run(&h, "import w normal").unwrap();
        assert_eq!(out.key, "command.import.success");
        assert!(out.lines[0].starts_with("not saved yet"));
        let world = h.manager.get_world("w").unwrap();
        assert!(world.is_dirty());

        let out = run(&h, "modify w pvp off").unwrap();
        assert_eq!(out.key, "command.modify.success");
        assert_eq!(out.lines.len(), 1);
        assert!(!world.is_pvp_enabled());
    }

    #[test]
    fn list_skips_hidden_worlds() {
        let h = Harness::new();
        for name in ["a", "b"] {
            h.engine.add_world_on_disk(name);
            run(&h, &format!("import {name} normal")).unwrap();
        }
        run(&h, "modify b hidden true").unwrap();
        let out = run(&h, "list").unwrap();
        assert_eq!(out.args, vec!["1"]);
        assert_eq!(out.lines, vec!["a (a) [loaded, normal]"]);
    }

    #[test]
    fn info_lists_every_property() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        run(&h, "import w normal").unwrap();
        run(&h, "exception w add zombie allow 4").unwrap();
        let out = run(&h, "info w").unwrap();
        let count = PropertyRegistry::global().property_names().len();
        assert!(out.lines.len() >= count + 4);
        assert!(out.lines.contains(&"time = 6:00am".to_string()));
        assert!(out.lines.iter().any(|l| l.starts_with("spawn zombie")));
    }

    #[test]
    fn exceptions_round_trip_through_commands() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        run(&h, "import w normal").unwrap();
        let out = run(&h, "exception w add Cave-Spider").unwrap();
        assert_eq!(out.args, vec!["cave_spider", "w"]);
        assert_eq!(run(&h, "exception w list").unwrap().args[0], "1");
        assert_eq!(world_kind(run(&h, "exception w remove ghast").unwrap_err()), ErrorKind::NotFound);
        run(&h, "exception w remove cave_spider").unwrap();
        assert!(matches!(
            run(&h, "exception w add zombie sometimes").unwrap_err(),
            CommandError::Argument { name: "behavior", .. }
        ));
        assert!(matches!(run(&h, "exception w add").unwrap_err(), CommandError::Usage { .. }));
    }

    #[test]
    fn blacklist_requires_known_target() {
        let h = Harness::new();
        for name in ["w", "arena"] {
            h.engine.add_world_on_disk(name);
            run(&h, &format!("import {name} normal")).unwrap();
        }
        assert_eq!(world_kind(run(&h, "blacklist w add nowhere").unwrap_err()), ErrorKind::UnknownWorld);
        assert_eq!(run(&h, "blacklist w add arena").unwrap().key, "command.blacklist.added");
        assert_eq!(run(&h, "blacklist w add arena").unwrap().key, "command.blacklist.unchanged");
        assert!(!h.manager.can_travel("w", "arena").unwrap());
        assert_eq!(run(&h, "blacklist w remove arena").unwrap().key, "command.blacklist.removed");
    }

    #[test]
    fn permissions_and_arity_are_checked_first() {
        let h = Harness::new();
        let set = CommandSet::standard();
        let viewer = GrantList::new(["multiverse.core.list"]);
        assert!(set.dispatch(&h.manager, &viewer, &words("list")).is_ok());
        match set.dispatch(&h.manager, &viewer, &words("import w normal")) {
            Err(CommandError::PermissionDenied { node }) => assert_eq!(node, "multiverse.core.import"),
            other => panic!("expected permission denied, got {other:?}"),
        }
        assert_eq!(h.engine.import_count(), 0);

        let admin = GrantList::new(["multiverse.*"]);
        assert!(matches!(
            set.dispatch(&h.manager, &admin, &words("load")),
            Err(CommandError::Usage { usage: "load <name>" })
        ));
        assert!(matches!(
            set.dispatch(&h.manager, &admin, &words("teleport w")),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(set.get("LOAD").is_some());
    }

    #[test]
    fn invalid_world_names_never_reach_the_engine() {
        let h = Harness::new();
        let err = run(&h, "load ../etc").unwrap_err();
        assert_eq!(world_kind(err), ErrorKind::Validation);
    }

    #[test]
    fn every_command_declares_a_core_node() {
        for command in CommandSet::standard().iter() {
            assert!(Perm::COMMANDS.contains(&command.permission()), "{}", command.name());
            assert!(command.usage().starts_with(command.name()));
        }
    }
}
