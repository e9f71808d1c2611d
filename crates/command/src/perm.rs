use std::collections::BTreeSet;

/// Permission nodes declared by the world commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Perm {
    All,
    Import,
    Create,
    Load,
    Unload,
    Remove,
    Delete,
    List,
    Info,
    Modify,
}

impl Perm {
    pub const COMMANDS: [Perm; 9] = [
        Perm::Import,
        Perm::Create,
        Perm::Load,
        Perm::Unload,
        Perm::Remove,
        Perm::Delete,
        Perm::List,
        Perm::Info,
        Perm::Modify,
    ];

    pub fn node(self) -> &'static str {
        match self {
            Perm::All => "multiverse.*",
            Perm::Import => "multiverse.core.import",
            Perm::Create => "multiverse.core.create",
            Perm::Load => "multiverse.core.load",
            Perm::Unload => "multiverse.core.unload",
            Perm::Remove => "multiverse.core.remove",
            Perm::Delete => "multiverse.core.delete",
            Perm::List => "multiverse.core.list",
            Perm::Info => "multiverse.core.info",
            Perm::Modify => "multiverse.core.modify",
        }
    }
}

impl std::fmt::Display for Perm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.node())
    }
}

/// Answers whether the caller holds a permission node. Supplied by the host.
pub trait PermissionChecker {
    fn has(&self, node: &str) -> bool;
}

/// Grants everything. For trusted consoles.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has(&self, _node: &str) -> bool {
        true
    }
}

/// Explicit set of granted nodes. A granted `prefix.*` covers every node
/// below `prefix`.
#[derive(Debug, Clone, Default)]
pub struct GrantList {
    granted: BTreeSet<String>,
}

impl GrantList {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: nodes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn grant(&mut self, node: impl Into<String>) {
        self.granted.insert(node.into());
    }
}

impl PermissionChecker for GrantList {
    fn has(&self, node: &str) -> bool {
        if self.granted.contains(node) {
            return true;
        }
        self.granted.iter().any(|granted| {
            granted
                .strip_suffix('*')
                .is_some_and(|prefix| prefix.ends_with('.') && node.starts_with(prefix))
        })
    }
}
