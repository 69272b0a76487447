//! Authorization predicates.

use crate::types::Caller;
use chat_client::Snowflake;
use std::collections::HashSet;

/// User lists the predicates are evaluated against.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Bot owners pass every check.
    pub owners: HashSet<Snowflake>,
    pub blocked: HashSet<Snowflake>,
    pub permitted: HashSet<Snowflake>,
}

impl AccessPolicy {
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owners.contains(&user_id)
    }
}

/// A permission predicate attached to a command node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Caller is not on the blocked list.
    NotForbidden,
    /// Caller is on the permitted list.
    Permitted,
    /// Caller owns the guild the command was sent in.
    GuildOwner,
    BotOwner,
    Any(Vec<Check>),
    All(Vec<Check>),
}

impl Check {
    pub fn evaluate(&self, caller: &Caller, policy: &AccessPolicy) -> bool {
        if policy.is_owner(caller.user_id) {
            return true;
        }

        match self {
            Check::NotForbidden => !policy.blocked.contains(&caller.user_id),
            Check::Permitted => policy.permitted.contains(&caller.user_id),
            Check::GuildOwner => caller.guild_id.is_some() && caller.is_guild_owner,
            Check::BotOwner => false,
            Check::Any(checks) => checks.iter().any(|c| c.evaluate(caller, policy)),
            Check::All(checks) => checks.iter().all(|c| c.evaluate(caller, policy)),
        }
    }
}
