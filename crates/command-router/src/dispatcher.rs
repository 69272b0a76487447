//! Command dispatch: resolve, parse, authorize, invoke.

use crate::checks::{AccessPolicy, Check};
use crate::error::{CommandError, HandlerError, ResolveError};
use crate::executor::ComputePool;
use crate::params::{parse_args, Param};
use crate::registry::{CommandKind, CommandRegistry, CommandTree, Resolution};
use crate::tokenizer::{strip_prefix, Prefixes, StringView};
use crate::types::{Caller, CommandContext, CommandHandler, Reply};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Observer for dispatch results.
pub trait DispatchHook: Send + Sync {
    fn on_completion(&self, _command: &str, _caller: &Caller) {}

    /// `command` is `None` when resolution itself failed.
    fn on_error(&self, _command: Option<&str>, _caller: &Caller, _error: &CommandError) {}
}

/// Logs completions and errors through `tracing`.
pub struct LoggingHook;

impl DispatchHook for LoggingHook {
    fn on_completion(&self, command: &str, caller: &Caller) {
        info!(command = %command, user = caller.user_id, channel = caller.channel_id, "Command completed");
    }

    fn on_error(&self, command: Option<&str>, caller: &Caller, error: &CommandError) {
        let command = command.unwrap_or("-");
        match error {
            CommandError::Resolution(_) | CommandError::Argument(_) => {
                debug!(command = %command, user = caller.user_id, error = %error, "Command rejected")
            }
            CommandError::Forbidden(_) | CommandError::Timeout(_) => {
                warn!(command = %command, user = caller.user_id, error = %error, "Command failed")
            }
            CommandError::Handler(HandlerError::User(_)) => {
                debug!(command = %command, user = caller.user_id, error = %error, "Command refused input")
            }
            CommandError::Handler(_) => {
                error!(command = %command, user = caller.user_id, error = %error, "Command raised an error")
            }
        }
    }
}

#[derive(Clone)]
enum Action {
    Invoke(Arc<dyn CommandHandler>),
    /// A group without a default behavior; carries its help text.
    Help(String),
}

/// A resolved command detached from the tree, so the tree lock is not held
/// while the handler runs.
#[derive(Clone)]
pub struct ResolvedCommand {
    pub qualified_name: String,
    pub invoked_path: Vec<String>,
    /// Checks of every node along the path, root first.
    pub checks: Vec<Check>,
    pub params: Vec<Param>,
    action: Action,
}

impl ResolvedCommand {
    pub fn from_tree(tree: &CommandTree, resolution: &Resolution<'_>, prefix: &str) -> Self {
        let invoked_path: Vec<String> = resolution
            .labels
            .iter()
            .map(|l| l.to_lowercase())
            .collect();

        let checks = resolution
            .path
            .iter()
            .filter_map(|id| tree.node(*id))
            .flat_map(|node| node.checks.iter().cloned())
            .collect();

        let node = tree.node(resolution.node);
        let action = match node.map(|n| &n.kind) {
            Some(CommandKind::Leaf(handler)) => Action::Invoke(handler.clone()),
            Some(CommandKind::Group {
                default: Some(handler),
            }) => Action::Invoke(handler.clone()),
            _ => Action::Help(tree.help(resolution.node, &invoked_path.join(" "), prefix)),
        };

        Self {
            qualified_name: tree.qualified_name(resolution.node),
            invoked_path,
            checks,
            params: node.map(|n| n.params.clone()).unwrap_or_default(),
            action,
        }
    }
}

/// The result of handling one message.
#[derive(Debug)]
pub struct Outcome {
    /// Qualified command name, when resolution succeeded.
    pub command: Option<String>,
    pub reply: Option<Reply>,
    pub error: Option<CommandError>,
}

impl Outcome {
    fn success(command: String, reply: Reply) -> Self {
        Self {
            command: Some(command),
            reply: Some(reply),
            error: None,
        }
    }

    fn failure(command: Option<String>, error: CommandError) -> Self {
        Self {
            command,
            reply: error.user_message().map(Reply::Text),
            error: Some(error),
        }
    }
}

/// Turns message text into handler invocations.
pub struct Dispatcher {
    registry: CommandRegistry,
    prefixes: Prefixes,
    policy: AccessPolicy,
    compute: ComputePool,
    handler_timeout: Duration,
    hooks: Vec<Arc<dyn DispatchHook>>,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry,
            prefixes: Prefixes::default(),
            policy: AccessPolicy::default(),
            compute: ComputePool::default(),
            handler_timeout: Duration::from_secs(30),
            hooks: Vec::new(),
        }
    }

    pub fn with_prefixes(mut self, prefixes: Prefixes) -> Self {
        self.prefixes = prefixes;
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_compute(mut self, compute: ComputePool) -> Self {
        self.compute = compute;
        self
    }

    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn DispatchHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Handle one message. `None` means the text was not addressed to the
    /// bot at all.
    pub async fn process(&self, text: &str, caller: Caller) -> Option<Outcome> {
        let prefixes = self.prefixes.for_scope(caller.scope());
        let (prefix, body) = strip_prefix(text, prefixes).ok()?;

        let resolved = {
            let tree = self.registry.read().await;
            tree.resolve(body)
                .map(|r| (ResolvedCommand::from_tree(&tree, &r, prefix), r.rest))
        };

        match resolved {
            Ok((command, rest)) => Some(self.dispatch(command, rest, caller, prefix).await),
            Err(ResolveError::Empty) => None,
            Err(e) => {
                let error = CommandError::from(e);
                self.notify_error(None, &caller, &error);
                Some(Outcome {
                    command: None,
                    reply: None,
                    error: Some(error),
                })
            }
        }
    }

    /// Parse, authorize and invoke an already resolved command.
    pub async fn dispatch(
        &self,
        command: ResolvedCommand,
        args_text: &str,
        caller: Caller,
        prefix: &str,
    ) -> Outcome {
        let name = command.qualified_name.clone();
        let result = self.run(command, args_text, caller.clone(), prefix).await;

        match result {
            Ok(reply) => {
                for hook in &self.hooks {
                    hook.on_completion(&name, &caller);
                }
                Outcome::success(name, reply)
            }
            Err((error, help)) => {
                self.notify_error(Some(&name), &caller, &error);
                let mut outcome = Outcome::failure(Some(name), error);
                if let Some(help) = help {
                    let text = match outcome.reply {
                        Some(Reply::Text(message)) => format!("{}\n{}", message, help),
                        _ => help,
                    };
                    outcome.reply = Some(Reply::Text(text));
                }
                outcome
            }
        }
    }

    async fn run(
        &self,
        command: ResolvedCommand,
        args_text: &str,
        caller: Caller,
        prefix: &str,
    ) -> Result<Reply, (CommandError, Option<String>)> {
        let args = parse_args(&command.params, args_text).map_err(|e| (e.into(), None))?;

        if !command
            .checks
            .iter()
            .all(|check| check.evaluate(&caller, &self.policy))
        {
            return Err((CommandError::Forbidden(command.qualified_name), None));
        }

        let handler = match command.action {
            Action::Invoke(handler) => handler,
            Action::Help(help) => {
                let mut view = StringView::new(args_text);
                return match view.next_word().ok().flatten() {
                    None => Ok(Reply::Text(help)),
                    Some(word) => Err((
                        ResolveError::NoSuchSubcommand {
                            group: command.qualified_name,
                            name: word,
                        }
                        .into(),
                        Some(help),
                    )),
                };
            }
        };

        let ctx = CommandContext {
            caller,
            prefix: prefix.to_string(),
            invoked_path: command.invoked_path,
            registry: self.registry.clone(),
            compute: self.compute.clone(),
        };

        let mut task = tokio::spawn(async move { handler.invoke(&ctx, args).await });

        match timeout(self.handler_timeout, &mut task).await {
            Ok(Ok(result)) => result.map_err(|e| (e.into(), None)),
            Ok(Err(join_error)) => Err((
                CommandError::Handler(HandlerError::Internal(join_error.into())),
                None,
            )),
            Err(_) => {
                task.abort();
                Err((CommandError::Timeout(self.handler_timeout), None))
            }
        }
    }

    fn notify_error(&self, command: Option<&str>, caller: &Caller, error: &CommandError) {
        for hook in &self.hooks {
            hook.on_error(command, caller, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArgumentError;
    use crate::params::Args;
    use crate::registry::CommandSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn caller(user_id: u64) -> Caller {
        Caller {
            user_id,
            display_name: "tester".into(),
            channel_id: 10,
            message_id: 20,
            guild_id: Some(30),
            is_guild_owner: false,
        }
    }

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
            let text = args.get_str("text").unwrap_or_default();
            Ok(Reply::text(format!("{}:{}", ctx.invoked_with(), text)))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl CommandHandler for Counting {
        async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::text("counted"))
        }
    }

    struct Failing;

    #[async_trait]
    impl CommandHandler for Failing {
        async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
            Err(HandlerError::upstream("503 from upstream"))
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        completions: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl DispatchHook for RecordingHook {
        fn on_completion(&self, command: &str, _caller: &Caller) {
            self.completions.lock().unwrap().push(command.to_string());
        }

        fn on_error(&self, _command: Option<&str>, _caller: &Caller, error: &CommandError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    async fn dispatcher(hook: Arc<RecordingHook>, counter: Arc<AtomicUsize>) -> Dispatcher {
        let registry = CommandRegistry::new();
        registry
            .register(
                CommandSpec::leaf("echo", Echo).param(Param::rest("text").optional()),
                &[],
            )
            .await
            .unwrap();
        registry
            .register(
                CommandSpec::group("admin")
                    .check(Check::NotForbidden)
                    .child(
                        CommandSpec::leaf("count", Counting(counter))
                            .check(Check::Permitted)
                            .param(Param::integer("times")),
                    ),
                &[],
            )
            .await
            .unwrap();
        registry
            .register(CommandSpec::leaf("broken", Failing), &[])
            .await
            .unwrap();

        let policy = AccessPolicy {
            permitted: [7].into(),
            blocked: [8].into(),
            ..Default::default()
        };
        Dispatcher::new(registry)
            .with_policy(policy)
            .with_prefixes(Prefixes::new(vec!["!".into(), "?".into()]))
            .with_hook(hook)
    }

    #[tokio::test]
    async fn test_unprefixed_text_is_ignored() {
        let hook = Arc::new(RecordingHook::default());
        let dispatcher = dispatcher(hook.clone(), Arc::default()).await;

        assert!(dispatcher.process("echo hi", caller(1)).await.is_none());
        assert!(dispatcher.process("!", caller(1)).await.is_none());
        assert!(hook.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_silent_but_hooked() {
        let hook = Arc::new(RecordingHook::default());
        let dispatcher = dispatcher(hook.clone(), Arc::default()).await;

        let outcome = dispatcher.process("!nothing here", caller(1)).await.unwrap();
        assert!(outcome.reply.is_none());
        assert!(matches!(
            outcome.error,
            Some(CommandError::Resolution(ResolveError::CommandNotFound(_)))
        ));
        assert_eq!(hook.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_prefix_and_case_insensitive_path() {
        let dispatcher = dispatcher(Arc::default(), Arc::default()).await;
        let outcome = dispatcher.process("?ECHO Keep  Case", caller(1)).await.unwrap();
        assert_eq!(outcome.reply, Some(Reply::text("echo:Keep  Case")));
    }

    #[tokio::test]
    async fn test_forbidden_never_invokes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher(Arc::default(), counter.clone()).await;

        let outcome = dispatcher.process("!admin count 3", caller(1)).await.unwrap();
        assert!(matches!(outcome.error, Some(CommandError::Forbidden(_))));

        let outcome = dispatcher.process("!admin count 3", caller(8)).await.unwrap();
        assert!(matches!(outcome.error, Some(CommandError::Forbidden(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let outcome = dispatcher.process("!admin count 3", caller(7)).await.unwrap();
        assert_eq!(outcome.reply, Some(Reply::text("counted")));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_argument_errors_surface() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher(Arc::default(), counter.clone()).await;

        let outcome = dispatcher.process("!admin count", caller(7)).await.unwrap();
        assert!(matches!(
            outcome.error,
            Some(CommandError::Argument(ArgumentError::Missing(_)))
        ));

        let outcome = dispatcher.process("!admin count x", caller(7)).await.unwrap();
        assert_eq!(
            outcome.reply,
            Some(Reply::text(":no_entry: Invalid value for `times`: `x`"))
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_group_without_default_shows_help() {
        let dispatcher = dispatcher(Arc::default(), Arc::default()).await;

        let outcome = dispatcher.process("!admin", caller(1)).await.unwrap();
        assert!(outcome.error.is_none());
        assert!(outcome.reply.unwrap().as_text().unwrap().contains("`!admin count"));

        let outcome = dispatcher.process("!admin bogus", caller(1)).await.unwrap();
        assert!(matches!(
            outcome.error,
            Some(CommandError::Resolution(ResolveError::NoSuchSubcommand { .. }))
        ));
        let reply = outcome.reply.unwrap();
        let text = reply.as_text().unwrap();
        assert!(text.starts_with(":no_entry: `admin` has no subcommand `bogus`"));
        assert!(text.contains("`!admin count"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_generic_reply() {
        let hook = Arc::new(RecordingHook::default());
        let dispatcher = dispatcher(hook.clone(), Arc::default()).await;

        let outcome = dispatcher.process("!broken", caller(1)).await.unwrap();
        assert_eq!(outcome.reply, Some(Reply::text(":no_entry: Error")));
        assert_eq!(hook.errors.lock().unwrap().len(), 1);
        assert!(hook.completions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_hook() {
        let hook = Arc::new(RecordingHook::default());
        let dispatcher = dispatcher(hook.clone(), Arc::default()).await;

        dispatcher.process("!echo", caller(1)).await.unwrap();
        assert_eq!(*hook.completions.lock().unwrap(), vec!["echo".to_string()]);
    }
}
