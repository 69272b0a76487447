//! Help.

use async_trait::async_trait;
use command_router::{
    Args, Check, CommandContext, CommandHandler, CommandSpec, CommandTree, HandlerError, Module,
    Param, RegistryError, Reply,
};

pub struct MetaModule;

struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let tree = ctx.registry.read().await;
        let query = args.get_str("command").unwrap_or_default().trim();
        if query.is_empty() {
            return Ok(Reply::text(tree.root_help(&ctx.prefix)));
        }

        match tree.resolve(query) {
            Ok(resolution) => {
                let invoked: Vec<String> =
                    resolution.labels.iter().map(|l| l.to_lowercase()).collect();
                Ok(Reply::text(tree.help(
                    resolution.node,
                    &invoked.join(" "),
                    &ctx.prefix,
                )))
            }
            Err(_) => Err(HandlerError::user(format!(
                "No command called \"{}\" found",
                query
            ))),
        }
    }
}

impl Module for MetaModule {
    fn name(&self) -> &str {
        "meta"
    }

    fn load(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        tree.register(
            CommandSpec::leaf("help", Help)
                .alias("commands")
                .description("Show all commands, or help for one")
                .param(Param::rest("command").optional())
                .check(Check::NotForbidden),
            &[],
        )?;
        Ok(())
    }

    fn unload(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        tree.unregister(&["help"])
    }
}
