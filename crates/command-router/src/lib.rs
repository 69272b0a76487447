//! Prefix command routing.
//!
//! Text flows through [`strip_prefix`], [`CommandTree::resolve`], argument
//! parsing and [`Check`] evaluation before a [`CommandHandler`] is invoked by
//! the [`Dispatcher`]. Every failure ends up as an [`Outcome`] instead of
//! escaping to the caller.

mod checks;
mod dispatcher;
mod error;
mod executor;
mod params;
mod registry;
mod tokenizer;
mod types;

pub use checks::{AccessPolicy, Check};
pub use dispatcher::{DispatchHook, Dispatcher, LoggingHook, Outcome, ResolvedCommand};
pub use error::{ArgumentError, CommandError, HandlerError, RegistryError, ResolveError};
pub use executor::ComputePool;
pub use params::{parse_args, usage, ArgValue, Args, Param, ParamKind};
pub use registry::{
    CommandKind, CommandRegistry, CommandSpec, CommandTree, Edge, EdgeKind, Module, Node, NodeId,
    Resolution,
};
pub use tokenizer::{strip_prefix, Prefixes, StringView};
pub use types::{Caller, CommandContext, CommandHandler, Reply};
