//! Bot command modules.

pub mod dice;
mod meta;
mod random;
mod resources;
mod twitch;

pub use meta::MetaModule;
pub use random::RandomModule;
pub use resources::{color_embed, ResourcesModule};
pub use twitch::TwitchModule;

use command_router::HandlerError;

/// `"hELLO world"` -> `"Hello world"`.
pub(crate) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub(crate) fn internal(error: impl std::error::Error + Send + Sync + 'static) -> HandlerError {
    HandlerError::Internal(error.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("ocean BLUE"), "Ocean blue");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("é"), "É");
    }
}
