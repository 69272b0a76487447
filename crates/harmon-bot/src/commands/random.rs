//! Random things.
//!
//! Every root command here is also reachable as `random <name>`, and `random
//! color` shows up as `color random` when the color command is loaded.

use crate::api::{FactKind, ResourceClient};
use crate::commands::dice;
use crate::commands::resources::color_embed;
use async_trait::async_trait;
use chrono::NaiveDate;
use command_router::{
    Args, Check, CommandContext, CommandHandler, CommandSpec, CommandTree, HandlerError, Module,
    Param, RegistryError, Reply,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Root commands also attached under `random`.
const ROOT_COMMANDS: &[&str] = &[
    "card", "command", "date", "day", "dice", "fact", "joke", "letter", "location", "number",
    "time",
];

/// Longest reply a dice roll may produce.
const DICE_OUTPUT_LIMIT: usize = 2000;

const SUITS: &[&str] = &["Spades", "Hearts", "Diamonds", "Clubs"];
const VALUES: &[&str] = &[
    "2", "3", "4", "5", "6", "7", "8", "9", "10", "Jack", "Queen", "King", "Ace",
];
const DAYS: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub struct RandomModule {
    api: ResourceClient,
    jokes: Arc<Vec<String>>,
}

impl RandomModule {
    pub fn new(api: ResourceClient, jokes: Arc<Vec<String>>) -> Self {
        Self { api, jokes }
    }
}

/// Bare `random`.
struct RandomWhat;

#[async_trait]
impl CommandHandler for RandomWhat {
    async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        Ok(Reply::Reaction("❔".into()))
    }
}

/// A reply drawn from fresh randomness alone.
struct Pick(fn() -> String);

#[async_trait]
impl CommandHandler for Pick {
    async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        Ok(Reply::Text((self.0)()))
    }
}

fn choose(options: &[&str]) -> String {
    options
        .choose(&mut rand::thread_rng())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn card() -> String {
    format!(":{}: {}", choose(SUITS).to_lowercase(), choose(VALUES))
}

fn date() -> String {
    let ordinal = rand::thread_rng().gen_range(1..=365);
    NaiveDate::from_yo_opt(2001, ordinal)
        .map(|d| d.format("%B %d").to_string())
        .unwrap_or_default()
}

fn day() -> String {
    choose(DAYS)
}

fn letter() -> String {
    char::from(rand::thread_rng().gen_range(b'A'..=b'Z')).to_string()
}

fn location() -> String {
    let mut rng = rand::thread_rng();
    let latitude: f64 = rng.gen_range(-90.0..=90.0);
    let longitude: f64 = rng.gen_range(-180.0..=180.0);
    format!("{}, {}", latitude, longitude)
}

fn time() -> String {
    let mut rng = rand::thread_rng();
    format!("{:02}:{:02}", rng.gen_range(0..24), rng.gen_range(0..60))
}

struct RandomCommand;

#[async_trait]
impl CommandHandler for RandomCommand {
    async fn invoke(&self, ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        let names = ctx.registry.read().await.root_names();
        let name = names
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| HandlerError::user("No commands"))?;
        Ok(Reply::text(format!("{}{}", ctx.prefix, name)))
    }
}

struct Dice;

#[async_trait]
impl CommandHandler for Dice {
    async fn invoke(&self, ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let input = args.get_str("input").unwrap_or("6").to_string();
        let rolled = ctx
            .compute
            .run(move || dice::roll(&input).map(|roll| roll.to_string()))
            .await?
            .map_err(|e| HandlerError::user(e.to_string()))?;

        if rolled.chars().count() > DICE_OUTPUT_LIMIT {
            return Err(HandlerError::user("Output too long"));
        }
        Ok(Reply::Text(rolled))
    }
}

struct Joke {
    jokes: Arc<Vec<String>>,
}

#[async_trait]
impl CommandHandler for Joke {
    async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        self.jokes
            .choose(&mut rand::thread_rng())
            .map(|joke| Reply::text(joke.clone()))
            .ok_or_else(|| HandlerError::user("No jokes available"))
    }
}

struct Number;

#[async_trait]
impl CommandHandler for Number {
    async fn invoke(&self, _ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let max = args.get_int("number").unwrap_or(10);
        if max < 1 {
            return Err(HandlerError::user("Number must be at least 1"));
        }
        let picked = rand::thread_rng().gen_range(1..=max);
        Ok(Reply::text(picked.to_string()))
    }
}

struct Fact {
    api: ResourceClient,
    kind: FactKind,
}

/// `month/day` with plausible ranges.
fn valid_date(date: &str) -> bool {
    let Some((month, day)) = date.split_once('/') else {
        return false;
    };
    matches!(
        (month.parse::<u32>(), day.parse::<u32>()),
        (Ok(1..=12), Ok(1..=31))
    )
}

#[async_trait]
impl CommandHandler for Fact {
    async fn invoke(&self, _ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let value = match self.kind {
            FactKind::Date => {
                let date = args.get_str("date").unwrap_or_default();
                if !valid_date(date) {
                    return Err(HandlerError::user("Format: month/date, e.g. 1/1"));
                }
                date.to_string()
            }
            _ => args
                .get_int("number")
                .ok_or_else(|| HandlerError::user("Missing number"))?
                .to_string(),
        };

        let fact = self.api.number_fact(self.kind, &value).await?;
        Ok(Reply::text(fact))
    }
}

struct RandomColor {
    api: ResourceClient,
}

#[async_trait]
impl CommandHandler for RandomColor {
    async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        let color = self.api.random_color().await?;
        Ok(Reply::Embed(color_embed(&color)))
    }
}

impl RandomModule {
    fn fact(&self, name: &str, kind: FactKind, description: &str, param: Param) -> CommandSpec {
        CommandSpec::leaf(
            name,
            Fact {
                api: self.api.clone(),
                kind,
            },
        )
        .description(description)
        .param(param)
    }

    fn root_specs(&self) -> Vec<CommandSpec> {
        let pick = |name: &str, f: fn() -> String, description: &str| {
            CommandSpec::leaf(name, Pick(f)).description(description)
        };

        vec![
            pick("card", card, "Random playing card"),
            CommandSpec::leaf("command", RandomCommand).description("Random command"),
            CommandSpec::group("date")
                .with_default(Pick(date))
                .description("Random date"),
            pick("day", day, "Random day of week"),
            CommandSpec::leaf("dice", Dice)
                .alias("die")
                .alias("roll")
                .description("Roll dice: [A]dS[t|s|^H|vL], e.g. 2d6, 4d6s, 10d6^4")
                .param(Param::rest("input").default("6")),
            CommandSpec::group("fact")
                .description("Random facts")
                .child(self.fact("date", FactKind::Date, "Fact about a date (month/date)", Param::word("date")))
                .child(self.fact("math", FactKind::Math, "Math fact about a number", Param::integer("number")))
                .child(self.fact("number", FactKind::Number, "Fact about a number", Param::integer("number")))
                .child(self.fact("year", FactKind::Year, "Fact about a year", Param::integer("number"))),
            CommandSpec::leaf(
                "joke",
                Joke {
                    jokes: self.jokes.clone(),
                },
            )
            .description("Random joke"),
            pick("letter", letter, "Random letter"),
            pick("location", location, "Random location"),
            CommandSpec::group("number")
                .alias("rng")
                .with_default(Number)
                .description("Random number, 1 to 10 by default")
                .param(Param::integer("number").default("10")),
            pick("time", time, "Random time"),
        ]
        .into_iter()
        .map(|spec| spec.check(Check::NotForbidden))
        .collect()
    }
}

impl Module for RandomModule {
    fn name(&self) -> &str {
        "random"
    }

    fn load(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        tree.register(
            CommandSpec::group("random")
                .description("Random things; all random subcommands are also commands")
                .with_default(RandomWhat)
                .check(Check::NotForbidden)
                .child(
                    CommandSpec::leaf(
                        "color",
                        RandomColor {
                            api: self.api.clone(),
                        },
                    )
                    .description("Information on a random color"),
                ),
            &[],
        )?;

        for spec in self.root_specs() {
            tree.register(spec, &[])?;
        }
        for name in ROOT_COMMANDS {
            tree.attach(&[*name], &["random"])?;
        }

        tree.register_alias(&["fact", "date"], &["date"], &["fact"])?;
        tree.register_alias(&["fact", "number"], &["number"], &["fact"])?;

        if tree.find(&["color"]).is_ok() {
            tree.register_alias(&["random", "color"], &["color"], &["random"])?;
        }
        Ok(())
    }

    fn unload(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        if tree.find(&["color", "random"]).is_ok() {
            tree.unregister_alias(&["color"], "random")?;
        }
        for name in ROOT_COMMANDS {
            tree.unregister(&[*name])?;
        }
        tree.unregister(&["random"])
    }
}
