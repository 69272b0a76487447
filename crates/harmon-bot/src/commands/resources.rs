//! Color and horoscope lookups.

use crate::api::{Color, Horoscope, ResourceClient};
use crate::commands::capitalize;
use async_trait::async_trait;
use chat_client::Embed;
use chrono::{NaiveDate, TimeZone, Utc};
use command_router::{
    Args, Check, CommandContext, CommandHandler, CommandSpec, CommandTree, HandlerError, Module,
    Param, RegistryError, Reply,
};

pub struct ResourcesModule {
    api: ResourceClient,
}

impl ResourcesModule {
    pub fn new(api: ResourceClient) -> Self {
        Self { api }
    }
}

/// Embed describing one color.
pub fn color_embed(color: &Color) -> Embed {
    let mut embed = Embed::new()
        .title(capitalize(&color.title))
        .description(format!("#{}", color.hex))
        .field(
            "RGB",
            format!("{}, {}, {}", color.rgb.red, color.rgb.green, color.rgb.blue),
        )
        .field(
            "HSV",
            format!(
                "{}°, {}%, {}%",
                color.hsv.hue, color.hsv.saturation, color.hsv.value
            ),
        );
    if let Some(image) = &color.image_url {
        embed = embed.image(image.clone());
    }
    embed
}

/// `#fab`, `FFAABB` and the like, normalized to six upper-case digits.
fn hex_code(input: &str) -> Option<String> {
    let digits = input.trim().trim_start_matches('#');
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => Some(digits.to_uppercase()),
        3 => Some(digits.chars().flat_map(|c| [c, c]).collect::<String>().to_uppercase()),
        _ => None,
    }
}

struct ColorLookup {
    api: ResourceClient,
}

#[async_trait]
impl CommandHandler for ColorLookup {
    async fn invoke(&self, _ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let query = args.get_str("color").unwrap_or_default();
        let color = match hex_code(query) {
            Some(hex) => self.api.color_by_hex(&hex).await?,
            None => self.api.search_colors(query).await?,
        };
        Ok(Reply::Embed(color_embed(&color)))
    }
}

/// Zodiac symbols name their sign.
fn sign_name(sign: &str) -> String {
    let mut chars = sign.chars();
    let symbol = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return sign.to_lowercase(),
    };
    let name = match symbol {
        '♈' => "aries",
        '♉' => "taurus",
        '♊' => "gemini",
        '♋' => "cancer",
        '♌' => "leo",
        '♍' => "virgo",
        '♎' => "libra",
        '♏' => "scorpius",
        '♐' => "sagittarius",
        '♑' => "capricorn",
        '♒' => "aquarius",
        '♓' => "pisces",
        other => return other.to_lowercase().collect(),
    };
    name.to_string()
}

fn horoscope_embed(horoscope: &Horoscope) -> Embed {
    let mut embed = Embed::new()
        .title(horoscope.sunsign.clone())
        .description(horoscope.horoscope.clone());

    for (key, value) in &horoscope.meta {
        let value = match value {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        embed = embed.field(capitalize(key), value);
    }

    let date = NaiveDate::parse_from_str(&horoscope.date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    if let Some(midnight) = date {
        embed = embed.timestamp(Utc.from_utc_datetime(&midnight));
    }
    embed
}

struct HoroscopeDay {
    api: ResourceClient,
    day: &'static str,
}

#[async_trait]
impl CommandHandler for HoroscopeDay {
    async fn invoke(&self, _ctx: &CommandContext, args: Args) -> Result<Reply, HandlerError> {
        let sign = sign_name(args.get_str("sign").unwrap_or_default());
        let horoscope = self.api.horoscope(&sign, self.day).await?;
        Ok(Reply::Embed(horoscope_embed(&horoscope)))
    }
}

struct SunSigns {
    api: ResourceClient,
}

#[async_trait]
impl CommandHandler for SunSigns {
    async fn invoke(&self, _ctx: &CommandContext, _args: Args) -> Result<Reply, HandlerError> {
        let signs = self.api.sun_signs().await?;
        Ok(Reply::text(signs.join(", ")))
    }
}

impl ResourcesModule {
    fn day(&self, day: &'static str) -> HoroscopeDay {
        HoroscopeDay {
            api: self.api.clone(),
            day,
        }
    }
}

impl Module for ResourcesModule {
    fn name(&self) -> &str {
        "resources"
    }

    fn load(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        tree.register(
            CommandSpec::group("color")
                .alias("colour")
                .description("Information on colors, by hex code or keyword")
                .with_default(ColorLookup {
                    api: self.api.clone(),
                })
                .param(Param::rest("color"))
                .check(Check::NotForbidden),
            &[],
        )?;

        let sign = || Param::word("sign");
        tree.register(
            CommandSpec::group("horoscope")
                .description("Horoscope")
                .with_default(self.day("today"))
                .param(sign())
                .check(Check::NotForbidden)
                .child(
                    CommandSpec::leaf(
                        "signs",
                        SunSigns {
                            api: self.api.clone(),
                        },
                    )
                    .alias("sun_signs")
                    .alias("sunsigns")
                    .description("Sun signs"),
                )
                .child(
                    CommandSpec::leaf("today", self.day("today"))
                        .description("Today's horoscope")
                        .param(sign()),
                )
                .child(
                    CommandSpec::leaf("tomorrow", self.day("tomorrow"))
                        .description("Tomorrow's horoscope")
                        .param(sign()),
                )
                .child(
                    CommandSpec::leaf("yesterday", self.day("yesterday"))
                        .description("Yesterday's horoscope")
                        .param(sign()),
                ),
            &[],
        )?;
        Ok(())
    }

    fn unload(&self, tree: &mut CommandTree) -> Result<(), RegistryError> {
        tree.unregister(&["color"])?;
        tree.unregister(&["horoscope"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Hsv, Rgb};

    #[test]
    fn test_hex_code() {
        assert_eq!(hex_code("#fab").as_deref(), Some("FFAABB"));
        assert_eq!(hex_code("0077be").as_deref(), Some("0077BE"));
        assert_eq!(hex_code("0x0077BE").as_deref(), Some("0077BE"));
        assert_eq!(hex_code("ocean"), None);
        assert_eq!(hex_code("12345"), None);
    }

    #[test]
    fn test_sign_name() {
        assert_eq!(sign_name("♌"), "leo");
        assert_eq!(sign_name("Virgo"), "virgo");
        assert_eq!(sign_name("X"), "x");
    }

    #[test]
    fn test_color_embed() {
        let embed = color_embed(&Color {
            title: "ocean BREEZE".into(),
            hex: "0077BE".into(),
            rgb: Rgb { red: 0, green: 119, blue: 190 },
            hsv: Hsv { hue: 202, saturation: 100, value: 75 },
            image_url: None,
        });

        assert_eq!(embed.title.as_deref(), Some("Ocean breeze"));
        assert_eq!(embed.description.as_deref(), Some("#0077BE"));
        assert_eq!(embed.fields[0].value, "0, 119, 190");
        assert_eq!(embed.fields[1].value, "202°, 100%, 75%");
    }

    #[test]
    fn test_horoscope_embed_fields_sorted() {
        let horoscope: Horoscope = serde_json::from_value(serde_json::json!({
            "sunsign": "Leo",
            "horoscope": "A good day.",
            "date": "2024-05-01",
            "meta": { "mood": "Calm", "intensity": "55%", "keywords": "rest" }
        }))
        .unwrap();

        let embed = horoscope_embed(&horoscope);
        let names: Vec<_> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Intensity", "Keywords", "Mood"]);
        assert_eq!(
            embed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
    }
}
