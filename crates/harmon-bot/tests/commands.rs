mod common;

use command_router::Reply;
use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_random_subcommands_are_root_commands_too() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri()).await;

    for text in ["!day", "!random day"] {
        let day = harness.text(text, caller(MEMBER)).await;
        assert!(day.ends_with("day"), "{} gave {}", text, day);
    }

    let total: u64 = harness
        .text("!random die 3d6t", caller(MEMBER))
        .await
        .parse()
        .unwrap();
    assert!((3..=18).contains(&total));

    let roll: u64 = harness.text("!roll 4", caller(MEMBER)).await.parse().unwrap();
    assert!((1..=4).contains(&roll));

    let number: i64 = harness.text("!rng 3", caller(MEMBER)).await.parse().unwrap();
    assert!((1..=3).contains(&number));
}

#[tokio::test]
async fn test_bare_random_reacts() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri()).await;

    assert_eq!(
        harness.reply("!random", caller(MEMBER)).await,
        Reply::Reaction("❔".into())
    );
}

#[tokio::test]
async fn test_fact_aliases_under_date_and_number() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1/1/date"))
        .respond_with(ResponseTemplate::new(200).set_body_string("January 1st is New Year's Day."))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("42 is the answer."))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = Harness::new(&mock_server.uri()).await;

    assert_eq!(
        harness.text("!date fact 1/1", caller(MEMBER)).await,
        "January 1st is New Year's Day."
    );
    assert_eq!(
        harness.text("!fact date 1/1", caller(MEMBER)).await,
        "January 1st is New Year's Day."
    );
    assert_eq!(
        harness.text("!number fact 42", caller(MEMBER)).await,
        "42 is the answer."
    );
    assert_eq!(
        harness.text("!fact date 2-30", caller(MEMBER)).await,
        ":no_entry: Format: month/date, e.g. 1/1"
    );
}

#[tokio::test]
async fn test_color_random_follows_random_module() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/colors/random"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "title": "dusty ROSE",
            "hex": "C8A2A8",
            "rgb": { "red": 200, "green": 162, "blue": 168 },
            "hsv": { "hue": 351, "saturation": 19, "value": 78 }
        }])))
        .mount(&mock_server)
        .await;

    let harness = Harness::new(&mock_server.uri()).await;
    assert!(harness.outline().await.contains(&"color @random".to_string()));

    match harness.reply("!colour random", caller(MEMBER)).await {
        Reply::Embed(embed) => {
            assert_eq!(embed.title.as_deref(), Some("Dusty rose"));
            assert_eq!(embed.description.as_deref(), Some("#C8A2A8"));
        }
        other => panic!("expected an embed, got {:?}", other),
    }

    let registry = harness.dispatcher.registry();
    tokio_test::assert_ok!(registry.unload_module(harness.module("random")).await);

    let outline = harness.outline().await;
    assert!(outline.contains(&"color".to_string()));
    assert!(!outline.iter().any(|line| line.contains("random")));
    assert!(!outline.contains(&"dice".to_string()));

    registry.load_module(harness.module("random")).await.unwrap();
    assert!(harness.outline().await.contains(&"color @random".to_string()));
}

#[tokio::test]
async fn test_color_lookup_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/colors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let harness = Harness::new(&mock_server.uri()).await;
    assert_eq!(
        harness.text("!color no such colour", caller(MEMBER)).await,
        ":no_entry: Error"
    );
}

#[tokio::test]
async fn test_help() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri()).await;

    let root = harness.text("!help", caller(MEMBER)).await;
    assert!(root.starts_with("**Commands**"));
    assert!(root.contains("`!twitch`"));

    let number = harness.text("!commands rng", caller(MEMBER)).await;
    assert!(number.starts_with("`!rng [number=10]`"));
    assert!(number.contains("Aliases: rng"));
    assert!(number.contains("`!rng fact`"));

    assert_eq!(
        harness.text("!help nonsense", caller(MEMBER)).await,
        ":no_entry: No command called \"nonsense\" found"
    );
}

#[tokio::test]
async fn test_group_without_default_shows_help() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri()).await;

    let help = harness.text("!twitch", caller(MEMBER)).await;
    assert!(help.contains("**Subcommands**"));
    assert!(help.contains("`!twitch add`"));

    let unknown = harness.text("!twitch frobnicate", caller(MEMBER)).await;
    assert!(unknown.starts_with(":no_entry: `twitch` has no subcommand `frobnicate`"));
    assert!(unknown.contains("**Subcommands**"));
}

#[tokio::test]
async fn test_blocked_users_are_refused() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri()).await;

    assert_eq!(
        harness.text("!day", caller(BLOCKED)).await,
        ":no_entry: You don't have permission to use that command here"
    );
    assert!(harness.text("!day", caller(OWNER)).await.ends_with("day"));
}

#[tokio::test]
async fn test_unknown_commands_are_silent() {
    let mock_server = MockServer::start().await;
    let harness = Harness::new(&mock_server.uri()).await;

    let outcome = harness
        .dispatcher
        .process("!definitely_not_a_command", caller(MEMBER))
        .await
        .unwrap();
    assert!(outcome.reply.is_none());
    assert!(harness
        .dispatcher
        .process("just chatting", caller(MEMBER))
        .await
        .is_none());
}
