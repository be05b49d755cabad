#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests: server payloads as the game server actually sends them
//! and intents as the server expects them.

use snake_session_client::protocol::{
    Coordinate, Direction, GameSnapshot, HighscoreEntry, Intent, PlayerIdentity, SessionId, Topic,
};
use snake_session_client::stomp::{self, Command, Frame};

/// A snapshot with the extra bookkeeping fields the server serializes.
const SERVER_SNAPSHOT: &str = r#"{
    "id": "abc",
    "width": 20,
    "height": 10,
    "food": {"x": 3, "y": 4},
    "paused": true,
    "gameOver": false,
    "score": 5,
    "snakes": [
        {"idx": 0, "name": "p1", "length": 5, "dead": false, "paused": false,
         "head": {"x": 1, "y": 1}, "tail": [{"x": 1, "y": 2}], "headDirection": "up"},
        {"idx": 1, "name": "p2", "length": 2, "dead": true, "paused": true}
    ]
}"#;

#[test]
fn server_snapshot_decodes_ignoring_unknown_fields() {
    let snapshot: GameSnapshot = serde_json::from_str(SERVER_SNAPSHOT).unwrap();

    assert_eq!(snapshot.id, Some(SessionId::new("abc")));
    assert_eq!((snapshot.width.get(), snapshot.height.get()), (20, 10));
    assert_eq!(snapshot.food, Coordinate { x: 3, y: 4 });
    assert!(snapshot.paused);
    assert!(!snapshot.game_over);
    assert_eq!(snapshot.score, Some(5));
    assert_eq!(snapshot.snakes.len(), 2);
    assert!(snapshot.snakes[0].alive);
    assert!(!snapshot.snakes[1].alive, "dead snake decoded as alive");
}

#[test]
fn live_scores_follow_snake_order() {
    let snapshot: GameSnapshot = serde_json::from_str(SERVER_SNAPSHOT).unwrap();

    let scores = snapshot.scores();
    assert_eq!(
        scores,
        vec![
            HighscoreEntry { idx: 0, name: "p1".into(), score: 5 },
            HighscoreEntry { idx: 1, name: "p2".into(), score: 2 },
        ]
    );
    assert_eq!(snapshot.snake(PlayerIdentity(1)).map(|s| s.length), Some(2));
    assert!(snapshot.snake(PlayerIdentity::UNKNOWN).is_none());
}

#[test]
fn snapshot_without_optional_fields_uses_defaults() {
    let snapshot: GameSnapshot =
        serde_json::from_str(r#"{"width":5,"height":5,"food":{"x":0,"y":0}}"#).unwrap();

    assert!(snapshot.id.is_none());
    assert!(snapshot.snakes.is_empty());
    assert!(!snapshot.paused);
    assert!(!snapshot.game_over);
}

#[test]
fn highscore_table_accepts_player_name_or_name() {
    let entries: Vec<HighscoreEntry> = serde_json::from_str(
        r#"[{"playerName":"alice","score":30},{"idx":2,"name":"bob","score":12}]"#,
    )
    .unwrap();

    assert_eq!(entries[0].name, "alice");
    assert_eq!(entries[0].idx, PlayerIdentity::UNKNOWN.0);
    assert_eq!(entries[1].name, "bob");
    assert_eq!(entries[1].idx, 2);
}

#[test]
fn intents_encode_as_send_frames() {
    let cases = [
        (Intent::Join(SessionId::new("abc")), "/app/join", "abc"),
        (Intent::Move(Direction::Left), "/app/move", "\"left\""),
        (Intent::Pause, "/app/pause", ""),
        (Intent::Unpause, "/app/unpause", ""),
        (Intent::Reset, "/app/reset", ""),
        (Intent::SetName("Ada".into()), "/app/setName", "Ada"),
    ];

    for (intent, destination, body) in cases {
        let encoded = Frame::send(intent.destination(), intent.payload()).encode();
        let frames = stomp::decode(&encoded).unwrap();
        assert_eq!(frames.len(), 1, "{intent:?}");
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Send);
        assert_eq!(frame.header("destination"), Some(destination));
        assert_eq!(frame.body, body, "{intent:?}");
    }
}

#[test]
fn session_topics_in_subscription_order() {
    let destinations: Vec<String> = Topic::for_session(&SessionId::new("abc"))
        .iter()
        .map(Topic::destination)
        .collect();

    assert_eq!(
        destinations,
        ["/topic/update/abc", "/topic/newHighscore", "/user/queue/getIdx"]
    );
}

#[test]
fn broker_batch_with_heartbeats_decodes_in_order() {
    let batch = format!(
        "\nMESSAGE\ndestination:/topic/update/abc\nsubscription:sub-1\nmessage-id:1\ncontent-length:{}\n\n{}\0\n\
         MESSAGE\ndestination:/user/queue/getIdx\nsubscription:sub-3\nmessage-id:2\n\n0\0\n",
        SERVER_SNAPSHOT.len(),
        SERVER_SNAPSHOT,
    );

    let frames = stomp::decode(&batch).unwrap();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].header("subscription"), Some("sub-1"));
    let snapshot: GameSnapshot = serde_json::from_str(&frames[0].body).unwrap();
    assert_eq!(snapshot.food, Coordinate { x: 3, y: 4 });
    assert_eq!(frames[1].body, "0");
}

#[test]
fn direction_helpers() {
    for direction in Direction::ALL {
        assert_eq!(direction.opposite().opposite(), direction);
        assert_ne!(direction.opposite(), direction);
        let json = serde_json::to_string(&direction).unwrap();
        assert_eq!(json, format!("\"{direction}\""));
    }
}
