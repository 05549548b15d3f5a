//! Node matching, followups and digression behaviour through the full engine.

mod helpers;

use dialog_turn_core::events::ResetReason;
use dialog_turn_core::{BranchFrame, FrameKind, SessionState, TraceEvent};
use helpers::{intent, lines, text, Bot};

const GREETINGS: &str = r#"
nodes:
  - condition: {intent: greetings}
    response: "Good day!"
  - condition: true
    response: "?"
"#;

const MENU: &str = r#"
nodes:
  - label: menu
    condition: {intent: menu}
    response: "Cake or pie?"
    followup:
      - condition: {entity_value: {entity: menu, value: cake}}
        response: cake
      - condition: true
        response: fallback
"#;

fn order_tree(settings: &str) -> String {
    format!(
        r#"
nodes:
  - label: order
    condition: {{intent: order}}
    response:
      - if:
          when: {{flag: returning}}
          then: [{{text: "Back to your order: cake or pie?"}}]
          else: [{{text: "Cake or pie?"}}]
    followup:
      - condition: {{entity: dessert}}
        response: "One {{entities.dessert}} coming up."
{settings}
  - label: hours
    condition: {{intent: hours}}
    response:
      - if:
          when: {{flag: digressing}}
          then: [{{text: "Quick answer:"}}]
      - text: "We open at nine."
  - condition: true
    response: "Sorry?"
"#
    )
}

#[tokio::test]
async fn test_greeting_scenario() {
    let bot = Bot::new(GREETINGS);
    assert_eq!(bot.say(intent("greetings")).await, lines(&["Good day!"]));
    assert!(bot.state().await.is_idle());

    assert_eq!(bot.say(text("blah")).await, lines(&["?"]));
}

#[tokio::test]
async fn test_followup_fallback_scenario() {
    let bot = Bot::new(MENU);
    assert_eq!(bot.say(intent("menu")).await, lines(&["Cake or pie?"]));

    let state = bot.state().await;
    assert_eq!(
        state.branch_stack,
        vec![BranchFrame {
            node_label: "menu".to_string(),
            kind: FrameKind::Followup,
            resume_point: None,
        }]
    );

    assert_eq!(bot.say(text("no idea")).await, lines(&["fallback"]));
    assert!(bot.state().await.is_idle());
}

#[tokio::test]
async fn test_followup_first_match() {
    let bot = Bot::new(MENU);
    bot.say(intent("menu")).await;
    let event = text("cake please").with_entity("menu", "cake");
    assert_eq!(bot.say(event).await, lines(&["cake"]));
}

#[tokio::test]
async fn test_no_root_match_is_silent() {
    let bot = Bot::new(MENU);
    let outcome = bot.traced(text("hello")).await;
    assert!(outcome.commands.is_empty());
    assert!(outcome.state.is_idle());
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e, TraceEvent::NoMatch { scope } if scope == "root")));
}

#[tokio::test]
async fn test_digression_round_trip() {
    let bot = Bot::new(&order_tree(""));
    assert_eq!(bot.say(intent("order")).await, lines(&["Cake or pie?"]));

    // The followup cannot consume "hours": digress, answer, replay the paused prompt.
    assert_eq!(
        bot.say(intent("hours")).await,
        lines(&[
            "Quick answer:",
            "We open at nine.",
            "Back to your order: cake or pie?"
        ])
    );
    assert_eq!(bot.state().await.branch_stack.len(), 1);

    let event = text("pie").with_entity("dessert", "pie");
    assert_eq!(bot.say(event).await, lines(&["One pie coming up."]));
    assert!(bot.state().await.is_idle());
}

#[tokio::test]
async fn test_digressing_flag_not_set_on_fresh_match() {
    let bot = Bot::new(&order_tree(""));
    assert_eq!(bot.say(intent("hours")).await, lines(&["We open at nine."]));
}

#[tokio::test]
async fn test_never_return_discards_paused_branch() {
    let settings = "    settings: {after_digression_followup: never_return}";
    let bot = Bot::new(&order_tree(settings));
    bot.say(intent("order")).await;

    let outcome = bot.traced(intent("hours")).await;
    let said: Vec<String> = outcome.commands.iter().map(|c| c.display_text()).collect();
    assert_eq!(said, lines(&["Quick answer:", "We open at nine."]));
    assert!(outcome.state.is_idle());
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e, TraceEvent::DigressionDiscarded { node } if node == "order")));

    // Matched fresh from the root list; the dessert followup is gone.
    let event = text("pie").with_entity("dessert", "pie");
    assert_eq!(bot.say(event).await, lines(&["Sorry?"]));
}

const CHAIN: &str = r#"
nodes:
  - label: booking
    condition: {intent: book}
    response: "Which day?"
    followup:
      - condition: {entity: date}
        response: "Booked."
  - label: menu
    condition: {intent: menu}
    response: "Cake or pie?"
    followup:
      - condition: {entity: dessert}
        response: "Noted."
  - label: bye
    condition: {intent: goodbye}
    response: [{text: "Goodbye."}, end]
"#;

#[tokio::test]
async fn test_digressions_stack_up() {
    let bot = Bot::new(CHAIN);
    bot.say(intent("book")).await;
    assert_eq!(bot.say(intent("menu")).await, lines(&["Cake or pie?"]));

    let labels: Vec<String> = bot
        .state()
        .await
        .branch_stack
        .into_iter()
        .map(|f| f.node_label)
        .collect();
    assert_eq!(labels, vec!["booking", "menu"]);

    // Completing the inner topic returns to the booking prompt.
    let event = text("pie").with_entity("dessert", "pie");
    assert_eq!(bot.say(event).await, lines(&["Noted.", "Which day?"]));
}

#[tokio::test]
async fn test_end_collapses_digression_chain() {
    let bot = Bot::new(CHAIN);
    bot.say(intent("book")).await;
    bot.say(intent("menu")).await;

    let outcome = bot.traced(intent("goodbye")).await;
    assert_eq!(outcome.commands.len(), 1);
    assert_eq!(outcome.commands[0].display_text(), "Goodbye.");
    assert!(outcome.state.is_idle());
    assert!(outcome.trace.contains(&TraceEvent::ConversationReset {
        reason: ResetReason::End
    }));

    // Neither menu nor booking resumes.
    let event = text("monday").with_entity("date", "monday");
    assert!(bot.say(event).await.is_empty());
}

#[tokio::test]
async fn test_digression_depth_limit() {
    let config = dialog_turn_core::EngineConfig {
        max_digression_depth: 1,
        ..Default::default()
    };
    let bot = Bot::with_config(CHAIN, config);
    bot.say(intent("book")).await;

    let outcome = bot.traced(intent("menu")).await;
    assert!(outcome.commands.is_empty());
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e, TraceEvent::DigressionFailed { from } if from == "booking")));
    assert_eq!(outcome.state.branch_stack.len(), 1);
}

#[tokio::test]
async fn test_followup_directive_matches_same_event() {
    let bot = Bot::new(
        r#"
nodes:
  - label: size
    condition: {intent: order}
    response: [{text: "Ordering."}, followup]
    followup:
      - condition: {entity: size}
        response: "Size {entities.size} it is."
      - condition: true
        response: "Which size?"
"#,
    );
    let event = intent("order").with_entity("size", "large");
    assert_eq!(
        bot.say(event).await,
        lines(&["Ordering.", "Size large it is."])
    );
    assert!(bot.state().await.is_idle());
}

#[tokio::test]
async fn test_listen_directive_does_not_replay() {
    let bot = Bot::new(
        r#"
nodes:
  - label: booking
    condition: {intent: book}
    response: "Which day?"
    followup:
      - condition: {entity: date}
        response: "Booked."
  - label: hours
    condition: {intent: hours}
    response: [{text: "We open at nine."}, listen]
"#,
    );
    bot.say(intent("book")).await;
    assert_eq!(bot.say(intent("hours")).await, lines(&["We open at nine."]));

    // Still paused on the booking followup.
    let event = text("monday").with_entity("date", "monday");
    assert_eq!(bot.say(event).await, lines(&["Booked."]));
}

#[tokio::test]
async fn test_stale_frames_dropped() {
    let bot = Bot::new(GREETINGS);
    bot.seed(SessionState {
        branch_stack: vec![BranchFrame {
            node_label: "removed_in_reload".to_string(),
            kind: FrameKind::Followup,
            resume_point: None,
        }],
        ..Default::default()
    })
    .await;

    let outcome = bot.traced(intent("greetings")).await;
    assert_eq!(outcome.commands[0].display_text(), "Good day!");
    assert!(outcome.trace.contains(&TraceEvent::StaleFrameDropped {
        node_label: "removed_in_reload".to_string()
    }));
    assert!(outcome.state.is_idle());
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let bot = Bot::new(MENU);
    bot.say(intent("menu")).await;

    let other = bot
        .engine
        .process_turn(&text("no idea"), "test", "someone_else")
        .await
        .unwrap();
    assert!(other.is_empty());
    assert_eq!(bot.state().await.branch_stack.len(), 1);
}

// ─── Subtrees ─────────────────────────────────────────────────

const FAQ: &str = r#"
nodes:
  - subtree: faq
  - condition: true
    response: "?"
subtrees:
  - name: faq
    guard: {intent: faq}
    nodes:
      - label: hours
        condition: {text_contains: hours}
        response: "Nine to five."
"#;

#[tokio::test]
async fn test_subtree_guard_checked_per_turn() {
    let bot = Bot::new(FAQ);
    assert_eq!(bot.say(text("what are your hours")).await, lines(&["?"]));
    assert_eq!(
        bot.say(text("what are your hours").with_intent("faq", 0.8))
            .await,
        lines(&["Nine to five."])
    );
}

const DRINKS: &str = r#"
nodes:
  - label: menu
    condition: {intent: menu}
    response: "Cake or pie?"
    followup:
      - condition: {entity: dessert}
        response: "Noted."
  - label: drinks
    condition: {intent: drinks}
    response: "Tea or coffee?"
    followup:
      - subtree: drink_choices
subtrees:
  - name: drink_choices
    nodes:
      - label: tea
        condition: {text_contains: tea}
        response: "Tea it is."
"#;

#[tokio::test]
async fn test_followup_subtree_nodes_are_not_digression_targets() {
    let bot = Bot::new(DRINKS);
    bot.say(intent("menu")).await;

    let outcome = bot.traced(text("tea please")).await;
    assert!(outcome.commands.is_empty());
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e, TraceEvent::DigressionFailed { from } if from == "menu")));
    assert!(!outcome
        .trace
        .iter()
        .any(|e| matches!(e, TraceEvent::NodeMatched { node } if node == "tea")));
    assert_eq!(outcome.state.top().unwrap().node_label, "menu");

    // Reached through its parent, the same node matches.
    let bot = Bot::new(DRINKS);
    bot.say(intent("drinks")).await;
    assert_eq!(bot.say(text("tea please")).await, lines(&["Tea it is."]));
}
