//! Dispatch integration tests: envelope → handler → settled document.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use skill_core::response::{CardSpec, PlayBehavior, Stream};
use skill_core::{
    Config, Done, Error, ErrorKind, HandlerOutcome, Messages, Rejection, ResponseDocument,
    Skill, SkillBuilder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready};

/// Helper: intent envelope with a live session.
fn intent_body(name: &str, attributes: Value) -> Value {
    json!({
        "version": "1.0",
        "session": {
            "new": false,
            "sessionId": "session-1",
            "application": {"applicationId": "app-1"},
            "attributes": attributes,
            "user": {"userId": "user-1"}
        },
        "request": {
            "type": "IntentRequest",
            "requestId": "req-1",
            "locale": "en-US",
            "intent": {"name": name, "slots": {"City": {"name": "City", "value": "Oslo"}}}
        }
    })
}

/// Helper: envelope with only a request type and no session.
fn typed_body(request_type: &str) -> Value {
    json!({"request": {"type": request_type, "requestId": "req-2"}})
}

fn speech(doc: &ResponseDocument) -> Option<&str> {
    doc.response.output_speech.as_ref().map(|s| s.ssml())
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

// =============================================================================
// Happy paths
// =============================================================================

#[tokio::test]
async fn test_intent_handler_speaks_and_keeps_session_open() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Weather", |req, res, _| {
            let city = req.slot_or("City", "nowhere").to_string();
            res.say(&format!("Sunny in {city}"))
                .should_end_session(false, Some("Another city?"));
            HandlerOutcome::done()
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Weather", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>Sunny in Oslo</speak>"));
    assert!(!doc.response.should_end_session);
    assert_eq!(
        doc.response.reprompt.unwrap().output_speech.ssml(),
        "<speak>Another city?</speak>"
    );
}

#[tokio::test]
async fn test_session_attributes_round_trip() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Count", |req, res, _| {
            let seen = req
                .session()
                .get("count")
                .map(|v| v.and_then(|v| v.as_i64()).unwrap_or(0));
            let result = seen.and_then(|n| res.session().set("count", n + 1));
            HandlerOutcome::from(result)
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Count", json!({"count": 1, "keep": "me"})))
        .await
        .unwrap();
    assert_eq!(
        Value::Object(doc.session_attributes),
        json!({"count": 2, "keep": "me"})
    );
}

#[tokio::test]
async fn test_persistent_session_disabled_emits_empty_attributes() {
    let config = Config {
        persistent_session: false,
        ..Config::default()
    };
    let mut builder = Skill::builder(config);
    builder
        .intent("Count", |_, res, _| {
            HandlerOutcome::from(res.session().set("count", 5))
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Count", json!({"count": 1})))
        .await
        .unwrap();
    assert!(doc.session_attributes.is_empty());
}

#[tokio::test]
async fn test_async_handler_is_awaited() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Slow", |_, res, _| {
            HandlerOutcome::future(async move {
                tokio::task::yield_now().await;
                res.say("done waiting")
                    .card(CardSpec::simple("Slow", "<speak>done</speak>"));
                Ok(())
            })
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Slow", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>done waiting</speak>"));
    let value = doc.to_value().unwrap();
    assert_eq!(value["response"]["card"]["content"], json!("done"));
}

#[tokio::test]
async fn test_async_handler_error_rejects() {
    let mut builder = Skill::builder(Config::default());
    builder
        .intent("Broken", |_, _, _| {
            HandlerOutcome::future(async { Err(Error::handler("backend down")) })
        })
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Broken", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, "Unhandled exception: backend down.");
    assert_eq!(rejection.kind(), Some(ErrorKind::UnhandledException));
}

#[tokio::test]
async fn test_async_panic_rejects() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Explode", |_, _, _| {
            HandlerOutcome::future(async {
                tokio::task::yield_now().await;
                let explode = true;
                if explode {
                    panic!("async kaboom");
                }
                Ok(())
            })
        })
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Explode", json!({})))
        .await
        .unwrap_err();
    assert!(rejection.reason.contains("async kaboom"));
}

// =============================================================================
// Settlement (exactly once)
// =============================================================================

#[tokio::test]
async fn test_double_send_settles_once_and_fires_post_once() {
    let (posts, seen_posts) = counter();
    let (wins, seen_wins) = counter();

    let mut builder = SkillBuilder::default();
    builder.post(move |_, _, _, _| {
        seen_posts.fetch_add(1, Ordering::SeqCst);
    });
    builder
        .intent("Twice", move |_, res, _| {
            res.say("first");
            if res.send() {
                seen_wins.fetch_add(1, Ordering::SeqCst);
            }
            res.say(" late");
            if res.send() {
                seen_wins.fetch_add(1, Ordering::SeqCst);
            }
            HandlerOutcome::done()
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Twice", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>first</speak>"));
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(posts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fail_then_done_keeps_rejection() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Refuse", |_, res, _| {
            res.fail("not today");
            HandlerOutcome::done()
        })
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Refuse", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, "not today");
    assert!(rejection.cause.is_none());
}

#[test]
fn test_deferred_handler_completes_later() {
    let slot: Arc<Mutex<Option<Done>>> = Arc::new(Mutex::new(None));
    let stash = slot.clone();

    let mut builder = SkillBuilder::default();
    builder
        .intent("Later", move |_, res, done| {
            res.say("eventually");
            *stash.lock().unwrap() = Some(done);
            HandlerOutcome::Deferred
        })
        .unwrap();
    let skill = builder.build();

    let mut task = tokio_test::task::spawn(skill.dispatch(intent_body("Later", json!({}))));
    assert_pending!(task.poll());

    let done = slot.lock().unwrap().take().unwrap();
    assert!(!done.is_called());
    done.succeed();
    assert!(task.is_woken());

    let doc = assert_ready!(task.poll()).unwrap();
    assert_eq!(speech(&doc), Some("<speak>eventually</speak>"));
}

#[tokio::test]
async fn test_deferred_handler_finishing_from_spawned_task() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Spawned", |_, res, _| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                res.say("from a task").send();
            });
            HandlerOutcome::Deferred
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Spawned", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>from a task</speak>"));
}

#[tokio::test]
async fn test_abandoned_turn_rejects() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Forget", |_, _, _| HandlerOutcome::Deferred)
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Forget", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, Rejection::abandoned().reason);
}

// =============================================================================
// Hooks
// =============================================================================

#[tokio::test]
async fn test_pre_hook_short_circuits_dispatch() {
    let (calls, seen_calls) = counter();
    let mut builder = SkillBuilder::default();
    builder.pre(|req, res, category| {
        assert_eq!(category, Some("IntentRequest"));
        if req.application_id() != Some("expected-app") {
            res.say("Wrong application").send();
        }
        Ok(())
    });
    builder
        .intent("Hello", move |_, res, _| {
            seen_calls.fetch_add(1, Ordering::SeqCst);
            res.say("should not run");
            HandlerOutcome::done()
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Hello", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>Wrong application</speak>"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pre_hook_error_rejects() {
    let mut builder = SkillBuilder::default();
    builder.pre(|_, _, _| Err(Error::handler("denied")));
    builder
        .intent("Hello", |_, _, _| HandlerOutcome::done())
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Hello", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, "Unhandled exception: denied.");
}

#[tokio::test]
async fn test_post_hook_can_amend_response() {
    let mut builder = SkillBuilder::default();
    builder.post(|_, res, _, error| {
        if error.is_none() {
            res.say(" Goodbye.");
        }
    });
    builder
        .intent("Hello", |_, res, _| {
            res.say("Hi.");
            HandlerOutcome::done()
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Hello", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>Hi. Goodbye.</speak>"));
}

#[tokio::test]
async fn test_error_hook_takes_precedence_over_messages() {
    let kinds: Arc<Mutex<Vec<ErrorKind>>> = Arc::default();
    let seen = kinds.clone();
    let mut builder = SkillBuilder::default();
    builder.error(move |error, _, res| {
        seen.lock().unwrap().push(error.kind());
        res.say("Handled by hook").send();
    });

    let doc = builder
        .build()
        .dispatch(intent_body("Unknown", json!({})))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>Handled by hook</speak>"));
    assert_eq!(*kinds.lock().unwrap(), vec![ErrorKind::NoIntentFound]);
}

#[tokio::test]
async fn test_error_hook_leaving_turn_pending_fails_it() {
    let mut builder = SkillBuilder::default();
    builder.error(|_, _, _| {});
    builder
        .intent("Boom", |_, _, _| HandlerOutcome::Sync(Err(Error::handler("boom"))))
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Boom", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, "Unhandled exception: boom.");
}

#[tokio::test]
async fn test_post_hook_receives_error() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = errors.clone();
    let mut builder = SkillBuilder::default();
    builder.post(move |_, _, _, error| {
        if let Some(e) = error {
            seen.lock().unwrap().push(e.to_string());
        }
    });
    builder
        .intent("Boom", |_, _, done| {
            done.fail(Error::handler("boom"));
            HandlerOutcome::Deferred
        })
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Boom", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, "Unhandled exception: boom.");
    assert_eq!(*errors.lock().unwrap(), vec!["boom".to_string()]);
}

// =============================================================================
// Built-in recovery and defaults
// =============================================================================

#[tokio::test]
async fn test_unknown_intent_speaks_default_message() {
    let doc = SkillBuilder::default()
        .build()
        .dispatch(intent_body("Nope", json!({"keep": true})))
        .await
        .unwrap();
    assert_eq!(
        speech(&doc),
        Some("<speak>Sorry, the requested intent not found.</speak>")
    );
    assert_eq!(Value::Object(doc.session_attributes), json!({"keep": true}));
}

#[tokio::test]
async fn test_unknown_intent_without_message_rejects() {
    let config = Config {
        messages: Messages::none(),
        ..Config::default()
    };
    let rejection = Skill::builder(config)
        .build()
        .dispatch(intent_body("Nope", json!({})))
        .await
        .unwrap_err();
    assert_eq!(
        rejection.reason,
        "Unhandled exception: no intent found: Nope."
    );
    assert_eq!(rejection.kind(), Some(ErrorKind::NoIntentFound));
}

#[tokio::test]
async fn test_custom_unhandled_prefix() {
    let mut config = Config::default();
    config
        .messages
        .set(ErrorKind::UnhandledException, Some("Oops".to_string()));
    let mut builder = Skill::builder(config);
    builder
        .intent("Boom", |_, _, _| HandlerOutcome::Sync(Err(Error::handler("bad"))))
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(intent_body("Boom", json!({})))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, "Oops: bad.");
}

#[tokio::test]
async fn test_launch_without_handler_speaks_hint() {
    let doc = SkillBuilder::default()
        .build()
        .dispatch(typed_body("LaunchRequest"))
        .await
        .unwrap();
    assert_eq!(
        speech(&doc),
        Some("<speak>Try telling the application what to do instead of opening it</speak>")
    );
}

#[tokio::test]
async fn test_launch_handler_runs() {
    let mut builder = SkillBuilder::default();
    builder.launch(|_, res, _| {
        res.say("Welcome").should_end_session(false, None);
        HandlerOutcome::done()
    });

    let doc = builder
        .build()
        .dispatch(typed_body("LaunchRequest"))
        .await
        .unwrap();
    assert_eq!(speech(&doc), Some("<speak>Welcome</speak>"));
    assert!(!doc.response.should_end_session);
}

#[tokio::test]
async fn test_invalid_request_type_speaks_message() {
    let skill = SkillBuilder::default().build();
    for body in [typed_body("Bogus"), json!({"request": {}}), json!({})] {
        let doc = skill.dispatch(body).await.unwrap();
        assert_eq!(speech(&doc), Some("<speak>Error: not a valid request</speak>"));
    }
}

#[tokio::test]
async fn test_session_ended_without_handler_resolves_empty() {
    let doc = SkillBuilder::default()
        .build()
        .dispatch(typed_body("SessionEndedRequest"))
        .await
        .unwrap();
    assert!(doc.response.output_speech.is_none());
    assert!(doc.response.should_end_session);
}

#[tokio::test]
async fn test_session_ended_handler_runs() {
    let (calls, seen_calls) = counter();
    let mut builder = SkillBuilder::default();
    builder.session_ended(move |_, _, _| {
        seen_calls.fetch_add(1, Ordering::SeqCst);
        HandlerOutcome::done()
    });

    builder
        .build()
        .dispatch(typed_body("SessionEndedRequest"))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_session_on_speech_turn_apologizes() {
    let mut builder = SkillBuilder::default();
    builder.launch(|_, res, _| HandlerOutcome::from(res.session().set("seen", true)));

    let doc = builder
        .build()
        .dispatch(typed_body("LaunchRequest"))
        .await
        .unwrap();
    assert_eq!(
        speech(&doc),
        Some("<speak>Sorry, this conversation has no session to remember that in.</speak>")
    );
}

// =============================================================================
// Media-player turns
// =============================================================================

#[tokio::test]
async fn test_unregistered_media_event_resolves_empty() {
    let doc = SkillBuilder::default()
        .build()
        .dispatch(typed_body("AudioPlayer.PlaybackStarted"))
        .await
        .unwrap();
    assert!(doc.response.output_speech.is_none());
    assert!(doc.response.directives.is_empty());
}

#[tokio::test]
async fn test_media_event_handler_enqueues_stream() {
    let mut builder = SkillBuilder::default();
    builder
        .audio_player("PlaybackNearlyFinished", |_, res, _| {
            res.play_stream(
                PlayBehavior::Enqueue,
                Stream::new("https://cdn.example.com/next.mp3", "next")
                    .with_expected_previous_token("current"),
            );
            HandlerOutcome::done()
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(typed_body("AudioPlayer.PlaybackNearlyFinished"))
        .await
        .unwrap();
    let value = doc.to_value().unwrap();
    let directive = &value["response"]["directives"][0];
    assert_eq!(directive["type"], json!("AudioPlayer.Play"));
    assert_eq!(directive["playBehavior"], json!("ENQUEUE"));
    assert_eq!(
        directive["audioItem"]["stream"]["expectedPreviousToken"],
        json!("current")
    );
}

#[tokio::test]
async fn test_media_event_known_error_rejects_with_message() {
    let mut builder = SkillBuilder::default();
    builder
        .audio_player("PlaybackStopped", |req, _, _| {
            HandlerOutcome::from(req.session().set("offset", 1200))
        })
        .unwrap();

    let rejection = builder
        .build()
        .dispatch(typed_body("AudioPlayer.PlaybackStopped"))
        .await
        .unwrap_err();
    assert_eq!(
        rejection.reason,
        "Sorry, this conversation has no session to remember that in."
    );
    assert_eq!(rejection.kind(), Some(ErrorKind::NoSessionAvailable));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_completion_wins_across_threads() {
    let (posts, seen_posts) = counter();
    let saw_error: Arc<Mutex<Option<bool>>> = Arc::default();
    let seen_error = saw_error.clone();

    let mut builder = SkillBuilder::default();
    builder.post(move |_, _, _, error| {
        *seen_error.lock().unwrap() = Some(error.is_some());
        // Keep the winner busy while the other completion arrives.
        std::thread::sleep(Duration::from_millis(300));
        seen_posts.fetch_add(1, Ordering::SeqCst);
    });
    builder
        .intent("Race", |_, res, done| {
            res.say("winner");
            std::thread::spawn(move || done.succeed());
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                assert!(!res.fail("late fail"));
            });
            HandlerOutcome::Deferred
        })
        .unwrap();

    let doc = builder
        .build()
        .dispatch(intent_body("Race", json!({})))
        .await
        .unwrap();
    // The result is only delivered after the post hook returned.
    assert_eq!(posts.load(Ordering::SeqCst), 1);
    assert_eq!(*saw_error.lock().unwrap(), Some(false));
    assert_eq!(speech(&doc), Some("<speak>winner</speak>"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_turns_are_isolated() {
    let mut builder = SkillBuilder::default();
    builder
        .intent("Echo", |req, res, _| {
            let n = req
                .session()
                .get("n")
                .ok()
                .flatten()
                .and_then(|v| v.as_i64())
                .unwrap_or(-1);
            HandlerOutcome::future(async move {
                tokio::task::yield_now().await;
                res.say(&n.to_string());
                Ok(())
            })
        })
        .unwrap();
    let skill = builder.build();

    let tasks: Vec<_> = (0..32)
        .map(|n| {
            let skill = skill.clone();
            tokio::spawn(async move { (n, skill.dispatch(intent_body("Echo", json!({"n": n}))).await) })
        })
        .collect();

    for task in tasks {
        let (n, result) = task.await.unwrap();
        let doc = result.unwrap();
        assert_eq!(speech(&doc).unwrap(), format!("<speak>{n}</speak>"));
        assert_eq!(Value::Object(doc.session_attributes), json!({"n": n}));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever sequence of terminal calls a handler makes, the first one
    /// decides the outcome and the post hook runs exactly once.
    #[test]
    fn prop_first_terminal_call_wins(ops in prop::collection::vec(any::<bool>(), 1..6)) {
        let (posts, seen_posts) = counter();
        let script = ops.clone();

        let mut builder = SkillBuilder::default();
        builder.post(move |_, _, _, _| {
            seen_posts.fetch_add(1, Ordering::SeqCst);
        });
        builder
            .intent("Script", move |_, res, _| {
                for (i, send) in script.iter().enumerate() {
                    if *send {
                        res.say(&i.to_string()).send();
                    } else {
                        res.fail(format!("op{i}"));
                    }
                }
                HandlerOutcome::done()
            })
            .unwrap();
        let skill = builder.build();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt.block_on(skill.dispatch(intent_body("Script", json!({}))));

        if ops[0] {
            let doc = result.unwrap();
            prop_assert_eq!(speech(&doc), Some("<speak>0</speak>"));
        } else {
            prop_assert_eq!(result.unwrap_err().reason, "op0".to_string());
        }
        prop_assert_eq!(posts.load(Ordering::SeqCst), 1);
    }
}
