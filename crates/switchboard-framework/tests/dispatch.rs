//! End-to-end dispatch scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use switchboard_core::{DataStore, Interaction, InteractionKind, ReplyState};
use switchboard_framework::testing::{RecordingInteraction, ReplyChannel};
use switchboard_framework::{
    CommandModule, DispatchOutcome, Dispatcher, ErrorCategory, HandlerRegistry,
    InteractionContext, MemoryStore, RegisterOptions, into_handler,
};
use tokio::sync::Notify;
use tokio_test::assert_ok;

type Counter = Arc<AtomicUsize>;

fn counting(counter: &Counter) -> impl Fn(Arc<InteractionContext>) -> std::future::Ready<()> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    }
}

async fn mine(_ctx: Arc<InteractionContext>) {}

#[tokio::test(start_paused = true)]
async fn cooldown_is_scoped_to_the_full_identifier() {
    let again = Counter::default();
    let stats = Counter::default();

    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(
        registry.register_command(
            CommandModule::new("mine", mine)
                .description("Dig for ore")
                .cooldown_secs(3)
                .button("again", counting(&again))
                .button("stats", counting(&stats)),
        )
    );
    let dispatcher = Dispatcher::new(registry);

    // t = 0
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "mine_again")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(again.load(Ordering::SeqCst), 1);

    // t = 1
    tokio::time::advance(Duration::from_secs(1)).await;
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "mine_stats")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(stats.load(Ordering::SeqCst), 1);

    let rejected = Arc::new(RecordingInteraction::button("U1", "mine_again"));
    let outcome = dispatcher.dispatch(rejected.clone()).await;
    assert_eq!(outcome, DispatchOutcome::OnCooldown { seconds_remaining: 2 });
    assert_eq!(again.load(Ordering::SeqCst), 1);
    let reply = rejected.last_reply().unwrap();
    assert!(reply.ephemeral);
    assert!(reply.content.contains("2s"));

    // Another actor is unaffected.
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U2", "mine_again")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);

    // t = 3
    tokio::time::advance(Duration::from_secs(2)).await;
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "mine_again")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(again.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unregistered_identifier_gets_one_unavailable_reply() {
    let dispatcher = Dispatcher::new(Arc::new(HandlerRegistry::default()));
    let interaction = Arc::new(RecordingInteraction::button("U1", "ghost_panel"));

    let outcome = dispatcher.dispatch(interaction.clone()).await;

    assert_eq!(outcome, DispatchOutcome::Unresolved);
    let sent = interaction.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, ReplyChannel::Reply);
    assert_eq!(
        sent[0].reply.as_ref().unwrap().content,
        dispatcher.options().messages.unavailable
    );
    assert!(dispatcher.recovery().is_empty());
    assert_eq!(dispatcher.stats().snapshot().unresolved, 1);
}

#[tokio::test]
async fn storage_failure_is_recovered_with_retry() {
    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(registry.register(
        InteractionKind::Button,
        "bank_deposit",
        into_handler(|_ctx: Arc<InteractionContext>| async {
            Err::<(), _>(anyhow::anyhow!("Database connection failed"))
        }),
        RegisterOptions::default(),
    ));
    let dispatcher = Dispatcher::new(registry);
    let before = dispatcher.recovery().len();
    let interaction = Arc::new(RecordingInteraction::button("U1", "bank_deposit"));

    let outcome = dispatcher.dispatch(interaction.clone()).await;

    assert_eq!(outcome, DispatchOutcome::Failed(ErrorCategory::Storage));
    assert_eq!(dispatcher.recovery().len(), before + 1);
    let record = &dispatcher.recovery().recent_errors()[0];
    assert_eq!(record.category, ErrorCategory::Storage);
    assert_eq!(record.actor_id, "U1");
    assert_eq!(record.context_tag, "bank_deposit");
    assert_eq!(record.message, "Database connection failed");

    let replies = interaction.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].retry.as_ref().unwrap().identifier, "bank_deposit");
}

#[tokio::test]
async fn exact_match_beats_owner_fallback() {
    let exact = Counter::default();
    let fallback = Counter::default();

    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(
        registry.register_command(
            CommandModule::new("hunt", mine)
                .description("Go hunting")
                .fallback(InteractionKind::Button, counting(&fallback)),
        )
    );
    assert_ok!(registry.register(
        InteractionKind::Button,
        "hunt_start",
        into_handler(counting(&exact)),
        RegisterOptions::default(),
    ));
    let dispatcher = Dispatcher::new(registry);

    dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "hunt_start")))
        .await;
    assert_eq!(exact.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.load(Ordering::SeqCst), 0);

    dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "hunt_track")))
        .await;
    assert_eq!(fallback.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reregistration_replaces_the_old_callback() {
    let old = Counter::default();
    let new = Counter::default();

    let registry = Arc::new(HandlerRegistry::default());
    let dispatcher = Dispatcher::new(Arc::clone(&registry));
    assert_ok!(registry.register(
        InteractionKind::Modal,
        "pets_rename",
        into_handler(counting(&old)),
        RegisterOptions::default(),
    ));
    dispatcher
        .dispatch(Arc::new(RecordingInteraction::new("modal", "U1", "pets_rename")))
        .await;

    assert_ok!(registry.register(
        InteractionKind::Modal,
        "pets_rename",
        into_handler(counting(&new)),
        RegisterOptions::default(),
    ));
    dispatcher
        .dispatch(Arc::new(RecordingInteraction::new("modal", "U1", "pets_rename")))
        .await;

    assert_eq!(old.load(Ordering::SeqCst), 1);
    assert_eq!(new.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handlers_reach_store_and_arguments() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(
        registry.register_command(
            CommandModule::new("bank", |ctx: Arc<InteractionContext>| async move {
                #[derive(serde::Deserialize)]
                struct Deposit {
                    amount: u64,
                }
                let Deposit { amount } = ctx.args()?;
                let record = ctx
                    .require_store()?
                    .update(ctx.actor_id(), json!({ "coins": amount }))
                    .await?;
                anyhow::Ok(switchboard_core::Reply::text(format!("Balance: {}", record["coins"])))
            })
            .description("Manage your coins"),
        )
    );
    let dispatcher = Dispatcher::builder(registry).store(store.clone()).build();

    let interaction = Arc::new(
        RecordingInteraction::command("U1", "bank").with_arguments(json!({ "amount": 40 })),
    );
    let outcome = dispatcher.dispatch(interaction.clone()).await;

    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(interaction.last_reply().unwrap().content, "Balance: 40");
    assert_eq!(
        assert_ok!(store.get("U1").await),
        Some(json!({ "coins": 40 }))
    );

    store.set_offline(true);
    let interaction = Arc::new(
        RecordingInteraction::command("U1", "bank").with_arguments(json!({ "amount": 5 })),
    );
    let outcome = dispatcher.dispatch(interaction).await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorCategory::Storage));
}

#[tokio::test]
async fn deferred_interaction_receives_an_edit() {
    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(registry.register(
        InteractionKind::SelectMenu,
        "brew_recipe",
        into_handler(|ctx: Arc<InteractionContext>| async move {
            ctx.defer().await?;
            anyhow::Ok(switchboard_core::Reply::text("Brewing..."))
        }),
        RegisterOptions::default(),
    ));
    let dispatcher = Dispatcher::new(registry);
    let interaction = Arc::new(RecordingInteraction::new("select_menu", "U1", "brew_recipe"));

    assert_eq!(
        dispatcher.dispatch(interaction.clone()).await,
        DispatchOutcome::Completed
    );
    let channels: Vec<_> = interaction.sent().iter().map(|s| s.channel).collect();
    assert_eq!(channels, vec![ReplyChannel::Defer, ReplyChannel::Edit]);
    assert_eq!(interaction.reply_state(), ReplyState::Responded);
}

#[tokio::test]
async fn concurrent_dispatches_all_complete() {
    let calls = Counter::default();
    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(registry.register(
        InteractionKind::Button,
        "fish_cast",
        into_handler(counting(&calls)),
        RegisterOptions::default(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .dispatch(Arc::new(RecordingInteraction::button(&format!("U{i}"), "fish_cast")))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(assert_ok!(task.await), DispatchOutcome::Completed);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 16);
    assert!(dispatcher.tracker().is_empty());
    assert_eq!(dispatcher.stats().completed(InteractionKind::Button), 16);
}

#[tokio::test]
async fn store_failures_classify_as_storage_however_wrapped() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(registry.register(
        InteractionKind::Button,
        "bank_reset",
        into_handler(|ctx: Arc<InteractionContext>| async move {
            ctx.require_store()?.update(ctx.actor_id(), json!(5)).await?;
            anyhow::Ok(())
        }),
        RegisterOptions::default(),
    ));
    assert_ok!(registry.register(
        InteractionKind::Button,
        "bank_profile",
        into_handler(|ctx: Arc<InteractionContext>| async move {
            ctx.require_store()?
                .get(ctx.actor_id())
                .await
                .context("loading player profile")?;
            anyhow::Ok(())
        }),
        RegisterOptions::default(),
    ));
    let dispatcher = Dispatcher::builder(registry).store(store.clone()).build();

    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "bank_reset")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorCategory::Storage));

    store.set_offline(true);
    let interaction = Arc::new(RecordingInteraction::button("U1", "bank_profile"));
    let outcome = dispatcher.dispatch(interaction.clone()).await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorCategory::Storage));
    assert!(interaction.last_reply().unwrap().has_retry());
    assert_eq!(dispatcher.recovery().len(), 2);
}

#[tokio::test]
async fn reloading_a_module_drops_handlers_it_no_longer_has() {
    let old_autocomplete = Counter::default();
    let registry = Arc::new(HandlerRegistry::default());
    let dispatcher = Dispatcher::new(Arc::clone(&registry));

    assert_ok!(
        registry.register_command(
            CommandModule::new("mine", mine)
                .description("Dig for ore")
                .autocomplete(counting(&old_autocomplete)),
        )
    );
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::new("autocomplete", "U1", "mine")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);

    assert_ok!(registry.register_command(CommandModule::new("mine", mine).description("Dig for ore")));
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::new("autocomplete", "U1", "mine")))
        .await;

    assert_eq!(outcome, DispatchOutcome::Unresolved);
    assert_eq!(old_autocomplete.load(Ordering::SeqCst), 1);
    assert!(registry.resolve(InteractionKind::Autocomplete, "mine").is_none());
    assert!(registry.resolve(InteractionKind::Command, "mine").is_some());
}

#[tokio::test(start_paused = true)]
async fn command_cooldown_is_held_while_the_handler_runs() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let calls = Counter::default();
    let slow = {
        let (started, release, calls) = (started.clone(), release.clone(), calls.clone());
        move |_ctx: Arc<InteractionContext>| {
            let (started, release, calls) = (started.clone(), release.clone(), calls.clone());
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                started.notify_one();
                release.notified().await;
            }
        }
    };

    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(
        registry.register_command(
            CommandModule::new("mine", mine)
                .description("Dig for ore")
                .cooldown_secs(3)
                .button("again", slow),
        )
    );
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let first = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .dispatch(Arc::new(RecordingInteraction::button("U1", "mine_again")))
                .await
        })
    };
    started.notified().await;

    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "mine_again")))
        .await;
    assert!(matches!(outcome, DispatchOutcome::OnCooldown { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    release.notify_one();
    assert_eq!(assert_ok!(first.await), DispatchOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_handler_still_consumes_its_cooldown() {
    let calls = Counter::default();
    let failing = {
        let calls = calls.clone();
        move |_ctx: Arc<InteractionContext>| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<(), _>(anyhow::anyhow!("Database connection failed")))
        }
    };

    let registry = Arc::new(HandlerRegistry::default());
    assert_ok!(
        registry.register_command(
            CommandModule::new("bank", mine)
                .description("Manage your coins")
                .cooldown_secs(3)
                .button("vault", failing),
        )
    );
    let dispatcher = Dispatcher::new(registry);

    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "bank_vault")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorCategory::Storage));

    tokio::time::advance(Duration::from_secs(1)).await;
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "bank_vault")))
        .await;
    assert_eq!(outcome, DispatchOutcome::OnCooldown { seconds_remaining: 2 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let outcome = dispatcher
        .dispatch(Arc::new(RecordingInteraction::button("U1", "bank_vault")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorCategory::Storage));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
