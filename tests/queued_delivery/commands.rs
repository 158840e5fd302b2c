//! Queued commands: publish, consume, acknowledge or redeliver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cqrs_mediator::transport::TYPE_INFO_ATTRIBUTE;
use cqrs_mediator::{
    CommandExecutor, CommandHandler, DispatchError, HandlerError, InMemoryQueue,
    InvocationContext, Message, OrganisationMember, Payload, QueueTransport,
    QueuedCommandExecutor, SharedQueueNaming, Uuid,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::support::{
    create_invoice, eventually, fast_queue, void_invoice, CreateInvoice, Ledger, VoidInvoice,
};

const WAIT: Duration = Duration::from_secs(2);

fn queued(queue: &InMemoryQueue, ledger: &Arc<Ledger>) -> QueuedCommandExecutor<Ledger, InMemoryQueue> {
    QueuedCommandExecutor::new(Arc::clone(ledger), "billing", Arc::new(queue.clone()))
}

// ============================================================================
// Test 1: Round trip matches direct execution
// ============================================================================

#[test]
fn queued_round_trip_matches_direct_execute() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let mut commands = queued(&queue, &ledger);
    commands
        .register_command_handler(CommandHandler::with_store(create_invoice), OrganisationMember)
        .unwrap();
    assert_eq!(commands.subscribed_queues(), vec!["billing-createinvoice"]);

    let org = Uuid::new_v4();
    let cmd = CreateInvoice::new(org, 120);
    let caller = InvocationContext::new().with_organisations([org]);
    commands.execute(&caller, Some(org), cmd.clone()).unwrap();

    assert!(eventually(WAIT, || ledger.len() == 1));
    assert!(eventually(WAIT, || queue.is_empty("billing-createinvoice")));
    queue.close();

    let mut direct = CommandExecutor::new(Arc::new(Ledger::default()));
    direct
        .register_command_handler(CommandHandler::with_store(create_invoice), OrganisationMember)
        .unwrap();
    direct.execute(&caller, Some(org), cmd).unwrap();

    assert_eq!(ledger.invoices(), direct.store().invoices());
    assert_eq!(queue.stats("billing-createinvoice").unwrap().handled, 1);
}

// ============================================================================
// Test 2: Failed handling leaves the message for redelivery
// ============================================================================

#[test]
fn failing_handler_is_redelivered() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);

    let mut commands = queued(&queue, &ledger);
    commands
        .register_command_handler(
            CommandHandler::with_store(move |ledger: &Ledger, cmd: CreateInvoice| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(HandlerError::other("ledger offline"));
                }
                create_invoice(ledger, cmd)
            }),
            OrganisationMember,
        )
        .unwrap();

    commands
        .execute(&InvocationContext::new(), None, CreateInvoice::new(Uuid::new_v4(), 5))
        .unwrap();

    assert!(eventually(WAIT, || ledger.len() == 1));
    assert!(eventually(WAIT, || queue.is_empty("billing-createinvoice")));
    queue.close();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let stats = queue.stats("billing-createinvoice").unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.handled, 1);
}

// ============================================================================
// Test 3: Publishing requires a local handler
// ============================================================================

#[test]
fn execute_without_handler_publishes_nothing() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let commands = queued(&queue, &ledger);

    let err = commands
        .execute(&InvocationContext::new(), None, VoidInvoice { id: Uuid::new_v4() })
        .unwrap_err();

    assert!(matches!(err, DispatchError::Lookup(_)));
    assert!(queue.queue_names().is_empty());
    queue.close();
}

// ============================================================================
// Test 4: Shared naming uses one subscription for every command
// ============================================================================

#[test]
fn shared_queue_has_one_consumer() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let mut commands =
        queued(&queue, &ledger).with_naming_strategy(SharedQueueNaming::new("billing", "commands"));

    commands
        .register_command_handler(CommandHandler::with_store(create_invoice), OrganisationMember)
        .unwrap();
    commands
        .register_command_handler(CommandHandler::with_store(void_invoice), OrganisationMember)
        .unwrap();

    assert_eq!(commands.queue_name_for("api.CreateInvoice"), "billing-commands");
    assert_eq!(commands.queue_name_for("VoidInvoice"), "billing-commands");
    assert_eq!(commands.subscribed_queues(), vec!["billing-commands"]);
    assert_eq!(queue.subscribed_queues(), vec!["billing-commands"]);

    let cmd = CreateInvoice::new(Uuid::new_v4(), 40);
    let id = cmd.id;
    commands.execute(&InvocationContext::new(), None, cmd).unwrap();
    assert!(eventually(WAIT, || ledger.len() == 1));

    commands
        .execute(&InvocationContext::new(), None, VoidInvoice { id })
        .unwrap();
    assert!(eventually(WAIT, || ledger.len() == 0));

    queue.close();
    assert_eq!(queue.stats("billing-commands").unwrap().handled, 2);
}

// ============================================================================
// Test 5: Unknown message types are dropped, undecodable bodies are kept
// ============================================================================

#[test]
fn unknown_type_is_deleted_and_bad_body_is_kept() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let mut commands = queued(&queue, &ledger);
    commands
        .register_command_handler(CommandHandler::with_store(create_invoice), OrganisationMember)
        .unwrap();

    queue
        .send(
            "billing-createinvoice",
            Message::new("{}").with_attribute(TYPE_INFO_ATTRIBUTE, "api.RefundInvoice"),
        )
        .unwrap();
    queue
        .send("billing-createinvoice", Message::new("{}"))
        .unwrap();
    assert!(eventually(WAIT, || queue.is_empty("billing-createinvoice")));

    queue
        .send(
            "billing-createinvoice",
            Message::new("not json").with_attribute(TYPE_INFO_ATTRIBUTE, "api.CreateInvoice"),
        )
        .unwrap();
    assert!(eventually(WAIT, || {
        queue.stats("billing-createinvoice").unwrap().failed >= 1
    }));
    queue.close();

    assert_eq!(queue.len("billing-createinvoice"), 1);
    assert_eq!(ledger.len(), 0);
}

// ============================================================================
// Test 6: Consumer context carries the publisher's correlation id
// ============================================================================

#[test]
fn consumer_runs_as_system_with_correlation_id() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let seen: Arc<Mutex<Option<(Option<String>, bool)>>> = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);

    let mut commands = queued(&queue, &ledger);
    commands
        .register_command_handler(
            CommandHandler::with_context(move |ctx: &InvocationContext, _: VoidInvoice| {
                *record.lock() = Some((
                    ctx.correlation_id().map(str::to_string),
                    ctx.is_system_invocation(),
                ));
                Ok(())
            }),
            OrganisationMember,
        )
        .unwrap();

    let ctx = InvocationContext::new().with_correlation_id("corr-99");
    commands
        .execute(&ctx, None, VoidInvoice { id: Uuid::new_v4() })
        .unwrap();

    assert!(eventually(WAIT, || seen.lock().is_some()));
    queue.close();

    assert_eq!(*seen.lock(), Some((Some("corr-99".to_string()), true)));
}

// ============================================================================
// Test 7: A panicking authorizer fails one delivery, not the consumer
// ============================================================================

#[test]
fn authorizer_panic_does_not_stop_consumer() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let checks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&checks);

    let mut commands = queued(&queue, &ledger);
    commands
        .register_command_handler(
            CommandHandler::with_store(create_invoice),
            move |_: &InvocationContext, _: Option<Uuid>| -> Result<(), DispatchError> {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("acl service unavailable");
                }
                Ok(())
            },
        )
        .unwrap();

    let ctx = InvocationContext::new();
    commands
        .execute(&ctx, None, CreateInvoice::new(Uuid::new_v4(), 10))
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    commands
        .execute(&ctx, None, CreateInvoice::new(Uuid::new_v4(), 20))
        .unwrap();

    assert!(eventually(WAIT, || ledger.len() == 2));
    assert!(eventually(WAIT, || queue.is_empty("billing-createinvoice")));
    queue.close();

    let stats = queue.stats("billing-createinvoice").unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.handled, 2);
}

// ============================================================================
// Test 8: Another type reusing a registered tag is refused before publishing
// ============================================================================

#[derive(Serialize, Payload)]
#[payload(name = "api.CreateInvoice")]
struct LegacyCreateInvoice {
    amount: u64,
}

#[test]
fn shared_tag_from_other_type_is_not_published() {
    let queue = fast_queue();
    let ledger = Arc::new(Ledger::default());
    let mut commands = queued(&queue, &ledger);
    commands
        .register_command_handler(CommandHandler::with_store(create_invoice), OrganisationMember)
        .unwrap();

    let err = commands
        .execute(&InvocationContext::new(), None, LegacyCreateInvoice { amount: 7 })
        .unwrap_err();

    assert!(matches!(err, DispatchError::Registration(_)));
    assert!(queue.queue_names().is_empty());
    queue.close();
    assert_eq!(ledger.len(), 0);
}
