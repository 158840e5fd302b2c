//! Command execution: single handler, authorization, panic containment.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cqrs_mediator::{
    AllowEveryone, CommandExecutor, CommandHandler, DispatchError, HandlerError,
    InvocationContext, OrganisationMember, Uuid,
};

use crate::support::{create_account, AccountStore, CloseAccount, CreateAccount};

fn executor() -> CommandExecutor<AccountStore> {
    CommandExecutor::new(Arc::new(AccountStore::default()))
}

// ============================================================================
// Test 1: Command reaches its handler with the store
// ============================================================================

#[test]
fn execute_creates_account() {
    let mut commands = executor();
    commands
        .register_command_handler(CommandHandler::with_store(create_account), AllowEveryone)
        .unwrap();

    let org = Uuid::new_v4();
    let cmd = CreateAccount::new(org, "Acme");
    let id = cmd.id;
    commands.execute(&InvocationContext::new(), Some(org), cmd).unwrap();

    let account = commands.store().find(id).unwrap();
    assert_eq!(account.name, "Acme");
    assert_eq!(account.organisation_id, org);
}

// ============================================================================
// Test 2: Only one handler per command type
// ============================================================================

#[test]
fn second_registration_is_rejected() {
    let mut commands = executor();
    commands
        .register_command_handler(CommandHandler::with_store(create_account), AllowEveryone)
        .unwrap();

    let err = commands
        .register_command_handler(CommandHandler::with_store(create_account), AllowEveryone)
        .unwrap_err();

    assert!(matches!(err, DispatchError::Registration(_)));
    assert_eq!(
        err.to_string(),
        "handler already registered for api.CreateAccount only one handler allowed per command"
    );
}

// ============================================================================
// Test 3: Unregistered command type
// ============================================================================

#[test]
fn unregistered_command_names_its_type() {
    let commands = executor();
    let err = commands
        .execute(&InvocationContext::new(), None, CloseAccount { id: Uuid::new_v4() })
        .unwrap_err();

    assert!(matches!(err, DispatchError::Lookup(_)));
    assert!(err.to_string().contains("CloseAccount"));
}

// ============================================================================
// Test 4: A panicking handler becomes a HandlerError
// ============================================================================

#[test]
fn panic_is_contained() {
    let mut commands = executor();
    commands
        .register_command_handler(
            CommandHandler::new(|cmd: CloseAccount| -> Result<(), HandlerError> {
                panic!("ledger for {} is corrupt", cmd.id)
            }),
            AllowEveryone,
        )
        .unwrap();

    let id = Uuid::new_v4();
    let err = commands
        .execute(&InvocationContext::new(), None, CloseAccount { id })
        .unwrap_err();

    let DispatchError::Handler(handler_err) = &err else {
        panic!("expected handler error, got {err:?}");
    };
    assert!(handler_err.is_panic());
    assert_eq!(
        err.to_string(),
        format!("handler for 'CloseAccount' encountered a panic: ledger for {} is corrupt", id)
    );

    // The executor is still usable afterwards.
    let again = commands.execute(&InvocationContext::new(), None, CloseAccount { id });
    assert!(again.is_err());
}

// ============================================================================
// Test 5: Handler errors come back unchanged
// ============================================================================

#[test]
fn handler_rejection_is_returned() {
    let mut commands = executor();
    commands
        .register_command_handler(CommandHandler::with_store(create_account), AllowEveryone)
        .unwrap();

    let err = commands
        .execute(
            &InvocationContext::new(),
            None,
            CreateAccount::new(Uuid::new_v4(), "  "),
        )
        .unwrap_err();

    assert_eq!(err.to_string(), "rejected: account name is required");
    assert_eq!(commands.store().len(), 0);
}

// ============================================================================
// Test 6: Organisation authorization
// ============================================================================

#[test]
fn organisation_member_guards_the_handler() {
    let mut commands = executor();
    commands
        .register_command_handler(
            CommandHandler::with_store(create_account),
            OrganisationMember,
        )
        .unwrap();

    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();
    let caller_b = InvocationContext::new().with_organisations([org_b]);

    let err = commands
        .execute(&caller_b, Some(org_a), CreateAccount::new(org_a, "Acme"))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Permission(_)));
    assert_eq!(commands.store().len(), 0);

    let caller_a = InvocationContext::new().with_organisations([org_a]);
    commands
        .execute(&caller_a, Some(org_a), CreateAccount::new(org_a, "Acme"))
        .unwrap();

    commands
        .execute(&InvocationContext::system(), None, CreateAccount::new(org_b, "Globex"))
        .unwrap();
    assert_eq!(commands.store().len(), 2);
}

// ============================================================================
// Test 7: Context handler sees caller data and its own name
// ============================================================================

#[test]
fn context_and_store_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let mut commands = executor();
    commands
        .register_command_handler(
            CommandHandler::with_context_and_store(
                move |ctx: &InvocationContext, store: &AccountStore, cmd: CreateAccount| {
                    assert_eq!(ctx.caller_id(), Some("user-7"));
                    assert_eq!(ctx.handler_name(), Some("accounts.create"));
                    seen.fetch_add(1, Ordering::SeqCst);
                    create_account(store, cmd)
                },
            )
            .named("accounts.create"),
            AllowEveryone,
        )
        .unwrap();

    let ctx = InvocationContext::new().with_caller("user-7");
    commands
        .execute(&ctx, None, CreateAccount::new(Uuid::new_v4(), "Initech"))
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.handler_name(), None);
}
