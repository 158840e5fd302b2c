//! Query execution and organisation-scoped result filtering.

use std::sync::Arc;

use cqrs_mediator::{
    DispatchError, InvocationContext, QueryExecutor, QueryHandler, ResultFilter, Uuid,
};

use crate::support::{account, get_account, list_accounts, Account, AccountStore, GetAccount, ListAccounts};

struct Fixture {
    queries: QueryExecutor<AccountStore>,
    org_a: Uuid,
    org_b: Uuid,
    accounts: Vec<Account>,
}

fn fixture() -> Fixture {
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();
    let accounts = vec![
        account(org_a, "a-1"),
        account(org_b, "b-1"),
        account(org_a, "a-2"),
        account(org_b, "b-2"),
        account(org_a, "a-3"),
    ];

    let mut queries = QueryExecutor::new(Arc::new(AccountStore::with_accounts(accounts.clone())));
    queries
        .register_query(QueryHandler::with_store(get_account), ResultFilter::organisation())
        .unwrap();
    queries
        .register_query(QueryHandler::with_store(list_accounts), ResultFilter::organisation())
        .unwrap();

    Fixture {
        queries,
        org_a,
        org_b,
        accounts,
    }
}

// ============================================================================
// Single results
// ============================================================================

#[test]
fn single_result_from_foreign_organisation_is_denied() {
    let f = fixture();
    let caller_b = InvocationContext::new().with_organisations([f.org_b]);

    let mut output: Option<Account> = Some(f.accounts[1].clone());
    let err = f
        .queries
        .execute_into(&caller_b, GetAccount { id: f.accounts[0].id }, &mut output)
        .unwrap_err();

    assert!(matches!(err, DispatchError::Permission(_)));
    assert_eq!(
        err.to_string(),
        format!("user does not have access to result for organisation id: {}", f.org_a)
    );
    assert_eq!(output, None);
}

#[test]
fn single_result_for_own_organisation_is_unchanged() {
    let f = fixture();
    let caller_a = InvocationContext::new().with_organisations([f.org_a]);

    let found: Option<Account> = f
        .queries
        .execute(&caller_a, GetAccount { id: f.accounts[0].id })
        .unwrap();
    assert_eq!(found.as_ref(), Some(&f.accounts[0]));

    let system: Option<Account> = f
        .queries
        .execute(&InvocationContext::system(), GetAccount { id: f.accounts[0].id })
        .unwrap();
    assert_eq!(system, found);
}

#[test]
fn missing_result_skips_the_filter() {
    let f = fixture();

    // No organisations in the context: the filter would fail if it ran.
    let mut output: Option<Account> = Some(f.accounts[0].clone());
    f.queries
        .execute_into(
            &InvocationContext::new(),
            GetAccount { id: Uuid::new_v4() },
            &mut output,
        )
        .unwrap();
    assert_eq!(output, None);
}

#[test]
fn no_acls_in_context() {
    let f = fixture();
    let err = f
        .queries
        .execute::<_, Account>(&InvocationContext::new(), GetAccount { id: f.accounts[0].id })
        .unwrap_err();
    assert!(matches!(err, DispatchError::Lookup(ref m) if m == "no acls found in context"));
}

// ============================================================================
// Sequences
// ============================================================================

#[test]
fn sequence_is_narrowed_in_order() {
    let f = fixture();
    let caller_a = InvocationContext::new().with_organisations([f.org_a]);

    let visible: Vec<Account> = f
        .queries
        .execute(&caller_a, ListAccounts)
        .unwrap()
        .unwrap();

    let names: Vec<&str> = visible.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a-1", "a-2", "a-3"]);
}

#[test]
fn empty_subset_is_not_an_error() {
    let f = fixture();
    let stranger = InvocationContext::new().with_organisations([Uuid::new_v4()]);

    let visible: Option<Vec<Account>> = f.queries.execute(&stranger, ListAccounts).unwrap();
    assert_eq!(visible, Some(Vec::new()));
}

#[test]
fn system_sees_every_organisation() {
    let f = fixture();
    let all: Option<Vec<Account>> = f
        .queries
        .execute(&InvocationContext::system(), ListAccounts)
        .unwrap();
    assert_eq!(all.unwrap(), f.accounts);
}

// ============================================================================
// Lookup by (criteria, result) pair
// ============================================================================

#[test]
fn unknown_result_shape_for_known_criteria() {
    let f = fixture();
    let err = f
        .queries
        .execute::<_, String>(&InvocationContext::system(), ListAccounts)
        .unwrap_err();

    assert!(matches!(err, DispatchError::Lookup(_)));
    assert!(err
        .to_string()
        .starts_with("found queries accepting criteria ListAccounts but none returning result"));
}

#[test]
fn second_shape_for_same_criteria() {
    let mut f = fixture();
    f.queries
        .register_query(
            QueryHandler::with_store(|store: &AccountStore, _: ListAccounts| Ok(Some(store.len()))),
            ResultFilter::none(),
        )
        .unwrap();

    let count: Option<usize> = f
        .queries
        .execute(&InvocationContext::new(), ListAccounts)
        .unwrap();
    assert_eq!(count, Some(5));

    let err = f
        .queries
        .register_query(QueryHandler::with_store(list_accounts), ResultFilter::none())
        .unwrap_err();
    assert!(matches!(err, DispatchError::Registration(_)));
}
