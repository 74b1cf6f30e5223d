mod common;

use common::spawn_app;
use contact_service::models::{ContactOutcome, ProfileType, RequestStatus};
use contact_service::services::ContactError;

#[tokio::test]
async fn personal_request_then_accept_leaves_acceptor_list_unchanged() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;

    let outcome = app
        .contacts
        .create_contact(alice.id, bob.id, Some("Bobby"))
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::ContactRequestSent);

    let bob_requests = app.contacts.get_contact_requests(bob.id).await.unwrap();
    assert_eq!(bob_requests.pending.len(), 1);
    assert_eq!(bob_requests.pending[0].id, alice.id);
    assert_eq!(bob_requests.pending[0].username, alice.username);
    // The requester's chosen nickname is private to the requester.
    assert_eq!(bob_requests.pending[0].nickname, None);

    let alice_requests = app.contacts.get_contact_requests(alice.id).await.unwrap();
    assert_eq!(alice_requests.sent.len(), 1);
    assert_eq!(alice_requests.sent[0].nickname.as_deref(), Some("Bobby"));
    assert_eq!(alice_requests.sent[0].status, RequestStatus::Pending);

    let outcome = app
        .contacts
        .accept_contact_request(bob.id, alice.id)
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::ContactRequestAccepted);

    let bob_contacts = app.contacts.get_contacts(bob.id).await.unwrap();
    assert!(bob_contacts.contacts.iter().all(|c| c.id != alice.id));

    let bob_requests = app.contacts.get_contact_requests(bob.id).await.unwrap();
    assert!(bob_requests.pending.is_empty());
    let alice_requests = app.contacts.get_contact_requests(alice.id).await.unwrap();
    assert_eq!(alice_requests.sent[0].status, RequestStatus::Accepted);
}

#[tokio::test]
async fn repeated_request_reports_pending() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    let again = app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();

    assert_eq!(again, ContactOutcome::PendingRequestExists);
    assert_eq!(app.store.request_rows(alice.id, bob.id), 1);
}

#[tokio::test]
async fn declined_request_is_superseded_by_a_new_one() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;

    app.contacts
        .create_contact(alice.id, bob.id, Some("first"))
        .await
        .unwrap();
    let outcome = app
        .contacts
        .reject_contact_request(bob.id, alice.id)
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::ContactRequestDeclined);

    let sent = app.contacts.get_contact_requests(alice.id).await.unwrap().sent;
    assert_eq!(sent[0].status, RequestStatus::Declined);

    let outcome = app
        .contacts
        .create_contact(alice.id, bob.id, Some("second"))
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::ContactRequestSent);
    assert_eq!(app.store.request_rows(alice.id, bob.id), 1);

    let sent = app.contacts.get_contact_requests(alice.id).await.unwrap().sent;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, RequestStatus::Pending);
    assert_eq!(sent[0].nickname.as_deref(), Some("second"));
}

#[tokio::test]
async fn resolving_twice_is_a_conflict() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;

    assert!(matches!(
        app.contacts.accept_contact_request(bob.id, alice.id).await,
        Err(ContactError::NotFound("pending_request_not_found"))
    ));

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    app.contacts
        .accept_contact_request(bob.id, alice.id)
        .await
        .unwrap();

    assert!(matches!(
        app.contacts.accept_contact_request(bob.id, alice.id).await,
        Err(ContactError::Conflict("request_already_processed"))
    ));
    assert!(matches!(
        app.contacts.reject_contact_request(bob.id, alice.id).await,
        Err(ContactError::Conflict("request_already_processed"))
    ));
}

#[tokio::test]
async fn concurrent_accepts_resolve_once() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;
    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();

    let (first, second) = tokio::join!(
        app.contacts.accept_contact_request(bob.id, alice.id),
        app.contacts.reject_contact_request(bob.id, alice.id),
    );

    let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser,
        Err(ContactError::Conflict("request_already_processed"))
    ));
}

#[tokio::test]
async fn undo_withdraws_only_pending_requests() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    let outcome = app
        .contacts
        .undo_contact_request(alice.id, bob.id)
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::ContactRequestUndone);
    assert_eq!(app.store.request_rows(alice.id, bob.id), 0);

    assert!(matches!(
        app.contacts.undo_contact_request(alice.id, bob.id).await,
        Err(ContactError::NotFound("pending_request_not_found"))
    ));
    assert!(matches!(
        app.contacts.accept_contact_request(bob.id, alice.id).await,
        Err(ContactError::NotFound("pending_request_not_found"))
    ));

    // A resolved request can no longer be withdrawn.
    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    app.contacts
        .reject_contact_request(bob.id, alice.id)
        .await
        .unwrap();
    assert!(matches!(
        app.contacts.undo_contact_request(alice.id, bob.id).await,
        Err(ContactError::NotFound("pending_request_not_found"))
    ));
    assert_eq!(app.store.request_rows(alice.id, bob.id), 1);
}

#[tokio::test]
async fn pending_entries_show_the_receivers_own_nickname() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;

    app.contacts
        .create_contact(bob.id, alice.id, Some("Ally"))
        .await
        .unwrap();
    app.contacts
        .create_contact(alice.id, bob.id, Some("B"))
        .await
        .unwrap();

    let pending = app.contacts.get_contact_requests(bob.id).await.unwrap().pending;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].nickname.as_deref(), Some("Ally"));
}

#[tokio::test]
async fn pending_list_is_newest_first() {
    let app = spawn_app();
    let bob = app.create_user("Bob", ProfileType::Personal).await;
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let carol = app.create_user("Carol", ProfileType::Personal).await;

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    app.contacts.create_contact(carol.id, bob.id, None).await.unwrap();

    let pending = app.contacts.get_contact_requests(bob.id).await.unwrap().pending;
    let ids: Vec<_> = pending.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![carol.id, alice.id]);
}
