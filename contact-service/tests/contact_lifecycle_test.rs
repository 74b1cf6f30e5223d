mod common;

use common::spawn_app;
use contact_service::models::{ContactOutcome, ProfileType};
use contact_service::services::{ContactError, ForbiddenReason};
use uuid::Uuid;

#[tokio::test]
async fn public_contact_creation_is_idempotent() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Personal).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;

    let first = app
        .contacts
        .create_contact(alice.id, bob.id, Some("Bobby"))
        .await
        .unwrap();
    assert_eq!(first, ContactOutcome::PublicContactAdded);

    let second = app
        .contacts
        .create_contact(alice.id, bob.id, Some("Other"))
        .await
        .unwrap();
    assert_eq!(second, ContactOutcome::AlreadyInContacts);
    assert_eq!(app.store.contact_count(alice.id), 1);

    let list = app.contacts.get_contacts(alice.id).await.unwrap();
    assert_eq!(list.contacts.len(), 1);
    assert_eq!(list.contacts[0].nickname.as_deref(), Some("Bobby"));
    assert_eq!(list.contacts[0].username, bob.username);
    assert!(!list.contacts[0].is_mutual);
}

#[tokio::test]
async fn every_operation_rejects_self_targets() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let me = alice.id;

    assert!(matches!(
        app.contacts.create_contact(me, me, None).await,
        Err(ContactError::SelfAction)
    ));
    assert!(matches!(
        app.contacts.accept_contact_request(me, me).await,
        Err(ContactError::SelfAction)
    ));
    assert!(matches!(
        app.contacts.reject_contact_request(me, me).await,
        Err(ContactError::SelfAction)
    ));
    assert!(matches!(
        app.contacts.undo_contact_request(me, me).await,
        Err(ContactError::SelfAction)
    ));
    assert!(matches!(
        app.contacts.delete_contacts(me, &[Uuid::new_v4(), me]).await,
        Err(ContactError::SelfAction)
    ));
    assert!(matches!(
        app.contacts.update_contact_nickname(me, me, Some("me")).await,
        Err(ContactError::SelfAction)
    ));
    assert!(matches!(
        app.contacts.remove_contact_nickname(me, me).await,
        Err(ContactError::SelfAction)
    ));
    assert_eq!(app.store.contact_count(me), 0);
}

#[tokio::test]
async fn mutuality_is_derived_from_both_edges() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    app.contacts
        .create_contact(bob.id, alice.id, Some("Al"))
        .await
        .unwrap();

    let alice_view = app.contacts.get_contacts(alice.id).await.unwrap();
    assert!(alice_view.contacts[0].is_mutual);
    assert_eq!(alice_view.people_who_added_you.len(), 1);
    assert!(alice_view.people_who_added_you[0].is_mutual);
    // Alice never set a nickname for Bob, so the reverse entry carries none.
    assert_eq!(alice_view.people_who_added_you[0].nickname, None);

    let bob_view = app.contacts.get_contacts(bob.id).await.unwrap();
    assert_eq!(bob_view.people_who_added_you[0].nickname.as_deref(), Some("Al"));

    let outcome = app.contacts.delete_contacts(bob.id, &[alice.id]).await.unwrap();
    assert_eq!(outcome, ContactOutcome::ContactDeleted);

    let alice_view = app.contacts.get_contacts(alice.id).await.unwrap();
    assert!(!alice_view.contacts[0].is_mutual);
    assert!(alice_view.people_who_added_you.is_empty());
}

#[tokio::test]
async fn delete_reports_partial_removal() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;
    let carol = app.create_user("Carol", ProfileType::Public).await;

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    app.contacts.create_contact(alice.id, carol.id, None).await.unwrap();

    let outcome = app
        .contacts
        .delete_contacts(alice.id, &[bob.id, bob.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ContactOutcome::ContactsDeletedPartial {
            removed: 1,
            requested: 2
        }
    );
    assert_eq!(outcome.as_str(), "contacts_deleted_partial");

    let outcome = app.contacts.delete_contacts(alice.id, &[carol.id]).await.unwrap();
    assert_eq!(outcome, ContactOutcome::ContactDeleted);

    let outcome = app.contacts.delete_contacts(alice.id, &[carol.id]).await.unwrap();
    assert!(matches!(
        outcome,
        ContactOutcome::ContactsDeletedPartial { removed: 0, .. }
    ));

    assert!(matches!(
        app.contacts.delete_contacts(alice.id, &[]).await,
        Err(ContactError::BadRequest("invalid_request_payload"))
    ));
}

#[tokio::test]
async fn delete_many_reports_full_removal() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;
    let carol = app.create_user("Carol", ProfileType::Public).await;

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();
    app.contacts.create_contact(alice.id, carol.id, None).await.unwrap();

    let outcome = app
        .contacts
        .delete_contacts(alice.id, &[bob.id, carol.id])
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::ContactsDeleted);
    assert_eq!(app.store.contact_count(alice.id), 0);
}

#[tokio::test]
async fn forbidden_reasons_are_checked_in_order() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;
    let private = app.create_user("Pat", ProfileType::Private).await;

    let forbidden = |r: Result<ContactOutcome, ContactError>| match r {
        Err(ContactError::Forbidden(reason)) => reason,
        other => panic!("expected forbidden, got {other:?}"),
    };

    assert_eq!(
        forbidden(app.contacts.create_contact(alice.id, private.id, None).await),
        ForbiddenReason::UserPrivateProfile
    );

    app.store.block(bob.id, alice.id);
    assert_eq!(
        forbidden(app.contacts.create_contact(alice.id, bob.id, None).await),
        ForbiddenReason::UserBlockedYou
    );
    assert_eq!(
        forbidden(app.contacts.create_contact(bob.id, alice.id, None).await),
        ForbiddenReason::YouBlockedUser
    );

    app.store.set_admin_blocked(bob.id, true);
    assert_eq!(
        forbidden(app.contacts.create_contact(alice.id, bob.id, None).await),
        ForbiddenReason::UserAdminBlocked
    );
    assert_eq!(
        forbidden(app.contacts.create_contact(bob.id, alice.id, None).await),
        ForbiddenReason::SelfAdminBlocked
    );
    assert_eq!(app.store.contact_count(alice.id), 0);
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;

    assert!(matches!(
        app.contacts.create_contact(alice.id, Uuid::new_v4(), None).await,
        Err(ContactError::NotFound("user_not_found"))
    ));
}

#[tokio::test]
async fn existence_check_hides_private_ids_and_self() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Personal).await;
    let pat = app.create_user("Pat", ProfileType::Private).await;

    let found = app
        .contacts
        .check_contact_existence(alice.id, &format!("  {} ", bob.username))
        .await
        .unwrap();
    assert!(found.exists);
    assert_eq!(found.profile_type, Some(ProfileType::Personal));
    assert_eq!(found.recipient_user_id, Some(bob.id));

    let private = app
        .contacts
        .check_contact_existence(alice.id, &pat.username)
        .await
        .unwrap();
    assert!(private.exists);
    assert_eq!(private.profile_type, Some(ProfileType::Private));
    assert_eq!(private.recipient_user_id, None);

    let own = app
        .contacts
        .check_contact_existence(alice.id, &alice.username)
        .await
        .unwrap();
    assert!(!own.exists);

    let missing = app
        .contacts
        .check_contact_existence(alice.id, "ZZZZ000000")
        .await
        .unwrap();
    assert!(!missing.exists);
    assert_eq!(missing.recipient_user_id, None);
}

#[tokio::test]
async fn nickname_update_and_removal() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;

    assert!(matches!(
        app.contacts
            .update_contact_nickname(alice.id, bob.id, Some("B"))
            .await,
        Err(ContactError::NotFound("contact_not_found"))
    ));

    app.contacts.create_contact(alice.id, bob.id, None).await.unwrap();

    let outcome = app
        .contacts
        .update_contact_nickname(alice.id, bob.id, Some("  Bobby  "))
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::NicknameUpdated);
    let list = app.contacts.get_contacts(alice.id).await.unwrap();
    assert_eq!(list.contacts[0].nickname.as_deref(), Some("Bobby"));

    let too_long = "x".repeat(41);
    assert!(matches!(
        app.contacts
            .update_contact_nickname(alice.id, bob.id, Some(&too_long))
            .await,
        Err(ContactError::BadRequest("invalid_nickname_length"))
    ));

    let outcome = app
        .contacts
        .remove_contact_nickname(alice.id, bob.id)
        .await
        .unwrap();
    assert_eq!(outcome, ContactOutcome::NicknameRemoved);
    let list = app.contacts.get_contacts(alice.id).await.unwrap();
    assert_eq!(list.contacts[0].nickname, None);
}

#[tokio::test]
async fn store_outage_surfaces_as_internal() {
    let app = spawn_app();
    let alice = app.create_user("Alice", ProfileType::Public).await;
    let bob = app.create_user("Bob", ProfileType::Public).await;

    app.store.set_unavailable(true);
    assert!(matches!(
        app.contacts.create_contact(alice.id, bob.id, None).await,
        Err(ContactError::Internal(_))
    ));
    assert!(matches!(
        app.contacts.get_contacts(alice.id).await,
        Err(ContactError::Internal(_))
    ));

    app.store.set_unavailable(false);
    assert_eq!(
        app.contacts.create_contact(alice.id, bob.id, None).await.unwrap(),
        ContactOutcome::PublicContactAdded
    );
}
