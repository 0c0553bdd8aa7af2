use super::{establish, provider, ALICE, SERVICE, SERVICE_HOSTBASED};
use crate::{
    capability::{EngineFamily, SYM_DUPLICATE_CRED, SYM_UNWRAP_AEAD},
    mock::MockEngine,
    AcceptOptions, CredElement, CredStore, CredUsage, Credential, Error, InitOptions, Lifetime, Mech, NameType,
    Provider, RoutineError,
};

/// Service principal holding both a ticket and a key, so it can talk to itself.
fn self_provider(engine: MockEngine) -> Provider<MockEngine> {
    Provider::new(engine.with_ticket(SERVICE).with_keytab_entry(SERVICE))
}

fn service_credential(provider: &Provider<MockEngine>, usage: CredUsage) -> Credential<MockEngine> {
    let name = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    provider.acquire_credential(Some(&name), &[Mech::Krb5], usage, None).unwrap()
}

fn check_usage(provider: &Provider<MockEngine>, cred: &Credential<MockEngine>) {
    let usage = cred.usage();
    let as_initiator = establish(provider, InitOptions::new().credential(cred), AcceptOptions::new());
    assert_eq!(as_initiator.is_ok(), usage.can_initiate(), "initiating with {usage}");
    if let Err(err) = as_initiator {
        assert!(err.is(RoutineError::NoCred), "{err}");
    }
    let as_acceptor = establish(provider, InitOptions::new(), AcceptOptions::new().credential(cred));
    assert_eq!(as_acceptor.is_ok(), usage.can_accept(), "accepting with {usage}");
    if let Err(err) = as_acceptor {
        assert!(err.is(RoutineError::NoCred), "{err}");
    }
}

#[test]
fn usage_decides_which_role_a_credential_can_play() {
    let provider = self_provider(MockEngine::new());
    for usage in [CredUsage::Initiate, CredUsage::Accept, CredUsage::Both] {
        let cred = service_credential(&provider, usage);
        assert_eq!(cred.usage(), usage);
        assert_eq!(cred.inquire().unwrap().usage, usage);
        check_usage(&provider, &cred);
    }
    assert_eq!(provider.engine().live_handles(), 0);
    assert_eq!(provider.engine().double_releases(), 0);
}

#[test]
fn usage_matrix_holds_for_store_acquisition() {
    let engine = MockEngine::new()
        .with_ticket_in("MEMORY:svc", SERVICE)
        .with_keytab_entry_in("FILE:/etc/svc.keytab", SERVICE)
        // Default keytab for the peer side of each exchange.
        .with_keytab_entry(SERVICE)
        .with_ticket(SERVICE);
    let provider = Provider::new(engine);
    let store = CredStore::new().ccache("MEMORY:svc").server_keytab("FILE:/etc/svc.keytab");
    let name = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    for usage in [CredUsage::Initiate, CredUsage::Accept, CredUsage::Both] {
        let cred = provider
            .acquire_credential_from(Some(&name), &[Mech::Krb5], usage, None, &store)
            .unwrap();
        check_usage(&provider, &cred);
    }
}

#[test]
fn store_acquisition_reads_only_the_named_store() {
    let provider = Provider::new(MockEngine::new().with_ticket_in("MEMORY:bob", "bob@MOCK.REALM"));
    let err = provider
        .acquire_credential(None, &[], CredUsage::Initiate, None)
        .unwrap_err();
    assert!(matches!(err, Error::NoIdentity { usage: CredUsage::Initiate, .. }), "{err}");

    let store = CredStore::new().ccache("MEMORY:bob");
    let cred = provider
        .acquire_credential_from(None, &[], CredUsage::Initiate, None, &store)
        .unwrap();
    assert_eq!(cred.inquire().unwrap().name.as_deref(), Some("bob@MOCK.REALM"));
}

#[test]
fn missing_default_identity_is_reported_with_mechanism_text() {
    let provider = Provider::new(MockEngine::new());
    let err = provider
        .acquire_credential(None, &[Mech::Krb5], CredUsage::Initiate, None)
        .unwrap_err();
    match &err {
        Error::NoIdentity { usage, status } => {
            assert_eq!(*usage, CredUsage::Initiate);
            assert_eq!(status.routine, Some(RoutineError::NoCred));
        }
        other => panic!("expected NoIdentity, got {other:?}"),
    }
    assert_eq!(err.mech_errors(), ["No credentials cache found"]);
    assert!(err.to_string().starts_with("no initiate identity material available"));

    let err = provider
        .acquire_credential(None, &[Mech::Krb5], CredUsage::Accept, None)
        .unwrap_err();
    assert!(matches!(err, Error::NoIdentity { usage: CredUsage::Accept, .. }));
}

#[test]
fn cred_store_calls_need_their_symbols() {
    let provider = Provider::new(MockEngine::with_family(EngineFamily::Mit, &[]).with_ticket(ALICE));
    let store = CredStore::new().ccache("MEMORY:x");
    let err = provider
        .acquire_credential_from(None, &[], CredUsage::Initiate, None, &store)
        .unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");

    let mut cred = provider.acquire_credential(None, &[], CredUsage::Initiate, None).unwrap();
    let err = cred
        .add_from(CredElement::new(Mech::Spnego, CredUsage::Initiate), &store)
        .unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
    let err = cred
        .store_into(CredUsage::Initiate, None, true, false, &store)
        .unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
}

#[test]
fn accept_only_keytab_credential() {
    let provider = provider();
    let cred = provider
        .acquire_credential(None, &[Mech::Krb5], CredUsage::Accept, None)
        .unwrap();
    let info = cred.inquire().unwrap();
    assert_eq!(info.usage, CredUsage::Accept);
    assert_eq!(info.acceptor_expiry, Some(Lifetime::Indefinite));
    assert_eq!(info.initiator_expiry, None);
    assert_eq!(info.name, None);
    assert_eq!(info.mechs, [Mech::Krb5]);

    let (_client, server) = establish(&provider, InitOptions::new(), AcceptOptions::new().credential(&cred)).unwrap();
    assert!(server.is_established());
}

#[test]
fn initiator_credential_reports_finite_expiry() {
    let provider = provider();
    let cred = provider.acquire_credential(None, &[], CredUsage::Initiate, None).unwrap();
    let info = cred.inquire().unwrap();
    assert_eq!(info.name.as_deref(), Some(ALICE));
    assert_eq!(info.name_type, Some(NameType::Krb5Principal));
    assert!(matches!(info.initiator_expiry, Some(Lifetime::At(_))));
    assert_eq!(info.acceptor_expiry, None);
    let name = cred.name().unwrap().unwrap();
    assert_eq!(name.display().unwrap().0, ALICE);
}

#[test]
fn heimdal_usage_and_expiry_are_corrected() {
    let provider = self_provider(MockEngine::with_family(EngineFamily::Heimdal, &[SYM_DUPLICATE_CRED]));
    let cred = service_credential(&provider, CredUsage::Accept);
    assert_eq!(cred.inquire().unwrap().usage, CredUsage::Accept);

    let info = cred.inquire_by_mech(Mech::Krb5).unwrap();
    assert_eq!(info.usage, CredUsage::Accept);
    assert_eq!(info.acceptor_expiry, Some(Lifetime::Indefinite));
    assert_eq!(info.initiator_expiry, None);
    assert_eq!(info.mechs, [Mech::Krb5]);

    let err = cred.inquire_by_mech(Mech::Spnego).unwrap_err();
    assert!(err.is(RoutineError::BadMech), "{err}");
}

#[test]
fn heimdal_refuses_default_credential_for_both_usages() {
    let provider = self_provider(MockEngine::with_family(EngineFamily::Heimdal, &[SYM_DUPLICATE_CRED]));
    let calls = provider.engine().engine_calls();
    let err = provider.acquire_credential(None, &[], CredUsage::Both, None).unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
    assert_eq!(provider.engine().engine_calls(), calls);

    let cred = service_credential(&provider, CredUsage::Both);
    assert_eq!(cred.inquire().unwrap().usage, CredUsage::Both);
}

#[test]
fn unstable_default_name_is_unavailable() {
    let provider = Provider::new(
        MockEngine::with_family(EngineFamily::Heimdal, &[SYM_DUPLICATE_CRED, SYM_UNWRAP_AEAD]).with_ticket(ALICE),
    );
    let cred = provider.acquire_credential(None, &[], CredUsage::Initiate, None).unwrap();
    let name = cred.name().unwrap().unwrap();
    let err = name.display().unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
    assert!(name.export().unwrap_err().is(RoutineError::Unavailable));
    assert_eq!(cred.inquire().unwrap().name, None);

    let alice = provider.import_name(ALICE, NameType::Krb5Principal).unwrap();
    let named = provider
        .acquire_credential(Some(&alice), &[], CredUsage::Initiate, None)
        .unwrap();
    assert_eq!(named.name().unwrap().unwrap().display().unwrap().0, ALICE);
}

#[test]
fn add_extends_in_place() {
    let provider = self_provider(MockEngine::new());
    let mut cred = service_credential(&provider, CredUsage::Initiate);
    let live = provider.engine().live_handles();

    cred.add(CredElement::new(Mech::Spnego, CredUsage::Initiate)).unwrap();
    assert_eq!(cred.inquire().unwrap().mechs, [Mech::Krb5, Mech::Spnego]);
    assert_eq!(cred.usage(), CredUsage::Initiate);

    let name = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    cred.add(CredElement::new(Mech::Krb5, CredUsage::Accept).name(&name))
        .unwrap();
    assert_eq!(cred.usage(), CredUsage::Both);
    assert_eq!(cred.inquire().unwrap().usage, CredUsage::Both);
    check_usage(&provider, &cred);

    drop(name);
    assert_eq!(provider.engine().live_handles(), live);
}

#[test]
fn add_rejects_duplicate_elements() {
    let provider = self_provider(MockEngine::new());
    let mut cred = service_credential(&provider, CredUsage::Initiate);
    let err = cred
        .add(CredElement::new(Mech::Krb5, CredUsage::Initiate))
        .unwrap_err();
    assert!(err.is(RoutineError::DuplicateElement), "{err}");
    assert_eq!(cred.usage(), CredUsage::Initiate);
}

#[test]
fn add_to_new_leaves_the_original_alone() {
    let provider = self_provider(MockEngine::new());
    let cred = service_credential(&provider, CredUsage::Initiate);
    let wider = cred
        .add_to_new(CredElement::new(Mech::Spnego, CredUsage::Initiate))
        .unwrap();
    assert_eq!(cred.inquire().unwrap().mechs, [Mech::Krb5]);
    assert_eq!(wider.inquire().unwrap().mechs, [Mech::Krb5, Mech::Spnego]);
}

#[test]
fn heimdal_add_swaps_in_a_new_handle() {
    let provider = self_provider(MockEngine::with_family(EngineFamily::Heimdal, &[SYM_DUPLICATE_CRED]));
    let mut cred = service_credential(&provider, CredUsage::Initiate);
    let live = provider.engine().live_handles();
    cred.add(CredElement::new(Mech::Spnego, CredUsage::Initiate)).unwrap();
    assert_eq!(cred.inquire().unwrap().mechs, [Mech::Krb5, Mech::Spnego]);
    assert_eq!(provider.engine().live_handles(), live);
    assert_eq!(provider.engine().double_releases(), 0);
}

#[test]
fn defective_add_cred_is_unavailable() {
    let provider = self_provider(MockEngine::with_family(EngineFamily::Heimdal, &[]));
    let mut cred = service_credential(&provider, CredUsage::Initiate);
    let calls = provider.engine().engine_calls();
    let err = cred
        .add(CredElement::new(Mech::Spnego, CredUsage::Initiate))
        .unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
    assert!(cred
        .add_to_new(CredElement::new(Mech::Spnego, CredUsage::Initiate))
        .unwrap_err()
        .is(RoutineError::Unavailable));
    assert_eq!(provider.engine().engine_calls(), calls);
}

#[test]
fn store_into_writes_the_named_cache() {
    let provider = provider();
    let cred = provider.acquire_credential(None, &[], CredUsage::Initiate, None).unwrap();
    let store = CredStore::new().ccache("MEMORY:stash");

    let stored = cred
        .store_into(CredUsage::Initiate, None, false, false, &store)
        .unwrap();
    assert_eq!(stored.usage, CredUsage::Initiate);
    assert_eq!(stored.mechs, [Mech::Krb5]);
    assert_eq!(provider.engine().ccache_contents("MEMORY:stash"), [ALICE]);

    let err = cred
        .store_into(CredUsage::Initiate, None, false, false, &store)
        .unwrap_err();
    assert!(err.is(RoutineError::DuplicateElement), "{err}");
    cred.store_into(CredUsage::Initiate, Some(Mech::Krb5), true, false, &store)
        .unwrap();

    let from_stash = provider
        .acquire_credential_from(None, &[], CredUsage::Initiate, None, &store)
        .unwrap();
    assert_eq!(from_stash.inquire().unwrap().name.as_deref(), Some(ALICE));
}

#[test]
fn release_is_idempotent_and_released_credentials_are_refused() {
    let provider = provider();
    let mut cred = provider.acquire_credential(None, &[], CredUsage::Initiate, None).unwrap();
    cred.release().unwrap();
    cred.release().unwrap();
    assert!(cred.is_released());
    assert!(cred.inquire().unwrap_err().is(RoutineError::NoCred));

    let err = establish(&provider, InitOptions::new().credential(&cred), AcceptOptions::new()).unwrap_err();
    assert!(err.is(RoutineError::NoCred), "{err}");
    drop(cred);
    assert_eq!(provider.engine().live_handles(), 0);
    assert_eq!(provider.engine().double_releases(), 0);
}

#[test]
fn credentials_from_another_provider_are_refused() {
    let ours = provider();
    let theirs = provider();
    let foreign = theirs.acquire_credential(None, &[], CredUsage::Initiate, None).unwrap();
    let err = establish(&ours, InitOptions::new().credential(&foreign), AcceptOptions::new()).unwrap_err();
    assert!(err.is(RoutineError::DefectiveCredential), "{err}");
}

#[test]
fn per_thread_identity_setters_are_refused() {
    let provider = provider();
    let err = provider.register_acceptor_identity("FILE:/etc/krb5.keytab").unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
    let err = provider.set_ccache_name("MEMORY:x").unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
}
