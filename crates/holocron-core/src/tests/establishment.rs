use super::{establish, provider, ALICE, SERVICE, SERVICE_HOSTBASED};
use crate::{
    capability::EngineFamily,
    mock::{MockEngine, PEER_DELETE_TOKEN},
    AcceptOptions, ChannelBinding, ContextFlags, ContextState, CredUsage, GssAddress, InitOptions, Lifetime, Mech,
    NameType, Provider, RoutineError, QOP_DEFAULT,
};

#[test]
fn mutual_authentication_takes_two_rounds() {
    let provider = provider();
    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    let mut client = provider
        .init_sec_context(&target, InitOptions::new().request(ContextFlags::MUTUAL))
        .unwrap();
    let mut server = provider.accept_sec_context(AcceptOptions::new());
    assert_eq!(client.state(), ContextState::Unestablished);
    assert!(client.continue_needed());

    let first = client.step(&[]).unwrap();
    assert_eq!(client.state(), ContextState::Continuing);
    assert!(!first.info.fully_established);
    assert!(first.info.locally_initiated);
    let request = first.token.expect("initiator sends a token first");

    let accepted = server.step(&request).unwrap();
    assert!(server.is_established());
    assert!(!server.continue_needed());
    assert!(!accepted.info.locally_initiated);
    assert!(accepted.info.flags.contains(ContextFlags::MUTUAL));
    assert!(accepted.info.protection_ready && accepted.info.transferable);
    assert!(!accepted.info.channel_bound);
    assert!(!accepted.info.flags.intersects(ContextFlags::PROT_READY | ContextFlags::TRANS));
    assert_eq!(accepted.info.mech, Some(Mech::Krb5));
    assert!(matches!(accepted.info.expires_at, Lifetime::At(_)));
    let reply = accepted.token.expect("mutual authentication needs a reply");

    let last = client.step(&reply).unwrap();
    assert!(last.token.is_none());
    assert!(last.info.fully_established);
    assert!(client.is_established());
    assert!(client.is_initiator() && !server.is_initiator());

    let initiator = server.initiator_name().expect("acceptor learns the initiator");
    assert!(initiator.is_mechanism_name());
    assert_eq!(initiator.display().unwrap().0, ALICE);
}

#[test]
fn without_mutual_the_initiator_finishes_first() {
    let provider = provider();
    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    let mut client = provider.init_sec_context(&target, InitOptions::new()).unwrap();
    let step = client.step(&[]).unwrap();
    assert!(client.is_established());
    assert!(!step.info.flags.contains(ContextFlags::MUTUAL));

    let mut server = provider.accept_sec_context(AcceptOptions::new());
    let step = server.step(&step.token.unwrap()).unwrap();
    assert!(step.token.is_none());
    assert!(server.is_established());
}

#[test]
fn established_and_deleted_contexts_cannot_step() {
    let provider = provider();
    let (mut client, mut server) = establish(&provider, InitOptions::new(), AcceptOptions::new()).unwrap();
    let err = client.step(&[]).unwrap_err();
    assert!(err.is(RoutineError::Failure), "{err}");

    server.delete().unwrap();
    assert_eq!(server.state(), ContextState::Deleted);
    assert!(!server.continue_needed());
    let err = server.step(b"anything").unwrap_err();
    assert!(err.is(RoutineError::NoContext), "{err}");
}

#[test]
fn delete_is_idempotent_and_releases_everything() {
    let provider = provider();
    let (mut client, mut server) = establish(
        &provider,
        InitOptions::new().request(ContextFlags::MUTUAL | ContextFlags::DELEG),
        AcceptOptions::new(),
    )
    .unwrap();
    assert!(server.initiator_name().is_some());
    assert!(server.delegated_credential().is_some());

    assert!(client.delete().unwrap().is_empty());
    client.delete().unwrap();
    server.delete().unwrap();
    server.delete().unwrap();
    assert!(server.initiator_name().is_none());
    assert!(server.delegated_credential().is_none());
    assert!(client.target_name().is_none());

    for result in [client.wrap(b"m", true, QOP_DEFAULT).map(|_| ()), client.process_token(b"x")] {
        assert!(result.unwrap_err().is(RoutineError::NoContext));
    }
    assert!(server.expires_at().unwrap_err().is(RoutineError::NoContext));
    assert!(server.inquire().unwrap_err().is(RoutineError::NoContext));

    drop((client, server));
    assert_eq!(provider.engine().live_handles(), 0);
    assert_eq!(provider.engine().double_releases(), 0);
}

#[test]
fn dropping_established_contexts_leaks_nothing() {
    let provider = provider();
    for _ in 0..3 {
        let (client, server) = establish(
            &provider,
            InitOptions::new().request(ContextFlags::MUTUAL | ContextFlags::DELEG),
            AcceptOptions::new(),
        )
        .unwrap();
        assert!(client.is_established() && server.is_established());
    }
    assert_eq!(provider.engine().live_handles(), 0);
    assert_eq!(provider.engine().double_releases(), 0);
}

#[test]
fn delegated_credential_outlives_its_context() {
    let provider = provider();
    let (_client, mut server) = establish(
        &provider,
        InitOptions::new().request(ContextFlags::DELEG),
        AcceptOptions::new(),
    )
    .unwrap();
    let delegated = server.take_delegated_credential().expect("delegation was requested");
    drop(server);
    assert_eq!(delegated.usage(), CredUsage::Initiate);
    assert_eq!(delegated.inquire().unwrap().name.as_deref(), Some(ALICE));

    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    let mut onward = provider
        .init_sec_context(&target, InitOptions::new().credential(&delegated))
        .unwrap();
    assert!(onward.step(&[]).unwrap().token.is_some());
}

#[test]
fn inquire_reports_both_peers() {
    let provider = provider();
    let (mut client, mut server) = establish(
        &provider,
        InitOptions::new().request(ContextFlags::MUTUAL | ContextFlags::REPLAY),
        AcceptOptions::new(),
    )
    .unwrap();
    let info = server.inquire().unwrap();
    assert_eq!(info.mech, Mech::Krb5);
    assert!(!info.locally_initiated);
    assert!(info.fully_established);
    assert!(info.protection_ready);
    assert!(info.flags.contains(ContextFlags::REPLAY));
    assert_eq!(info.initiator_name.unwrap().display().unwrap().0, ALICE);
    assert_eq!(info.acceptor_name.unwrap().display().unwrap().0, SERVICE);

    let info = client.inquire().unwrap();
    assert!(info.locally_initiated);
    assert!(matches!(info.expires_at, Lifetime::At(_)));
    assert_eq!(client.mech(), Some(Mech::Krb5));
}

#[test]
fn inquire_defaults_missing_mech_on_apple() {
    let provider = Provider::new(
        MockEngine::with_family(EngineFamily::Apple, &[])
            .with_ticket(ALICE)
            .with_keytab_entry(SERVICE),
    );
    let (_client, mut server) = establish(&provider, InitOptions::new(), AcceptOptions::new()).unwrap();
    assert_eq!(server.inquire().unwrap().mech, Mech::Krb5);
}

#[test]
fn requested_mech_is_visible_before_the_first_round() {
    let provider = provider();
    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    let mut client = provider
        .init_sec_context(&target, InitOptions::new().mech(Mech::Spnego))
        .unwrap();
    assert_eq!(client.mech(), Some(Mech::Spnego));
    assert_eq!(client.step(&[]).unwrap().info.mech, Some(Mech::Spnego));

    let mut client = provider
        .init_sec_context(&target, InitOptions::new().mech(Mech::Ntlmssp))
        .unwrap();
    let err = client.step(&[]).unwrap_err();
    assert!(err.is(RoutineError::BadMech), "{err}");
    assert_eq!(client.state(), ContextState::Unestablished);
}

#[test]
fn garbage_token_leaves_acceptor_unestablished() {
    let provider = provider();
    let mut server = provider.accept_sec_context(AcceptOptions::new());
    let err = server.step(b"not a token").unwrap_err();
    assert!(err.is(RoutineError::DefectiveToken), "{err}");
    assert_eq!(err.mech_errors(), ["Token is malformed"]);
    assert_eq!(server.state(), ContextState::Unestablished);
    assert_eq!(provider.engine().live_handles(), 0);
}

#[test]
fn acceptor_without_a_key_fails() {
    let provider = Provider::new(MockEngine::new().with_ticket(ALICE));
    let err = establish(&provider, InitOptions::new(), AcceptOptions::new()).unwrap_err();
    assert!(err.is(RoutineError::NoCred), "{err}");
}

#[test]
fn acceptor_credential_for_another_service_fails() {
    let other = "ldap/dc.example@MOCK.REALM";
    let provider = Provider::new(
        MockEngine::new()
            .with_ticket(ALICE)
            .with_keytab_entry(SERVICE)
            .with_keytab_entry(other),
    );
    let name = provider.import_name(other, NameType::Krb5Principal).unwrap();
    let cred = provider
        .acquire_credential(Some(&name), &[], CredUsage::Accept, None)
        .unwrap();
    let err = establish(&provider, InitOptions::new(), AcceptOptions::new().credential(&cred)).unwrap_err();
    assert!(err.is(RoutineError::Failure), "{err}");
    assert_eq!(err.mech_errors(), ["Wrong principal in request"]);
}

struct Exchange {
    server_bound: bool,
    client_bound: bool,
}

fn exchange_with_bindings(
    initiator: Option<ChannelBinding>,
    acceptor: Option<ChannelBinding>,
) -> crate::Result<Exchange> {
    let provider = provider();
    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService)?;
    let mut init = InitOptions::new().request(ContextFlags::MUTUAL);
    if let Some(cb) = initiator {
        init = init.channel_binding(cb);
    }
    let mut accept = AcceptOptions::new();
    if let Some(cb) = acceptor {
        accept = accept.channel_binding(cb);
    }
    let mut client = provider.init_sec_context(&target, init)?;
    let mut server = provider.accept_sec_context(accept);
    let request = client.step(&[])?.token.unwrap_or_default();
    let accepted = server.step(&request)?;
    let last = client.step(&accepted.token.unwrap_or_default())?;
    Ok(Exchange {
        server_bound: accepted.info.channel_bound,
        client_bound: last.info.channel_bound,
    })
}

#[test]
fn channel_binding_outcomes() {
    let tls = || ChannelBinding::new(b"tls-server-end-point:abc".to_vec());

    let none = exchange_with_bindings(None, None).unwrap();
    assert!(!none.server_bound && !none.client_bound);

    let initiator_only = exchange_with_bindings(Some(tls()), None).unwrap();
    assert!(!initiator_only.server_bound && !initiator_only.client_bound);

    let acceptor_only = exchange_with_bindings(None, Some(tls())).unwrap();
    assert!(!acceptor_only.server_bound && !acceptor_only.client_bound);

    let matching = exchange_with_bindings(Some(tls()), Some(tls())).unwrap();
    assert!(matching.server_bound && matching.client_bound);

    let err = exchange_with_bindings(Some(tls()), Some(ChannelBinding::new(b"other".to_vec()))).err();
    assert!(err.is_some_and(|err| err.is(RoutineError::BadBindings)));
}

#[test]
fn channel_binding_addresses_take_part_in_matching() {
    let data = b"tls-unique".to_vec();
    let bound = ChannelBinding::new(data.clone()).with_addresses(
        GssAddress::Inet([10, 0, 0, 1].into()),
        GssAddress::Inet([10, 0, 0, 2].into()),
    );
    let matching = exchange_with_bindings(Some(bound.clone()), Some(bound.clone())).unwrap();
    assert!(matching.server_bound);

    let err = exchange_with_bindings(Some(bound), Some(ChannelBinding::new(data))).err();
    assert!(err.is_some_and(|err| err.is(RoutineError::BadBindings)));
}

#[test]
fn channel_bound_is_not_signalled_without_library_support() {
    let provider = Provider::new(
        MockEngine::with_family(EngineFamily::Mit, &[])
            .with_ticket(ALICE)
            .with_keytab_entry(SERVICE),
    );
    let cb = ChannelBinding::new(b"tls".to_vec());
    let (_client, mut server) = establish(
        &provider,
        InitOptions::new().channel_binding(cb.clone()),
        AcceptOptions::new().channel_binding(cb),
    )
    .unwrap();
    assert!(!server.inquire().unwrap().channel_bound);
}

#[test]
fn export_moves_the_context() {
    let provider = provider();
    let (mut client, mut server) = establish(
        &provider,
        InitOptions::new().request(ContextFlags::MUTUAL),
        AcceptOptions::new(),
    )
    .unwrap();
    let token = server.export().unwrap();
    assert_eq!(server.state(), ContextState::Deleted);
    let err = server.unwrap(b"anything").unwrap_err();
    assert!(err.is(RoutineError::NoContext), "{err}");
    assert!(server.export().unwrap_err().is(RoutineError::NoContext));

    let mut imported = provider.import_sec_context(&token).unwrap();
    assert!(imported.is_established());
    assert!(!imported.is_initiator());
    assert_eq!(imported.mech(), Some(Mech::Krb5));
    assert!(imported.step(b"x").unwrap_err().is(RoutineError::Failure));

    let wrapped = client.wrap(b"after transfer", true, QOP_DEFAULT).unwrap();
    assert_eq!(imported.unwrap(&wrapped.token).unwrap().message, b"after transfer");

    let err = provider.import_sec_context(&token).unwrap_err();
    assert!(err.is(RoutineError::NoContext), "{err}");
    let err = provider.import_sec_context(b"junk").unwrap_err();
    assert!(err.is(RoutineError::DefectiveToken), "{err}");
}

#[test]
fn only_established_contexts_export() {
    let provider = provider();
    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService).unwrap();
    let mut client = provider
        .init_sec_context(&target, InitOptions::new().request(ContextFlags::MUTUAL))
        .unwrap();
    assert!(client.export().unwrap_err().is(RoutineError::NoContext));
    client.step(&[]).unwrap();
    let err = client.export().unwrap_err();
    assert!(err.is(RoutineError::Unavailable), "{err}");
    assert_eq!(client.state(), ContextState::Continuing);
}

#[test]
fn peer_deletion_token_expires_the_context() {
    let provider = provider();
    let (_client, mut server) = establish(&provider, InitOptions::new(), AcceptOptions::new()).unwrap();
    assert!(matches!(server.expires_at().unwrap(), Lifetime::At(_)));
    let err = server.process_token(b"bogus").unwrap_err();
    assert!(err.is(RoutineError::DefectiveToken), "{err}");
    server.process_token(PEER_DELETE_TOKEN).unwrap();
    assert_eq!(server.expires_at().unwrap(), Lifetime::Expired);
}
