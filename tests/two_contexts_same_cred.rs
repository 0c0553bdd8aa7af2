#![cfg(unix)]

use holocron::{ContextFlags, CredUsage, InitOptions, Mech, NameType};

#[test]
fn one_credential_drives_two_contexts() {
    let Ok(service) = std::env::var("HOLOCRON_TEST_SERVICE_PRINCIPAL") else {
        eprintln!("HOLOCRON_TEST_SERVICE_PRINCIPAL is not set, skipping");
        return;
    };
    let provider = match holocron::load() {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("no GSSAPI library, skipping: {err}");
            return;
        }
    };
    let cred = provider
        .acquire_credential(None, &[Mech::Krb5], CredUsage::Initiate, None)
        .unwrap();
    let target = provider.import_name(&service, NameType::Krb5Principal).unwrap();

    let mut ctx_a = provider
        .init_sec_context(&target, InitOptions::new().credential(&cred).request(ContextFlags::DELEG))
        .unwrap();
    let mut ctx_b = provider
        .init_sec_context(
            &target,
            InitOptions::new()
                .credential(&cred)
                .request(ContextFlags::MUTUAL | ContextFlags::CONF),
        )
        .unwrap();

    let first_a = ctx_a.step(&[]).unwrap();
    let first_b = ctx_b.step(&[]).unwrap();
    assert!(first_a.token.is_some());
    assert!(first_b.token.is_some());
    assert_ne!(first_a.token, first_b.token);

    drop(ctx_a);
    assert!(!cred.is_released());
    assert!(cred.inquire().unwrap().usage.can_initiate());
}
