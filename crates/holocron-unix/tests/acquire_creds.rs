use holocron_core::{CredUsage, Extension, InitOptions, Mech, NameType, Provider, RoutineError};
use holocron_unix::{EngineConfig, UnixEngine};

fn provider() -> Option<Provider<UnixEngine>> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    match UnixEngine::load(&EngineConfig::from_env()) {
        Ok(engine) => Some(Provider::new(engine)),
        Err(err) => {
            eprintln!("no GSSAPI library, skipping: {err}");
            None
        }
    }
}

#[test]
fn library_answers_without_credentials() {
    let Some(provider) = provider() else {
        return;
    };
    eprintln!(
        "{} at {}",
        provider.capabilities().family(),
        provider.engine().library_path()
    );
    assert!(provider.indicate_mechs().unwrap().contains(&Mech::Krb5));
    assert!(!provider.has_extension(Extension::Krb5Identity));

    let name = provider.import_name("HTTP@web.example", NameType::HostbasedService).unwrap();
    assert_eq!(name.display().unwrap().0, "HTTP@web.example");
    let err = name.export().unwrap_err();
    assert!(err.is(RoutineError::NameNotMn), "{err}");
}

#[test]
fn main() {
    let Ok(service_principal) = std::env::var("HOLOCRON_TEST_SERVICE_PRINCIPAL") else {
        eprintln!("HOLOCRON_TEST_SERVICE_PRINCIPAL is not set, skipping");
        return;
    };
    let Some(provider) = provider() else {
        return;
    };
    let client_name = std::env::var("HOLOCRON_TEST_USER_PRINCIPAL")
        .ok()
        .map(|name| provider.import_name(&name, NameType::Krb5Principal))
        .transpose()
        .unwrap();
    let cred = match provider.acquire_credential(client_name.as_ref(), &[Mech::Krb5], CredUsage::Initiate, None) {
        Ok(cred) => cred,
        Err(err) => {
            eprintln!("Error: {err}");
            panic!()
        }
    };
    let info = cred.inquire().unwrap();
    assert!(info.usage.can_initiate());
    assert!(info.mechs.contains(&Mech::Krb5));

    let target = provider
        .import_name(&service_principal, NameType::Krb5Principal)
        .unwrap();
    let mut ctx = provider
        .init_sec_context(&target, InitOptions::new().credential(&cred))
        .unwrap();
    match ctx.step(&[]) {
        Ok(step) => assert!(step.token.is_some()),
        Err(err) => {
            eprintln!("Error initiating: {err}");
            panic!()
        }
    }
}
