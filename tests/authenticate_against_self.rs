#![cfg(unix)]

use std::sync::mpsc::{channel, Receiver, Sender};

use holocron::{AcceptOptions, ContextFlags, CredUsage, InitOptions, Mech, NameType, Provider, QOP_DEFAULT};

enum Message {
    Token(Vec<u8>),
    Data(Vec<u8>),
}

const MESSAGE: &[u8] = b"Hi, Server!";

fn setup() -> Option<(Provider, String)> {
    let Ok(service) = std::env::var("HOLOCRON_TEST_SERVICE_PRINCIPAL") else {
        eprintln!("HOLOCRON_TEST_SERVICE_PRINCIPAL is not set, skipping");
        return None;
    };
    match holocron::load() {
        Ok(provider) => Some((provider, service)),
        Err(err) => {
            eprintln!("no GSSAPI library, skipping: {err}");
            None
        }
    }
}

#[test]
fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let Some((provider, service)) = setup() else {
        return;
    };
    let (send, recv) = channel::<Message>();
    let (return_send, return_recv) = channel::<Vec<u8>>();

    let server_provider = provider.clone();
    let server_principal = service.clone();
    let join_handle = std::thread::spawn(move || server(&server_provider, &server_principal, recv, return_send));

    let user = std::env::var("HOLOCRON_TEST_USER_PRINCIPAL")
        .ok()
        .map(|user| provider.import_name(&user, NameType::Krb5Principal))
        .transpose()
        .unwrap();
    let cred = provider
        .acquire_credential(user.as_ref(), &[Mech::Krb5], CredUsage::Initiate, None)
        .unwrap();
    let target = provider.import_name(&service, NameType::Krb5Principal).unwrap();
    let mut client = provider
        .init_sec_context(
            &target,
            InitOptions::new()
                .credential(&cred)
                .request(ContextFlags::MUTUAL | ContextFlags::CONF | ContextFlags::INTEG),
        )
        .unwrap();

    let mut input = Vec::new();
    let info = loop {
        let step = client.step(&input).unwrap();
        if let Some(token) = step.token {
            eprintln!("[CLIENT] Sending token");
            send.send(Message::Token(token)).unwrap();
        }
        if client.is_established() {
            eprintln!("[CLIENT] Context completed");
            break step.info;
        }
        input = return_recv.recv().unwrap();
        eprintln!("[CLIENT] Answer received");
    };
    assert!(info.flags.contains(ContextFlags::MUTUAL));
    assert_eq!(info.mech, Some(Mech::Krb5));

    let wrapped = client.wrap(MESSAGE, true, QOP_DEFAULT).unwrap();
    send.send(Message::Data(wrapped.token)).unwrap();

    let mic = return_recv.recv().unwrap();
    client.verify_mic(MESSAGE, &mic).unwrap();

    join_handle.join().unwrap();
}

fn server(provider: &Provider, principal: &str, recv: Receiver<Message>, return_sender: Sender<Vec<u8>>) {
    let name = provider.import_name(principal, NameType::Krb5Principal).unwrap();
    let cred = provider
        .acquire_credential(Some(&name), &[Mech::Krb5], CredUsage::Accept, None)
        .unwrap();
    let mut ctx = provider.accept_sec_context(AcceptOptions::new().credential(&cred));
    while !ctx.is_established() {
        let Message::Token(token) = recv.recv().unwrap() else {
            panic!("data before the context was established");
        };
        eprintln!("[SERVER] Token received");
        if let Some(reply) = ctx.step(&token).unwrap().token {
            return_sender.send(reply).unwrap();
            eprintln!("[SERVER] Reply sent");
        }
    }
    eprintln!("[SERVER] Context completed");
    assert!(ctx.initiator_name().is_some());

    let Message::Data(data) = recv.recv().unwrap() else {
        panic!("expected wrapped data");
    };
    let unwrapped = ctx.unwrap(&data).unwrap();
    assert_eq!(unwrapped.message, MESSAGE);
    assert!(unwrapped.confidential);
    return_sender.send(ctx.get_mic(MESSAGE, QOP_DEFAULT).unwrap()).unwrap();
}
