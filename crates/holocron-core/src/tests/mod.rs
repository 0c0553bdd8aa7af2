use crate::{
    mock::MockEngine, AcceptOptions, InitOptions, NameType, Provider, Result, SecContext,
};

mod credentials;
mod establishment;

const ALICE: &str = "alice@MOCK.REALM";
const SERVICE: &str = "HTTP/web.example@MOCK.REALM";
const SERVICE_HOSTBASED: &str = "HTTP@web.example";

/// Alice holds a ticket, the service key sits in the default keytab.
fn provider() -> Provider<MockEngine> {
    Provider::new(MockEngine::new().with_ticket(ALICE).with_keytab_entry(SERVICE))
}

/// Ping-pongs tokens until neither side has anything left to send.
fn establish<'cred>(
    provider: &Provider<MockEngine>,
    init: InitOptions<'cred, MockEngine>,
    accept: AcceptOptions<'cred, MockEngine>,
) -> Result<(SecContext<'cred, MockEngine>, SecContext<'cred, MockEngine>)> {
    let target = provider.import_name(SERVICE_HOSTBASED, NameType::HostbasedService)?;
    let mut client = provider.init_sec_context(&target, init)?;
    let mut server = provider.accept_sec_context(accept);
    let mut to_server = client.step(&[])?.token;
    while let Some(token) = to_server {
        to_server = match server.step(&token)?.token {
            Some(reply) => client.step(&reply)?.token,
            None => None,
        };
    }
    Ok((client, server))
}
