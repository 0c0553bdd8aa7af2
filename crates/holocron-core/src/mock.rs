//! A toy mechanism that lives entirely in process memory.
//!
//! It speaks just enough of a Kerberos-shaped exchange (a request token, an optional mutual
//! authentication reply) to drive [`SecContext`](crate::SecContext) through every state, and it
//! counts live handles, double releases and engine calls so tests can check resource discipline.
//! Nothing here is cryptographically meaningful.

use std::{
    collections::{hash_map::DefaultHasher, BTreeSet, HashMap},
    hash::{Hash, Hasher},
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    capability::{Capabilities, EngineFamily, Extension},
    channel_bindings::ChannelBinding,
    cred::CredUsage,
    cred_store::{CredStore, CredStoreKey},
    engine::{
        AcceptRequest, AcquireRequest, AddCredRequest, Engine, EngineResult, InitRequest, MicOutput, RawContextInfo,
        RawCredInfo, RawNameInfo, RoundOutput, StoreRequest, StoredElements, UnwrapOutput, WrapOutput,
    },
    flags::ContextFlags,
    lifetime::INDEFINITE,
    mech::{NameType, OID_KRB5, OID_KRB5_NT_PRINCIPAL_NAME, OID_SPNEGO},
    oid::{Oid, OidSet},
    status::{RawStatus, RoutineError, Supplementary},
};

pub const REALM: &str = "MOCK.REALM";
/// Out-of-band token that expires the receiving context.
pub const PEER_DELETE_TOKEN: &[u8] = b"MOCKDEL";
pub const TICKET_LIFETIME: u32 = 36_000;
pub const CONTEXT_LIFETIME: u32 = 3_600;
pub const WRAP_OVERHEAD: u32 = 4 + 1 + 4 + 8;

const EXPORT_PREFIX: &[u8] = b"MOCKEXP\0";
const DEFAULT_STORE: &str = "";
const ANONYMOUS_PRINCIPAL: &str = "WELLKNOWN/ANONYMOUS@WELLKNOWN:ANONYMOUS";

pub mod minor {
    pub const NO_CCACHE: u32 = 0x4d4f_0001;
    pub const NO_KEYTAB_ENTRY: u32 = 0x4d4f_0002;
    pub const WRONG_PRINCIPAL: u32 = 0x4d4f_0003;
    pub const NO_LOCALNAME: u32 = 0x4d4f_0004;
    pub const MALFORMED: u32 = 0x4d4f_0005;
    pub const TAMPERED: u32 = 0x4d4f_0006;
}

/// A mechanism the mock advertises but nothing above it recognises (1.2.3.4.5).
pub const OID_PRIVATE_MECH: Oid = Oid::from_static(&[0x2a, 0x03, 0x04, 0x05]);

#[derive(Debug)]
pub struct MockName(u64);
#[derive(Debug)]
pub struct MockCred(u64);
#[derive(Debug)]
pub struct MockContext(u64);

#[derive(Clone)]
struct NameEntry {
    text: String,
    name_type: Oid,
    principal: String,
    mechanism_name: bool,
}

#[derive(Clone)]
enum Acceptor {
    Principal(String),
    /// Any service principal present in the named keytab.
    AnyIn(String),
}

#[derive(Clone)]
struct CredEntry {
    usage: CredUsage,
    initiator: Option<String>,
    acceptor: Option<Acceptor>,
    mechs: OidSet,
}

#[derive(Clone)]
struct ContextEntry {
    initiator: bool,
    open: bool,
    flags: ContextFlags,
    initiator_principal: String,
    acceptor_principal: String,
    key: u64,
    bindings: Option<u64>,
    lifetime: u32,
    seen_mics: BTreeSet<u64>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    names: HashMap<u64, NameEntry>,
    creds: HashMap<u64, CredEntry>,
    contexts: HashMap<u64, ContextEntry>,
    exported: HashMap<u64, ContextEntry>,
    ccaches: HashMap<String, BTreeSet<String>>,
    keytabs: HashMap<String, BTreeSet<String>>,
    double_releases: usize,
    calls: usize,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
    fn name(&self, name: &MockName) -> EngineResult<&NameEntry> {
        self.names.get(&name.0).ok_or(fail(RoutineError::BadName, 0))
    }
    fn new_name(&mut self, entry: NameEntry) -> MockName {
        let id = self.id();
        self.names.insert(id, entry);
        MockName(id)
    }
    fn principal_name(&mut self, principal: &str) -> MockName {
        self.new_name(NameEntry {
            text: principal.to_owned(),
            name_type: OID_KRB5_NT_PRINCIPAL_NAME,
            principal: principal.to_owned(),
            mechanism_name: true,
        })
    }
    fn cred(&self, cred: &MockCred) -> EngineResult<&CredEntry> {
        self.creds.get(&cred.0).ok_or(fail(RoutineError::NoCred, 0))
    }
    fn new_cred(&mut self, entry: CredEntry) -> MockCred {
        let id = self.id();
        self.creds.insert(id, entry);
        MockCred(id)
    }
    fn context(&mut self, ctx: &MockContext) -> EngineResult<&mut ContextEntry> {
        self.contexts.get_mut(&ctx.0).ok_or(fail(RoutineError::NoContext, 0))
    }
    fn ccache(&self, store: Option<&CredStore>) -> Option<&BTreeSet<String>> {
        let location = store.and_then(|s| s.get(CredStoreKey::CCache)).unwrap_or(DEFAULT_STORE);
        self.ccaches.get(location)
    }
    fn keytab_location(store: Option<&CredStore>) -> String {
        store
            .and_then(|s| s.get(CredStoreKey::ServerKeytab))
            .unwrap_or(DEFAULT_STORE)
            .to_owned()
    }
    fn keytab_has(&self, location: &str, principal: &str) -> bool {
        self.keytabs.get(location).is_some_and(|kt| kt.contains(principal))
    }

    /// Resolves identity material for one credential element.
    fn acquire(
        &self,
        name: Option<&MockName>,
        usage: CredUsage,
        store: Option<&CredStore>,
    ) -> EngineResult<(Option<String>, Option<Acceptor>)> {
        let principal = name.map(|n| self.name(n).map(|e| e.principal.clone())).transpose()?;
        let initiator = if usage.can_initiate() {
            let ccache = self.ccache(store);
            let found = match &principal {
                Some(p) => ccache.filter(|cc| cc.contains(p)).map(|_| p.clone()),
                None => ccache.and_then(|cc| cc.iter().next().cloned()),
            };
            Some(found.ok_or(fail(RoutineError::NoCred, minor::NO_CCACHE))?)
        } else {
            None
        };
        let acceptor = if usage.can_accept() {
            let keytab = Self::keytab_location(store);
            let acceptor = match &principal {
                Some(p) if self.keytab_has(&keytab, p) => Acceptor::Principal(p.clone()),
                None if self.keytabs.get(&keytab).is_some_and(|kt| !kt.is_empty()) => Acceptor::AnyIn(keytab),
                _ => return Err(fail(RoutineError::NoCred, minor::NO_KEYTAB_ENTRY)),
            };
            Some(acceptor)
        } else {
            None
        };
        Ok((initiator, acceptor))
    }
}

fn fail(routine: RoutineError, minor: u32) -> RawStatus {
    RawStatus::routine(routine).with_minor(minor)
}

fn supported_mech(oid: &Oid) -> EngineResult<Oid> {
    if *oid == OID_KRB5 || *oid == OID_SPNEGO {
        Ok(oid.clone())
    } else {
        Err(fail(RoutineError::BadMech, 0))
    }
}

fn digest(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn bindings_digest(cb: &ChannelBinding) -> u64 {
    digest((cb.initiator_parts(), cb.acceptor_parts(), &cb.data))
}

fn with_realm(text: &str) -> String {
    if text.contains('@') {
        text.to_owned()
    } else {
        format!("{text}@{REALM}")
    }
}

fn parse_name(bytes: &[u8], oid: &Oid) -> EngineResult<NameEntry> {
    let name_type = NameType::from_oid(oid).ok_or(fail(RoutineError::BadNameType, 0))?;
    if name_type.is_exported_form() {
        let principal = bytes
            .strip_prefix(EXPORT_PREFIX)
            .and_then(|p| std::str::from_utf8(p).ok())
            .filter(|p| !p.is_empty())
            .ok_or(fail(RoutineError::BadName, minor::MALFORMED))?;
        return Ok(NameEntry {
            text: principal.to_owned(),
            name_type: OID_KRB5_NT_PRINCIPAL_NAME,
            principal: principal.to_owned(),
            mechanism_name: true,
        });
    }
    let text = std::str::from_utf8(bytes)
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or(fail(RoutineError::BadName, 0))?;
    let principal = match name_type {
        NameType::User | NameType::StringUid | NameType::Krb5Principal | NameType::Krb5Enterprise => with_realm(text),
        NameType::HostbasedService | NameType::HostbasedServiceX => match text.split_once('@') {
            Some((service, host)) => format!("{service}/{host}@{REALM}"),
            None => format!("{text}/localhost@{REALM}"),
        },
        NameType::Anonymous => ANONYMOUS_PRINCIPAL.to_owned(),
        NameType::MachineUid | NameType::Krb5X509Cert | NameType::Export | NameType::CompositeExport => {
            return Err(fail(RoutineError::BadNameType, 0));
        }
    };
    Ok(NameEntry {
        text: text.to_owned(),
        name_type: oid.clone(),
        principal,
        mechanism_name: false,
    })
}

#[derive(Default)]
struct TokenWriter(Vec<u8>);

impl TokenWriter {
    fn bytes(mut self, bytes: &[u8]) -> Self {
        self.0.extend_from_slice(bytes);
        self
    }
    fn u8(self, value: u8) -> Self {
        self.bytes(&[value])
    }
    fn u32(self, value: u32) -> Self {
        self.bytes(&value.to_be_bytes())
    }
    fn u64(self, value: u64) -> Self {
        self.bytes(&value.to_be_bytes())
    }
    fn str(self, value: &str) -> Self {
        let len = value.len() as u16;
        self.bytes(&len.to_be_bytes()).bytes(value.as_bytes())
    }
}

struct TokenReader<'a>(&'a [u8]);

impl<'a> TokenReader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Some(head)
    }
    fn tag(&mut self, tag: &[u8]) -> Option<()> {
        (self.take(tag.len())? == tag).then_some(())
    }
    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }
    fn u32(&mut self) -> Option<u32> {
        self.take(4)?.try_into().ok().map(u32::from_be_bytes)
    }
    fn u64(&mut self) -> Option<u64> {
        self.take(8)?.try_into().ok().map(u64::from_be_bytes)
    }
    fn str(&mut self) -> Option<String> {
        let len = u16::from_be_bytes(self.take(2)?.try_into().ok()?);
        let bytes = self.take(len.into())?;
        String::from_utf8(bytes.to_vec()).ok()
    }
    fn rest(self) -> &'a [u8] {
        self.0
    }
}

fn malformed() -> RawStatus {
    fail(RoutineError::DefectiveToken, minor::MALFORMED)
}

fn keystream(key: u64, message: &[u8]) -> Vec<u8> {
    let key = key.to_be_bytes();
    message
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ key[i % 8] ^ (i as u8))
        .collect()
}

fn granted_flags(requested: ContextFlags) -> ContextFlags {
    let requestable = ContextFlags::DELEG | ContextFlags::MUTUAL | ContextFlags::REPLAY | ContextFlags::SEQUENCE;
    (requested & requestable) | ContextFlags::CONF | ContextFlags::INTEG | ContextFlags::TRANS
}

pub struct MockEngine {
    capabilities: Capabilities,
    state: Mutex<State>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// A current MIT-like library with every optional symbol present.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::probe(EngineFamily::Mit, |_| true))
    }
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(State::default()),
        }
    }
    /// A library of `family` exporting only `symbols`.
    pub fn with_family(family: EngineFamily, symbols: &[&str]) -> Self {
        Self::with_capabilities(Capabilities::probe(family, |s| symbols.contains(&s)))
    }
    /// Puts a ticket for `principal` in the default credential cache.
    pub fn with_ticket(self, principal: &str) -> Self {
        self.with_ticket_in(DEFAULT_STORE, principal)
    }
    pub fn with_ticket_in(self, ccache: &str, principal: &str) -> Self {
        self.state()
            .ccaches
            .entry(ccache.to_owned())
            .or_default()
            .insert(principal.to_owned());
        self
    }
    /// Puts a key for `principal` in the default keytab.
    pub fn with_keytab_entry(self, principal: &str) -> Self {
        self.with_keytab_entry_in(DEFAULT_STORE, principal)
    }
    pub fn with_keytab_entry_in(self, keytab: &str, principal: &str) -> Self {
        self.state()
            .keytabs
            .entry(keytab.to_owned())
            .or_default()
            .insert(principal.to_owned());
        self
    }

    /// Names, credentials and contexts not yet released.
    pub fn live_handles(&self) -> usize {
        let state = self.state();
        state.names.len() + state.creds.len() + state.contexts.len()
    }
    pub fn double_releases(&self) -> usize {
        self.state().double_releases
    }
    /// Number of engine calls made so far, not counting these accessors.
    pub fn engine_calls(&self) -> usize {
        self.state().calls
    }
    pub fn ccache_contents(&self, ccache: &str) -> Vec<String> {
        self.state()
            .ccaches
            .get(ccache)
            .map(|cc| cc.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn call(&self) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.calls += 1;
        state
    }
    fn reports_channel_bound(&self) -> bool {
        self.capabilities.has_extension(Extension::ChannelBindingSignalling)
    }
}

impl Engine for MockEngine {
    type Name = MockName;
    type Cred = MockCred;
    type Context = MockContext;

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn minor_messages(&self, minor: u32, _mech: Option<&Oid>) -> Vec<String> {
        let message = match minor {
            minor::NO_CCACHE => "No credentials cache found",
            minor::NO_KEYTAB_ENTRY => "No key table entry found for the requested principal",
            minor::WRONG_PRINCIPAL => "Wrong principal in request",
            minor::NO_LOCALNAME => "No local name found for principal name",
            minor::MALFORMED => "Token is malformed",
            minor::TAMPERED => "Message integrity check failed",
            other => return vec![format!("unknown mock minor status {other:#x}")],
        };
        vec![message.to_owned()]
    }

    fn import_name(&self, name: &[u8], name_type: &Oid) -> EngineResult<MockName> {
        let mut state = self.call();
        let entry = parse_name(name, name_type)?;
        Ok(state.new_name(entry))
    }

    fn release_name(&self, name: MockName) -> EngineResult<()> {
        let mut state = self.call();
        if state.names.remove(&name.0).is_none() {
            state.double_releases += 1;
            return Err(fail(RoutineError::BadName, 0));
        }
        Ok(())
    }

    fn display_name(&self, name: &MockName) -> EngineResult<(Vec<u8>, Option<Oid>)> {
        let state = self.call();
        let entry = state.name(name)?;
        if entry.mechanism_name {
            Ok((entry.principal.clone().into_bytes(), Some(OID_KRB5_NT_PRINCIPAL_NAME)))
        } else {
            Ok((entry.text.clone().into_bytes(), Some(entry.name_type.clone())))
        }
    }

    fn compare_name(&self, a: &MockName, b: &MockName) -> EngineResult<bool> {
        let state = self.call();
        Ok(state.name(a)?.principal == state.name(b)?.principal)
    }

    fn canonicalize_name(&self, name: &MockName, mech: &Oid) -> EngineResult<MockName> {
        let mut state = self.call();
        supported_mech(mech)?;
        let principal = state.name(name)?.principal.clone();
        Ok(state.principal_name(&principal))
    }

    fn export_name(&self, name: &MockName) -> EngineResult<Vec<u8>> {
        let state = self.call();
        let entry = state.name(name)?;
        if !entry.mechanism_name {
            return Err(fail(RoutineError::NameNotMn, 0));
        }
        Ok(TokenWriter::default()
            .bytes(EXPORT_PREFIX)
            .bytes(entry.principal.as_bytes())
            .0)
    }

    fn duplicate_name(&self, name: &MockName) -> EngineResult<MockName> {
        let mut state = self.call();
        let entry = state.name(name)?.clone();
        Ok(state.new_name(entry))
    }

    fn inquire_mechs_for_name(&self, name: &MockName) -> EngineResult<OidSet> {
        let state = self.call();
        state.name(name)?;
        Ok([OID_KRB5, OID_SPNEGO, OID_PRIVATE_MECH].into_iter().collect())
    }

    fn inquire_names_for_mech(&self, mech: &Oid) -> EngineResult<OidSet> {
        let _state = self.call();
        supported_mech(mech)?;
        Ok([
            NameType::User.oid(),
            NameType::HostbasedService.oid(),
            NameType::Krb5Principal.oid(),
            NameType::Export.oid(),
            OID_PRIVATE_MECH,
        ]
        .into_iter()
        .collect())
    }

    fn indicate_mechs(&self) -> EngineResult<OidSet> {
        let _state = self.call();
        Ok([OID_KRB5, OID_SPNEGO, OID_PRIVATE_MECH].into_iter().collect())
    }

    fn localname(&self, name: &MockName, mech: &Oid) -> EngineResult<Vec<u8>> {
        let state = self.call();
        supported_mech(mech)?;
        let principal = &state.name(name)?.principal;
        match principal.strip_suffix(&format!("@{REALM}")) {
            Some(user) if !user.contains('/') => Ok(user.as_bytes().to_vec()),
            _ => Err(fail(RoutineError::Failure, minor::NO_LOCALNAME)),
        }
    }

    fn inquire_name(&self, name: &MockName) -> EngineResult<RawNameInfo> {
        let state = self.call();
        let entry = state.name(name)?;
        Ok(RawNameInfo {
            is_mechanism_name: entry.mechanism_name,
            mech: entry.mechanism_name.then_some(OID_KRB5),
            attributes: if entry.mechanism_name {
                vec![b"urn:mock:realm".to_vec()]
            } else {
                Vec::new()
            },
        })
    }

    fn acquire_cred(&self, request: AcquireRequest<'_, Self>) -> EngineResult<MockCred> {
        let mut state = self.call();
        let mechs: OidSet = if request.mechs.is_empty() {
            [OID_KRB5].into_iter().collect()
        } else {
            request.mechs.iter().filter_map(|m| supported_mech(m).ok()).collect()
        };
        if mechs.is_empty() {
            return Err(fail(RoutineError::BadMech, 0));
        }
        let (initiator, acceptor) = state.acquire(request.name, request.usage, request.store)?;
        Ok(state.new_cred(CredEntry {
            usage: request.usage,
            initiator,
            acceptor,
            mechs,
        }))
    }

    fn release_cred(&self, cred: MockCred) -> EngineResult<()> {
        let mut state = self.call();
        if state.creds.remove(&cred.0).is_none() {
            state.double_releases += 1;
            return Err(fail(RoutineError::NoCred, 0));
        }
        Ok(())
    }

    fn inquire_cred(&self, cred: &MockCred) -> EngineResult<RawCredInfo<MockName>> {
        let mut state = self.call();
        let entry = state.cred(cred)?.clone();
        let principal = entry.initiator.clone().or(match &entry.acceptor {
            Some(Acceptor::Principal(p)) => Some(p.clone()),
            _ => None,
        });
        let name = principal.map(|p| state.principal_name(&p));
        Ok(RawCredInfo {
            name,
            usage: if self.capabilities.quirks().misreports_cred_usage {
                CredUsage::Both
            } else {
                entry.usage
            },
            initiator_lifetime: TICKET_LIFETIME,
            acceptor_lifetime: INDEFINITE,
            mechs: entry.mechs,
        })
    }

    fn inquire_cred_by_mech(&self, cred: &MockCred, mech: &Oid) -> EngineResult<RawCredInfo<MockName>> {
        let mut raw = self.inquire_cred(cred)?;
        if !raw.mechs.contains(mech) {
            if let Some(name) = raw.name.take() {
                self.release_name(name)?;
            }
            return Err(fail(RoutineError::BadMech, 0));
        }
        let usage = self.state().cred(cred)?.usage;
        raw.initiator_lifetime = if usage.can_initiate() { TICKET_LIFETIME } else { 0 };
        raw.acceptor_lifetime = if usage.can_accept() { INDEFINITE } else { 0 };
        if usage == CredUsage::Accept && self.capabilities.quirks().swaps_accept_expiry_by_mech {
            std::mem::swap(&mut raw.initiator_lifetime, &mut raw.acceptor_lifetime);
        }
        raw.mechs = [mech.clone()].into_iter().collect();
        Ok(raw)
    }

    fn add_cred(
        &self,
        cred: &MockCred,
        request: AddCredRequest<'_, Self>,
        new_handle: bool,
    ) -> EngineResult<Option<MockCred>> {
        let mut state = self.call();
        if !new_handle && self.capabilities.quirks().add_cred_requires_new_handle {
            return Err(fail(RoutineError::Failure, 0));
        }
        let mech = supported_mech(request.mech)?;
        let mut entry = state.cred(cred)?.clone();
        let covered = match request.usage {
            CredUsage::Both => entry.usage == CredUsage::Both,
            other => entry.usage == other || entry.usage == CredUsage::Both,
        };
        if entry.mechs.contains(&mech) && covered {
            return Err(fail(RoutineError::DuplicateElement, 0));
        }
        let (initiator, acceptor) = state.acquire(request.name, request.usage, request.store)?;
        entry.usage = entry.usage.union(request.usage);
        entry.initiator = entry.initiator.or(initiator);
        entry.acceptor = entry.acceptor.or(acceptor);
        entry.mechs.insert(mech);
        if new_handle {
            Ok(Some(state.new_cred(entry)))
        } else {
            state.creds.insert(cred.0, entry);
            Ok(None)
        }
    }

    fn store_cred(&self, cred: &MockCred, request: StoreRequest<'_>) -> EngineResult<StoredElements> {
        let mut state = self.call();
        if request.usage == CredUsage::Accept {
            return Err(fail(RoutineError::Unavailable, 0));
        }
        let entry = state.cred(cred)?.clone();
        let principal = entry.initiator.ok_or(fail(RoutineError::NoCred, minor::NO_CCACHE))?;
        let location = request.store.get(CredStoreKey::CCache).unwrap_or(DEFAULT_STORE).to_owned();
        let ccache = state.ccaches.entry(location).or_default();
        if !request.overwrite && ccache.contains(&principal) {
            return Err(fail(RoutineError::DuplicateElement, 0));
        }
        ccache.insert(principal);
        let mechs = match request.mech {
            Some(mech) => [supported_mech(mech)?].into_iter().collect(),
            None => entry.mechs,
        };
        Ok(StoredElements {
            mechs,
            usage: CredUsage::Initiate,
        })
    }

    fn init_sec_context(
        &self,
        ctx: &mut Option<MockContext>,
        request: InitRequest<'_, Self>,
    ) -> EngineResult<RoundOutput<Self>> {
        let mut state = self.call();
        let mech = supported_mech(request.mech.unwrap_or(&OID_KRB5))?;
        if let Some(existing) = ctx {
            let reports_bound = self.reports_channel_bound();
            let entry = state.context(existing)?;
            if entry.open || !entry.initiator {
                return Err(fail(RoutineError::Failure, 0));
            }
            let mut reader = TokenReader(request.input);
            reader.tag(b"AREP").ok_or_else(malformed)?;
            let key = reader.u64().ok_or_else(malformed)?;
            let bound = reader.u8().ok_or_else(malformed)? == 1;
            if key != entry.key {
                return Err(fail(RoutineError::DefectiveToken, minor::TAMPERED));
            }
            entry.open = true;
            if bound && reports_bound {
                entry.flags.insert(ContextFlags::CHANNEL_BOUND);
            }
            return Ok(RoundOutput {
                continue_needed: false,
                output_token: Vec::new(),
                mech: Some(mech),
                flags: entry.flags | ContextFlags::PROT_READY,
                time_rec: entry.lifetime,
                src_name: None,
                delegated_cred: None,
            });
        }

        let initiator = match request.cred {
            Some(cred) => {
                let entry = state.cred(cred)?;
                entry
                    .initiator
                    .clone()
                    .ok_or(fail(RoutineError::NoCred, minor::NO_CCACHE))?
            }
            None => state
                .ccache(None)
                .and_then(|cc| cc.iter().next().cloned())
                .ok_or(fail(RoutineError::NoCred, minor::NO_CCACHE))?,
        };
        let target = state.name(request.target)?.principal.clone();
        let key = digest((&initiator, &target, state.next_id));
        let bindings = request.bindings.map(bindings_digest);
        let flags = granted_flags(request.flags);
        let mutual = flags.contains(ContextFlags::MUTUAL);
        let token = TokenWriter::default()
            .bytes(b"AREQ")
            .u32(request.flags.bits())
            .u64(key)
            .u8(u8::from(bindings.is_some()))
            .u64(bindings.unwrap_or_default())
            .str(&initiator)
            .str(&target)
            .0;
        let lifetime = CONTEXT_LIFETIME.min(request.time_req);
        let id = state.id();
        state.contexts.insert(
            id,
            ContextEntry {
                initiator: true,
                open: !mutual,
                flags,
                initiator_principal: initiator,
                acceptor_principal: target,
                key,
                bindings,
                lifetime,
                seen_mics: BTreeSet::new(),
            },
        );
        *ctx = Some(MockContext(id));
        Ok(RoundOutput {
            continue_needed: mutual,
            output_token: token,
            mech: Some(mech),
            flags: flags | ContextFlags::PROT_READY,
            time_rec: lifetime,
            src_name: None,
            delegated_cred: None,
        })
    }

    fn accept_sec_context(
        &self,
        ctx: &mut Option<MockContext>,
        request: AcceptRequest<'_, Self>,
    ) -> EngineResult<RoundOutput<Self>> {
        let mut state = self.call();
        if ctx.is_some() {
            return Err(fail(RoutineError::Failure, 0));
        }
        let mut reader = TokenReader(request.input);
        reader.tag(b"AREQ").ok_or_else(malformed)?;
        let requested = ContextFlags::from_bits(reader.u32().ok_or_else(malformed)?);
        let key = reader.u64().ok_or_else(malformed)?;
        let has_bindings = reader.u8().ok_or_else(malformed)? == 1;
        let initiator_bindings = reader.u64().ok_or_else(malformed)?;
        let initiator = reader.str().ok_or_else(malformed)?;
        let target = reader.str().ok_or_else(malformed)?;
        if !reader.rest().is_empty() {
            return Err(malformed());
        }

        let acceptor_ok = match request.cred {
            Some(cred) => match &state.cred(cred)?.acceptor {
                Some(Acceptor::Principal(p)) => *p == target,
                Some(Acceptor::AnyIn(keytab)) => state.keytab_has(keytab, &target),
                None => return Err(fail(RoutineError::NoCred, 0)),
            },
            None => state.keytab_has(DEFAULT_STORE, &target),
        };
        if !acceptor_ok {
            let status = if request.cred.is_some() {
                fail(RoutineError::Failure, minor::WRONG_PRINCIPAL)
            } else {
                fail(RoutineError::NoCred, minor::NO_KEYTAB_ENTRY)
            };
            return Err(status);
        }

        let acceptor_bindings = request.bindings.map(bindings_digest);
        let bound = match (has_bindings, acceptor_bindings) {
            (true, Some(ours)) if ours != initiator_bindings => return Err(fail(RoutineError::BadBindings, 0)),
            (true, Some(_)) => true,
            _ => false,
        };

        let mut flags = granted_flags(requested);
        if bound && self.reports_channel_bound() {
            flags.insert(ContextFlags::CHANNEL_BOUND);
        }
        let output_token = if flags.contains(ContextFlags::MUTUAL) {
            TokenWriter::default().bytes(b"AREP").u64(key).u8(u8::from(bound)).0
        } else {
            Vec::new()
        };
        let id = state.id();
        state.contexts.insert(
            id,
            ContextEntry {
                initiator: false,
                open: true,
                flags,
                initiator_principal: initiator.clone(),
                acceptor_principal: target,
                key,
                bindings: acceptor_bindings,
                lifetime: CONTEXT_LIFETIME,
                seen_mics: BTreeSet::new(),
            },
        );
        *ctx = Some(MockContext(id));
        let src_name = state.principal_name(&initiator);
        let delegated_cred = flags.contains(ContextFlags::DELEG).then(|| {
            state.new_cred(CredEntry {
                usage: CredUsage::Initiate,
                initiator: Some(initiator),
                acceptor: None,
                mechs: [OID_KRB5].into_iter().collect(),
            })
        });
        Ok(RoundOutput {
            continue_needed: false,
            output_token,
            mech: Some(OID_KRB5),
            flags: flags | ContextFlags::PROT_READY,
            time_rec: CONTEXT_LIFETIME,
            src_name: Some(src_name),
            delegated_cred,
        })
    }

    fn delete_sec_context(&self, ctx: MockContext) -> EngineResult<Vec<u8>> {
        let mut state = self.call();
        if state.contexts.remove(&ctx.0).is_none() {
            state.double_releases += 1;
            return Err(fail(RoutineError::NoContext, 0));
        }
        Ok(Vec::new())
    }

    fn process_context_token(&self, ctx: &MockContext, token: &[u8]) -> EngineResult<()> {
        let mut state = self.call();
        let entry = state.context(ctx)?;
        if token != PEER_DELETE_TOKEN {
            return Err(malformed());
        }
        entry.lifetime = 0;
        Ok(())
    }

    fn context_time(&self, ctx: &MockContext) -> EngineResult<u32> {
        let mut state = self.call();
        match state.context(ctx)?.lifetime {
            0 => Err(fail(RoutineError::ContextExpired, 0)),
            seconds => Ok(seconds),
        }
    }

    fn inquire_context(&self, ctx: &MockContext) -> EngineResult<RawContextInfo<MockName>> {
        let mut state = self.call();
        let entry = state.context(ctx)?.clone();
        let (src, targ) = (
            state.principal_name(&entry.initiator_principal),
            state.principal_name(&entry.acceptor_principal),
        );
        let mut flags = entry.flags;
        if entry.open {
            flags.insert(ContextFlags::PROT_READY);
        }
        Ok(RawContextInfo {
            src_name: Some(src),
            targ_name: Some(targ),
            lifetime: entry.lifetime,
            mech: (!self.capabilities.quirks().omits_context_mech).then_some(OID_KRB5),
            flags,
            locally_initiated: entry.initiator,
            open: entry.open,
        })
    }

    fn wrap_size_limit(&self, ctx: &MockContext, _conf: bool, _qop: u32, max_output: u32) -> EngineResult<u32> {
        let mut state = self.call();
        state.context(ctx)?;
        Ok(max_output.saturating_sub(WRAP_OVERHEAD))
    }

    fn export_sec_context(&self, ctx: &mut Option<MockContext>) -> EngineResult<Vec<u8>> {
        let mut state = self.call();
        let handle = ctx.take().ok_or(fail(RoutineError::NoContext, 0))?;
        let entry = state.contexts.remove(&handle.0).ok_or(fail(RoutineError::NoContext, 0))?;
        state.exported.insert(handle.0, entry);
        Ok(TokenWriter::default().bytes(b"MCTX").u64(handle.0).0)
    }

    fn import_sec_context(&self, token: &[u8]) -> EngineResult<MockContext> {
        let mut state = self.call();
        let mut reader = TokenReader(token);
        reader.tag(b"MCTX").ok_or_else(malformed)?;
        let old = reader.u64().ok_or_else(malformed)?;
        let entry = state.exported.remove(&old).ok_or(fail(RoutineError::NoContext, 0))?;
        let id = state.id();
        state.contexts.insert(id, entry);
        Ok(MockContext(id))
    }

    fn wrap(&self, ctx: &MockContext, conf: bool, qop: u32, message: &[u8]) -> EngineResult<WrapOutput> {
        let mut state = self.call();
        let entry = state.context(ctx)?;
        if qop > 0xff {
            return Err(fail(RoutineError::BadQop, 0));
        }
        let tag = digest((entry.key, qop, message));
        let payload = if conf {
            keystream(entry.key, message)
        } else {
            message.to_vec()
        };
        Ok(WrapOutput {
            token: TokenWriter::default()
                .bytes(b"WRAP")
                .u8(u8::from(conf))
                .u32(qop)
                .u64(tag)
                .bytes(&payload)
                .0,
            confidential: conf,
        })
    }

    fn unwrap(&self, ctx: &MockContext, token: &[u8]) -> EngineResult<UnwrapOutput> {
        let mut state = self.call();
        let entry = state.context(ctx)?;
        let mut reader = TokenReader(token);
        reader.tag(b"WRAP").ok_or_else(malformed)?;
        let conf = reader.u8().ok_or_else(malformed)? == 1;
        let qop = reader.u32().ok_or_else(malformed)?;
        let tag = reader.u64().ok_or_else(malformed)?;
        let payload = reader.rest();
        let message = if conf {
            keystream(entry.key, payload)
        } else {
            payload.to_vec()
        };
        if digest((entry.key, qop, message.as_slice())) != tag {
            return Err(fail(RoutineError::BadMic, minor::TAMPERED));
        }
        Ok(UnwrapOutput {
            message,
            confidential: conf,
            qop,
            supplementary: Supplementary::default(),
        })
    }

    fn get_mic(&self, ctx: &MockContext, qop: u32, message: &[u8]) -> EngineResult<Vec<u8>> {
        let mut state = self.call();
        let entry = state.context(ctx)?;
        if qop > 0xff {
            return Err(fail(RoutineError::BadQop, 0));
        }
        let tag = digest((entry.key, qop, message));
        Ok(TokenWriter::default().bytes(b"MIC\0").u32(qop).u64(tag).0)
    }

    fn verify_mic(&self, ctx: &MockContext, message: &[u8], mic: &[u8]) -> EngineResult<MicOutput> {
        let mut state = self.call();
        let entry = state.context(ctx)?;
        let mut reader = TokenReader(mic);
        reader.tag(b"MIC\0").ok_or_else(malformed)?;
        let qop = reader.u32().ok_or_else(malformed)?;
        let tag = reader.u64().ok_or_else(malformed)?;
        if !reader.rest().is_empty() {
            return Err(malformed());
        }
        if digest((entry.key, qop, message)) != tag {
            return Err(fail(RoutineError::BadMic, minor::TAMPERED));
        }
        let fresh = entry.seen_mics.insert(tag);
        let supplementary = if !fresh && entry.flags.contains(ContextFlags::REPLAY) {
            Supplementary::DUPLICATE_TOKEN
        } else {
            Supplementary::default()
        };
        Ok(MicOutput { qop, supplementary })
    }
}
