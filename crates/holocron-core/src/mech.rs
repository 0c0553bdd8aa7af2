use std::fmt;

use crate::oid::Oid;

pub const OID_KRB5: Oid = Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02]);
pub const OID_SPNEGO: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02]);
pub const OID_IAKERB: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x02, 0x05]);
pub const OID_NTLMSSP: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0a]);

pub const OID_NT_USER_NAME: Oid = Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x01]);
pub const OID_NT_MACHINE_UID_NAME: Oid =
    Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x02]);
pub const OID_NT_STRING_UID_NAME: Oid =
    Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x03]);
pub const OID_NT_HOSTBASED_SERVICE: Oid =
    Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x01, 0x04]);
pub const OID_NT_HOSTBASED_SERVICE_X: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x02]);
pub const OID_NT_ANONYMOUS: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x03]);
pub const OID_NT_EXPORT_NAME: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x04]);
pub const OID_NT_COMPOSITE_EXPORT: Oid = Oid::from_static(&[0x2b, 0x06, 0x01, 0x05, 0x06, 0x06]);
pub const OID_KRB5_NT_PRINCIPAL_NAME: Oid =
    Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02, 0x01]);
pub const OID_KRB5_NT_ENTERPRISE_NAME: Oid =
    Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02, 0x06]);
pub const OID_KRB5_NT_X509_CERT: Oid =
    Oid::from_static(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02, 0x07]);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mech {
    Krb5,
    Spnego,
    Iakerb,
    Ntlmssp,
}

impl Mech {
    pub const ALL: [Mech; 4] = [Mech::Krb5, Mech::Spnego, Mech::Iakerb, Mech::Ntlmssp];

    pub fn oid(self) -> Oid {
        match self {
            Mech::Krb5 => OID_KRB5,
            Mech::Spnego => OID_SPNEGO,
            Mech::Iakerb => OID_IAKERB,
            Mech::Ntlmssp => OID_NTLMSSP,
        }
    }
    pub fn from_oid(oid: &Oid) -> Option<Self> {
        Self::ALL.into_iter().find(|mech| mech.oid() == *oid)
    }
    pub fn name(self) -> &'static str {
        match self {
            Mech::Krb5 => "Kerberos V5",
            Mech::Spnego => "SPNEGO",
            Mech::Iakerb => "IAKERB",
            Mech::Ntlmssp => "NTLMSSP",
        }
    }
}

impl fmt::Display for Mech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameType {
    User,
    MachineUid,
    StringUid,
    HostbasedService,
    HostbasedServiceX,
    Anonymous,
    Export,
    CompositeExport,
    Krb5Principal,
    Krb5Enterprise,
    Krb5X509Cert,
}

impl NameType {
    pub const ALL: [NameType; 11] = [
        NameType::User,
        NameType::MachineUid,
        NameType::StringUid,
        NameType::HostbasedService,
        NameType::HostbasedServiceX,
        NameType::Anonymous,
        NameType::Export,
        NameType::CompositeExport,
        NameType::Krb5Principal,
        NameType::Krb5Enterprise,
        NameType::Krb5X509Cert,
    ];

    pub fn oid(self) -> Oid {
        match self {
            NameType::User => OID_NT_USER_NAME,
            NameType::MachineUid => OID_NT_MACHINE_UID_NAME,
            NameType::StringUid => OID_NT_STRING_UID_NAME,
            NameType::HostbasedService => OID_NT_HOSTBASED_SERVICE,
            NameType::HostbasedServiceX => OID_NT_HOSTBASED_SERVICE_X,
            NameType::Anonymous => OID_NT_ANONYMOUS,
            NameType::Export => OID_NT_EXPORT_NAME,
            NameType::CompositeExport => OID_NT_COMPOSITE_EXPORT,
            NameType::Krb5Principal => OID_KRB5_NT_PRINCIPAL_NAME,
            NameType::Krb5Enterprise => OID_KRB5_NT_ENTERPRISE_NAME,
            NameType::Krb5X509Cert => OID_KRB5_NT_X509_CERT,
        }
    }
    pub fn from_oid(oid: &Oid) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.oid() == *oid)
    }
    /// Exported names carry a mechanism-owned binary format rather than text.
    pub fn is_exported_form(self) -> bool {
        matches!(self, NameType::Export | NameType::CompositeExport)
    }
}
