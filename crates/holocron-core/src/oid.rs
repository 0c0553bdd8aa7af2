use std::{borrow::Cow, fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OidError {
    #[error("object identifier is empty")]
    Empty,
    #[error("object identifier ends inside an arc")]
    Truncated,
    #[error("object identifier arc is not minimally encoded")]
    NonMinimal,
    #[error("object identifier arc does not fit in 64 bits")]
    Overflow,
    #[error("invalid dotted-decimal object identifier {0:?}")]
    Syntax(String),
}

/// DER body of an ASN.1 object identifier, without tag and length.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(Cow<'static, [u8]>);

impl Oid {
    pub const fn from_static(der: &'static [u8]) -> Self {
        Self(Cow::Borrowed(der))
    }
    /// Takes ownership of bytes handed out by an engine, rejecting anything that does not decode.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, OidError> {
        let der = der.into();
        decode(&der)?;
        Ok(Self(Cow::Owned(der)))
    }
    pub fn from_arcs(arcs: &[u64]) -> Result<Self, OidError> {
        encode(arcs).map(|der| Self(Cow::Owned(der)))
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn arcs(&self) -> Result<Vec<u64>, OidError> {
        decode(&self.0)
    }
}

impl AsRef<[u8]> for Oid {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match decode(&self.0) {
            Ok(arcs) => {
                for (i, arc) in arcs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "{arc}")?;
                }
                Ok(())
            }
            // Bytes from `from_static` are not validated, so fall back to hex.
            Err(_) => {
                for byte in self.0.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = OidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .split('.')
            .map(|arc| arc.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| OidError::Syntax(s.to_owned()))?;
        encode(&arcs).map_err(|err| match err {
            OidError::Overflow => err,
            _ => OidError::Syntax(s.to_owned()),
        })
        .map(|der| Self(Cow::Owned(der)))
    }
}

fn decode(der: &[u8]) -> Result<Vec<u64>, OidError> {
    if der.is_empty() {
        return Err(OidError::Empty);
    }
    let mut arcs = Vec::new();
    let mut value: u64 = 0;
    let mut at_start = true;
    for &byte in der {
        if at_start && byte == 0x80 {
            return Err(OidError::NonMinimal);
        }
        if value > (u64::MAX >> 7) {
            return Err(OidError::Overflow);
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        at_start = false;
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let (first, second) = match value {
                    0..=39 => (0, value),
                    40..=79 => (1, value - 40),
                    _ => (2, value - 80),
                };
                arcs.push(first);
                arcs.push(second);
            } else {
                arcs.push(value);
            }
            value = 0;
            at_start = true;
        }
    }
    if !at_start {
        return Err(OidError::Truncated);
    }
    Ok(arcs)
}

fn encode(arcs: &[u64]) -> Result<Vec<u8>, OidError> {
    let [first, second, rest @ ..] = arcs else {
        return Err(OidError::Syntax(format!("{arcs:?}")));
    };
    if *first > 2 || (*first < 2 && *second >= 40) {
        return Err(OidError::Syntax(format!("{arcs:?}")));
    }
    let leading = (first * 40).checked_add(*second).ok_or(OidError::Overflow)?;
    let mut der = Vec::with_capacity(arcs.len() + 2);
    push_base128(&mut der, leading);
    for arc in rest {
        push_base128(&mut der, *arc);
    }
    Ok(der)
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut scratch = [0u8; 10];
    let mut i = scratch.len();
    loop {
        i -= 1;
        scratch[i] = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = scratch.len() - 1;
    for byte in &mut scratch[i..last] {
        *byte |= 0x80;
    }
    out.extend_from_slice(&scratch[i..]);
}

/// Ordered, duplicate-free collection of OIDs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OidSet(Vec<Oid>);

impl OidSet {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns false if the OID was already a member.
    pub fn insert(&mut self, oid: Oid) -> bool {
        if self.contains(&oid) {
            return false;
        }
        self.0.push(oid);
        true
    }
    pub fn contains(&self, oid: &Oid) -> bool {
        self.0.iter().any(|member| member == oid)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Oid> {
        self.0.iter()
    }
    pub fn as_slice(&self) -> &[Oid] {
        &self.0
    }
}

impl FromIterator<Oid> for OidSet {
    fn from_iter<T: IntoIterator<Item = Oid>>(iter: T) -> Self {
        let mut set = Self::new();
        for oid in iter {
            set.insert(oid);
        }
        set
    }
}

impl IntoIterator for OidSet {
    type Item = Oid;
    type IntoIter = std::vec::IntoIter<Oid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a OidSet {
    type Item = &'a Oid;
    type IntoIter = std::slice::Iter<'a, Oid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
