use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
};

/// `GSS_C_*_FLAG` bits, as requested on init and returned on every round.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextFlags(u32);

impl ContextFlags {
    pub const DELEG: ContextFlags = ContextFlags(1);
    pub const MUTUAL: ContextFlags = ContextFlags(2);
    pub const REPLAY: ContextFlags = ContextFlags(4);
    pub const SEQUENCE: ContextFlags = ContextFlags(8);
    pub const CONF: ContextFlags = ContextFlags(16);
    pub const INTEG: ContextFlags = ContextFlags(32);
    pub const ANON: ContextFlags = ContextFlags(64);
    pub const PROT_READY: ContextFlags = ContextFlags(128);
    pub const TRANS: ContextFlags = ContextFlags(256);
    pub const CHANNEL_BOUND: ContextFlags = ContextFlags(2048);
    pub const DELEG_POLICY: ContextFlags = ContextFlags(32768);

    const NAMES: [(ContextFlags, &'static str); 11] = [
        (ContextFlags::DELEG, "DELEG"),
        (ContextFlags::MUTUAL, "MUTUAL"),
        (ContextFlags::REPLAY, "REPLAY"),
        (ContextFlags::SEQUENCE, "SEQUENCE"),
        (ContextFlags::CONF, "CONF"),
        (ContextFlags::INTEG, "INTEG"),
        (ContextFlags::ANON, "ANON"),
        (ContextFlags::PROT_READY, "PROT_READY"),
        (ContextFlags::TRANS, "TRANS"),
        (ContextFlags::CHANNEL_BOUND, "CHANNEL_BOUND"),
        (ContextFlags::DELEG_POLICY, "DELEG_POLICY"),
    ];

    /// Flags the engine reports about a context but that a caller cannot request.
    const SIGNALS: u32 = Self::PROT_READY.0 | Self::TRANS.0 | Self::CHANNEL_BOUND.0;

    pub const fn empty() -> Self {
        Self(0)
    }
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
    pub const fn bits(self) -> u32 {
        self.0
    }
    pub const fn contains(self, other: ContextFlags) -> bool {
        self.0 & other.0 == other.0
    }
    pub const fn intersects(self, other: ContextFlags) -> bool {
        self.0 & other.0 != 0
    }
    pub fn insert(&mut self, other: ContextFlags) {
        self.0 |= other.0;
    }
    pub fn remove(&mut self, other: ContextFlags) {
        self.0 &= !other.0;
    }
    /// Strips the signal bits off a returned flag word.
    pub fn split_signals(self) -> (ContextFlags, Signals) {
        let signals = Signals {
            protection_ready: self.contains(Self::PROT_READY),
            transferable: self.contains(Self::TRANS),
            channel_bound: self.contains(Self::CHANNEL_BOUND),
        };
        (ContextFlags(self.0 & !Self::SIGNALS), signals)
    }
}

impl BitOr for ContextFlags {
    type Output = ContextFlags;
    fn bitor(self, rhs: Self) -> Self::Output {
        ContextFlags(self.0 | rhs.0)
    }
}
impl BitOrAssign for ContextFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
impl BitAnd for ContextFlags {
    type Output = ContextFlags;
    fn bitand(self, rhs: Self) -> Self::Output {
        ContextFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for ContextFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        let mut known = 0;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
            known |= flag.0;
        }
        if self.0 & !known != 0 {
            set.entry(&format_args!("{:#x}", self.0 & !known));
        }
        set.finish()
    }
}

/// Per-round booleans carried in the flag word by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    pub protection_ready: bool,
    pub transferable: bool,
    pub channel_bound: bool,
}
