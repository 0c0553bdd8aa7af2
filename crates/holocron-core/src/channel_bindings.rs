use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A transport that can produce channel binding application data.
pub trait Channel {
    type Error: std::error::Error;
    fn channel_bindings(&self) -> Result<Option<Vec<u8>>, Self::Error>;
}

#[cfg(feature = "native-tls")]
impl<S: std::io::Read + std::io::Write> Channel for native_tls::TlsStream<S> {
    type Error = native_tls::Error;

    fn channel_bindings(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        self.tls_server_end_point()
    }
}

pub const GSS_C_AF_UNSPEC: u32 = 0;
pub const GSS_C_AF_LOCAL: u32 = 1;
pub const GSS_C_AF_INET: u32 = 2;
pub const GSS_C_AF_INET6: u32 = 24;
pub const GSS_C_AF_NULLADDR: u32 = 255;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GssAddress {
    /// Path of a local (unix domain) socket.
    Local(String),
    Inet(Ipv4Addr),
    Inet6(Ipv6Addr),
    Null,
}

impl GssAddress {
    pub fn family(&self) -> u32 {
        match self {
            GssAddress::Local(_) => GSS_C_AF_LOCAL,
            GssAddress::Inet(_) => GSS_C_AF_INET,
            GssAddress::Inet6(_) => GSS_C_AF_INET6,
            GssAddress::Null => GSS_C_AF_NULLADDR,
        }
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            GssAddress::Local(path) => path.as_bytes().to_vec(),
            GssAddress::Inet(ip) => ip.octets().to_vec(),
            GssAddress::Inet6(ip) => ip.octets().to_vec(),
            GssAddress::Null => Vec::new(),
        }
    }
}

impl From<IpAddr> for GssAddress {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => GssAddress::Inet(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => GssAddress::Inet(v4),
                None => GssAddress::Inet6(v6),
            },
        }
    }
}

/// Binds a context to one transport instance. Both peers must supply equal values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelBinding {
    pub initiator_addr: Option<GssAddress>,
    pub acceptor_addr: Option<GssAddress>,
    pub data: Vec<u8>,
}

impl ChannelBinding {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
    pub fn with_addresses(self, initiator: impl Into<GssAddress>, acceptor: impl Into<GssAddress>) -> Self {
        Self {
            initiator_addr: Some(initiator.into()),
            acceptor_addr: Some(acceptor.into()),
            ..self
        }
    }
    /// `None` when the channel has nothing to bind to.
    pub fn from_channel<C: Channel>(channel: &C) -> Result<Option<Self>, C::Error> {
        Ok(channel.channel_bindings()?.map(Self::new))
    }
    pub(crate) fn address_parts(addr: Option<&GssAddress>) -> (u32, Vec<u8>) {
        addr.map_or((GSS_C_AF_UNSPEC, Vec::new()), |addr| (addr.family(), addr.to_bytes()))
    }
    /// Address family and bytes for the initiator side, `GSS_C_AF_UNSPEC` when absent.
    pub fn initiator_parts(&self) -> (u32, Vec<u8>) {
        Self::address_parts(self.initiator_addr.as_ref())
    }
    pub fn acceptor_parts(&self) -> (u32, Vec<u8>) {
        Self::address_parts(self.acceptor_addr.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChannel(Option<Vec<u8>>);
    impl Channel for FixedChannel {
        type Error = std::io::Error;
        fn channel_bindings(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn addresses_encode_by_family() {
        let cb = ChannelBinding::new("foo").with_addresses(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            GssAddress::Local("/run/app.sock".to_owned()),
        );
        assert_eq!(cb.initiator_parts(), (GSS_C_AF_INET, vec![127, 0, 0, 1]));
        assert_eq!(cb.acceptor_parts(), (GSS_C_AF_LOCAL, b"/run/app.sock".to_vec()));
        assert_eq!(ChannelBinding::new("bar").initiator_parts(), (GSS_C_AF_UNSPEC, Vec::new()));
    }

    #[test]
    fn mapped_v6_collapses_to_v4() {
        let mapped = IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped());
        assert_eq!(GssAddress::from(mapped), GssAddress::Inet(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(GssAddress::from(IpAddr::V6(Ipv6Addr::LOCALHOST)).family(), GSS_C_AF_INET6);
    }

    #[test]
    fn channel_without_bindings_yields_none() {
        assert_eq!(ChannelBinding::from_channel(&FixedChannel(None)).unwrap(), None);
        let cb = ChannelBinding::from_channel(&FixedChannel(Some(vec![1, 2, 3]))).unwrap().unwrap();
        assert_eq!(cb.data, vec![1, 2, 3]);
    }
}
