use std::time::{Duration, SystemTime};

/// `GSS_C_INDEFINITE`
pub const INDEFINITE: u32 = u32::MAX;

/// Expiry of a context or credential element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    Indefinite,
    Expired,
    At(SystemTime),
}

impl Lifetime {
    /// Interprets a `time_rec` output relative to `now`.
    pub fn from_time_rec(seconds: u32, now: SystemTime) -> Self {
        match seconds {
            0 => Lifetime::Expired,
            INDEFINITE => Lifetime::Indefinite,
            secs => Lifetime::At(now + Duration::from_secs(secs.into())),
        }
    }
    pub fn is_expired(&self) -> bool {
        match self {
            Lifetime::Expired => true,
            Lifetime::Indefinite => false,
            Lifetime::At(at) => *at <= SystemTime::now(),
        }
    }
}

/// Turns a requested duration into a `time_req` input.
pub fn time_req(requested: Option<Duration>) -> u32 {
    match requested {
        None => INDEFINITE,
        // INDEFINITE itself must stay reserved for "no preference".
        Some(d) => d.as_secs().try_into().unwrap_or(INDEFINITE - 1).min(INDEFINITE - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_rec_sentinels() {
        let now = SystemTime::UNIX_EPOCH;
        assert_eq!(Lifetime::from_time_rec(0, now), Lifetime::Expired);
        assert_eq!(Lifetime::from_time_rec(u32::MAX, now), Lifetime::Indefinite);
        assert_eq!(
            Lifetime::from_time_rec(3600, now),
            Lifetime::At(SystemTime::UNIX_EPOCH + Duration::from_secs(3600))
        );
    }

    #[test]
    fn time_req_saturates_below_indefinite() {
        assert_eq!(time_req(None), INDEFINITE);
        assert_eq!(time_req(Some(Duration::from_secs(90))), 90);
        assert_eq!(time_req(Some(Duration::from_secs(u64::MAX))), INDEFINITE - 1);
        assert_eq!(time_req(Some(Duration::from_secs(u32::MAX.into()))), INDEFINITE - 1);
    }

    #[test]
    fn expiry_checks() {
        assert!(Lifetime::Expired.is_expired());
        assert!(!Lifetime::Indefinite.is_expired());
        assert!(Lifetime::At(SystemTime::UNIX_EPOCH).is_expired());
    }
}
