use std::net::Ipv4Addr;
use std::str::FromStr;

/// Inclusive, ascending range of IPv4 addresses.
///
/// Iterating does not allocate the addresses up front and can be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    first: u32,
    last: u32,
}

impl AddressRange {
    /// Builds the range between two dotted-quad addresses in either order.
    ///
    /// If either end is malformed the range collapses to the single placeholder
    /// `0.0.0.0`, see [`Self::is_placeholder`].
    pub fn new(start: &str, end: &str) -> Self {
        match (parse_address(start), parse_address(end)) {
            (Some(start), Some(end)) => Self {
                first: start.min(end),
                last: start.max(end),
            },
            _ => {
                log::warn!("Invalid address range `{}` - `{}`", start, end);
                Self { first: 0, last: 0 }
            }
        }
    }

    /// Whether the range is nothing but `0.0.0.0`.
    pub fn is_placeholder(&self) -> bool {
        self.first == 0 && self.last == 0
    }

    pub fn address_count(&self) -> u64 {
        u64::from(self.last - self.first) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (self.first..=self.last).map(Ipv4Addr::from)
    }
}

fn parse_address(address: &str) -> Option<u32> {
    Ipv4Addr::from_str(address.trim()).ok().map(u32::from)
}
