//! Endpoint discovery
//!
//! The linker interface declares its endpoints in a fixed order; the
//! driver uses only the first bulk IN and the first bulk OUT endpoint it
//! finds. A single pass, no negotiation: either both are there or the
//! device is unusable.

use hostbus::{Direction, DriverError, EndpointDescriptor, TransferKind};

/// The endpoint pair a linker is driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredEndpoints {
    /// Bulk IN endpoint address
    pub bulk_in: u8,
    /// Read staging capacity, taken from the bulk IN wMaxPacketSize
    pub bulk_in_capacity: usize,
    /// Bulk OUT endpoint address
    pub bulk_out: u8,
}

/// Scan the active interface's endpoint list in declaration order.
///
/// The first bulk endpoint of each direction wins; everything else is
/// ignored. Fails with [`DriverError::MissingEndpoints`] unless both a
/// bulk IN and a bulk OUT endpoint exist.
pub fn discover_endpoints(
    endpoints: &[EndpointDescriptor],
) -> Result<DiscoveredEndpoints, DriverError> {
    let mut bulk_in = None;
    let mut bulk_out = None;

    for endpoint in endpoints {
        if endpoint.transfer != TransferKind::Bulk {
            continue;
        }

        match endpoint.direction() {
            Direction::In if bulk_in.is_none() => {
                bulk_in = Some((endpoint.address, endpoint.max_packet_size as usize));
            }
            Direction::Out if bulk_out.is_none() => {
                bulk_out = Some(endpoint.address);
            }
            _ => {}
        }
    }

    match (bulk_in, bulk_out) {
        (Some((bulk_in, bulk_in_capacity)), Some(bulk_out)) => Ok(DiscoveredEndpoints {
            bulk_in,
            bulk_in_capacity,
            bulk_out,
        }),
        _ => Err(DriverError::MissingEndpoints),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(address: u8, max_packet_size: u16) -> EndpointDescriptor {
        EndpointDescriptor {
            address,
            transfer: TransferKind::Bulk,
            max_packet_size,
        }
    }

    fn interrupt(address: u8) -> EndpointDescriptor {
        EndpointDescriptor {
            address,
            transfer: TransferKind::Interrupt,
            max_packet_size: 8,
        }
    }

    #[test]
    fn test_selects_linker_endpoint_pair() {
        let endpoints = [bulk(0x81, 64), bulk(0x02, 64)];
        let discovered = discover_endpoints(&endpoints).unwrap();

        assert_eq!(discovered.bulk_in, 0x81);
        assert_eq!(discovered.bulk_in_capacity, 64);
        assert_eq!(discovered.bulk_out, 0x02);
    }

    #[test]
    fn test_first_match_per_direction_wins() {
        let endpoints = [bulk(0x81, 64), bulk(0x82, 512), bulk(0x02, 64), bulk(0x03, 512)];
        let discovered = discover_endpoints(&endpoints).unwrap();

        assert_eq!(discovered.bulk_in, 0x81);
        assert_eq!(discovered.bulk_in_capacity, 64);
        assert_eq!(discovered.bulk_out, 0x02);

        // Same list, same answer
        assert_eq!(discover_endpoints(&endpoints).unwrap(), discovered);
    }

    #[test]
    fn test_non_bulk_endpoints_are_ignored() {
        let endpoints = [interrupt(0x83), bulk(0x81, 64), interrupt(0x04), bulk(0x02, 64)];
        let discovered = discover_endpoints(&endpoints).unwrap();

        assert_eq!(discovered.bulk_in, 0x81);
        assert_eq!(discovered.bulk_out, 0x02);
    }

    #[test]
    fn test_missing_bulk_in_fails() {
        let endpoints = [interrupt(0x81), bulk(0x02, 64)];
        assert_eq!(
            discover_endpoints(&endpoints),
            Err(DriverError::MissingEndpoints)
        );
    }

    #[test]
    fn test_missing_bulk_out_fails() {
        let endpoints = [bulk(0x81, 64), interrupt(0x02)];
        assert_eq!(
            discover_endpoints(&endpoints),
            Err(DriverError::MissingEndpoints)
        );
    }

    #[test]
    fn test_empty_interface_fails() {
        assert_eq!(discover_endpoints(&[]), Err(DriverError::MissingEndpoints));
    }
}
